//! WhatsApp One-Time Passcodes
//!
//! Codes are six decimal digits drawn uniformly from 100000..=999999, so a
//! code never starts with zero. A challenge exists only once its code has been
//! handed to the notifier; issuing a new one overwrites the old.
//!
//! These codes are a client-side simulation. They are not generated with a
//! cryptographic RNG and carry no expiry beyond being replaced.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::validation::ValidationError;

/// Number of digits in a code
pub const CODE_LENGTH: usize = 6;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

/// Upper bound on redraws when a fresh code must differ from the one it replaces
const MAX_REDRAWS: usize = 16;

/// Source of verification codes
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Uniformly random codes in 100000..=999999
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        rng.gen_range(CODE_MIN..=CODE_MAX).to_string()
    }
}

/// Hands out a fixed list of codes in order, then falls back to random ones
///
/// Used by scenario tests and demos that need to know the code up front.
#[derive(Debug, Default)]
pub struct ScriptedCodeGenerator {
    codes: Mutex<VecDeque<String>>,
}

impl ScriptedCodeGenerator {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: Mutex::new(codes.into_iter().map(Into::into).collect()),
        }
    }
}

impl CodeGenerator for ScriptedCodeGenerator {
    fn generate(&self) -> String {
        let next = self
            .codes
            .lock()
            .ok()
            .and_then(|mut codes| codes.pop_front());
        next.unwrap_or_else(|| RandomCodeGenerator.generate())
    }
}

/// Draw a code that differs from `previous`
///
/// Returns `None` if the generator keeps producing `previous` after
/// `MAX_REDRAWS` redraws.
pub fn draw_code(codes: &dyn CodeGenerator, previous: Option<&str>) -> Option<String> {
    let Some(previous) = previous else {
        return Some(codes.generate());
    };

    std::iter::repeat_with(|| codes.generate())
        .take(MAX_REDRAWS + 1)
        .find(|code| code != previous)
}

/// Strip non-digits and keep at most six characters
pub fn sanitize_code_input(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_digit)
        .take(CODE_LENGTH)
        .collect()
}

/// The single live verification challenge for a wizard
#[derive(Debug, Clone)]
pub struct OtpChallenge {
    pub challenge_id: Uuid,
    code: String,
    pub issued_at: DateTime<Utc>,
    /// Earliest instant a resend is honoured
    pub resend_available_at: Instant,
}

impl OtpChallenge {
    /// Stamp a delivered code as the live challenge
    pub fn new(code: String, cooldown: Duration) -> Self {
        Self {
            challenge_id: Uuid::new_v4(),
            code,
            issued_at: Utc::now(),
            resend_available_at: Instant::now() + cooldown,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Whether a resend is permitted at `now`
    pub fn resend_allowed(&self, now: Instant) -> bool {
        now >= self.resend_available_at
    }

    /// Check an attempt against this challenge
    ///
    /// Order matters: an empty attempt is reported as missing before its
    /// length is considered, and length before content.
    pub fn check(&self, attempt: &str) -> Result<(), ValidationError> {
        if attempt.trim().is_empty() {
            return Err(ValidationError::CodeRequired);
        }
        if attempt.chars().count() != CODE_LENGTH {
            return Err(ValidationError::CodeLength);
        }
        if attempt != self.code {
            return Err(ValidationError::CodeMismatch);
        }
        Ok(())
    }
}
