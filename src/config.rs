//! Timing Configuration
//!
//! Simulated latencies and the resend cooldown. Defaults match the product;
//! each value can be overridden from the environment.

use std::time::Duration;

/// Seconds before a WhatsApp code may be resent
pub const DEFAULT_RESEND_COOLDOWN_SECS: u32 = 60;

/// Simulated WhatsApp delivery latency
pub const DEFAULT_DELIVERY_DELAY_MS: u64 = 1000;

/// Simulated number verification latency
pub const DEFAULT_VERIFICATION_DELAY_MS: u64 = 1000;

/// Simulated save latency after a verified number
pub const DEFAULT_PERSIST_DELAY_MS: u64 = 500;

/// Simulated save latency for a plain form submission
pub const DEFAULT_SUBMIT_DELAY_MS: u64 = 1500;

pub const ENV_RESEND_COOLDOWN_SECS: &str = "ALERTSHIP_RESEND_COOLDOWN_SECS";
pub const ENV_DELIVERY_DELAY_MS: &str = "ALERTSHIP_DELIVERY_DELAY_MS";
pub const ENV_VERIFICATION_DELAY_MS: &str = "ALERTSHIP_VERIFICATION_DELAY_MS";
pub const ENV_PERSIST_DELAY_MS: &str = "ALERTSHIP_PERSIST_DELAY_MS";
pub const ENV_SUBMIT_DELAY_MS: &str = "ALERTSHIP_SUBMIT_DELAY_MS";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {key} value '{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Timings used by the wizard and the simulated collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WizardConfig {
    pub resend_cooldown_secs: u32,
    pub delivery_delay: Duration,
    pub verification_delay: Duration,
    pub persist_delay: Duration,
    pub submit_delay: Duration,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            resend_cooldown_secs: DEFAULT_RESEND_COOLDOWN_SECS,
            delivery_delay: Duration::from_millis(DEFAULT_DELIVERY_DELAY_MS),
            verification_delay: Duration::from_millis(DEFAULT_VERIFICATION_DELAY_MS),
            persist_delay: Duration::from_millis(DEFAULT_PERSIST_DELAY_MS),
            submit_delay: Duration::from_millis(DEFAULT_SUBMIT_DELAY_MS),
        }
    }
}

impl WizardConfig {
    /// Create from ALERTSHIP_* environment variables
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, .env map, test fixture)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u32, _>(&lookup, ENV_RESEND_COOLDOWN_SECS)? {
            config.resend_cooldown_secs = secs;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_DELIVERY_DELAY_MS)? {
            config.delivery_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_VERIFICATION_DELAY_MS)? {
            config.verification_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_PERSIST_DELAY_MS)? {
            config.persist_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_SUBMIT_DELAY_MS)? {
            config.submit_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// The resend cooldown as a duration
    pub fn resend_cooldown(&self) -> Duration {
        Duration::from_secs(u64::from(self.resend_cooldown_secs))
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };

    let parsed = value.trim().parse::<T>();
    parsed
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
            value,
        })
}
