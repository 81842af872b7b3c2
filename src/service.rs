//! Subscription Service
//!
//! Where a real client would POST to a subscription backend. The simulated
//! service waits out the product's latencies and remembers what it saved.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::WizardConfig;
use crate::subscription::SubscriptionResult;

/// Error type for the final verification/persistence step
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Could not verify WhatsApp number {0}")]
    VerificationFailed(String),

    #[error("Could not save notification preferences: {0}")]
    PersistFailed(String),
}

/// Verifies numbers and stores notification preferences
#[async_trait]
pub trait SubscriptionService: Send + Sync {
    /// Confirm the WhatsApp number is reachable
    async fn verify_number(&self, phone_number: &str) -> Result<(), ServiceError>;

    /// Store the chosen preferences
    async fn save_preferences(&self, result: &SubscriptionResult) -> Result<(), ServiceError>;
}

/// In-process stand-in for the subscription backend
#[derive(Debug, Default)]
pub struct SimulatedSubscriptionService {
    verification_delay: Duration,
    persist_delay: Duration,
    submit_delay: Duration,
    saved: Mutex<Vec<SubscriptionResult>>,
    fail_verification: AtomicBool,
    fail_persist: AtomicBool,
}

impl SimulatedSubscriptionService {
    pub fn new(config: &WizardConfig) -> Self {
        Self {
            verification_delay: config.verification_delay,
            persist_delay: config.persist_delay,
            submit_delay: config.submit_delay,
            ..Self::default()
        }
    }

    /// Make number verification fail until reset
    pub fn set_fail_verification(&self, fail: bool) {
        self.fail_verification.store(fail, Ordering::SeqCst);
    }

    /// Make saving fail until reset
    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    /// Every result saved so far
    pub fn saved(&self) -> Vec<SubscriptionResult> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SubscriptionService for SimulatedSubscriptionService {
    async fn verify_number(&self, phone_number: &str) -> Result<(), ServiceError> {
        tokio::time::sleep(self.verification_delay).await;

        if self.fail_verification.load(Ordering::SeqCst) {
            warn!(phone = %phone_number, "Simulated number verification failure");
            return Err(ServiceError::VerificationFailed(phone_number.to_string()));
        }

        info!(phone = %phone_number, "WhatsApp number verified");
        Ok(())
    }

    async fn save_preferences(&self, result: &SubscriptionResult) -> Result<(), ServiceError> {
        // A save after verification is a follow-up call; a plain submit is the whole round trip.
        let delay = if result.phone_number.is_some() {
            self.persist_delay
        } else {
            self.submit_delay
        };
        tokio::time::sleep(delay).await;

        if self.fail_persist.load(Ordering::SeqCst) {
            warn!("Simulated preference save failure");
            return Err(ServiceError::PersistFailed("simulated failure".to_string()));
        }

        if let Ok(mut saved) = self.saved.lock() {
            saved.push(result.clone());
        }
        Ok(())
    }
}
