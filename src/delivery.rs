//! OTP Delivery
//!
//! Abstract interface for sending verification codes to a WhatsApp number.
//! The only implementation here is simulated: it waits, logs, and keeps an
//! outbox so demos and tests can read the code back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Error type for code delivery
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to send WhatsApp OTP to {phone_number}: {reason}")]
    SendFailed {
        phone_number: String,
        reason: String,
    },

    #[error("Could not draw a verification code different from the previous one")]
    CodeUnavailable,
}

/// Sends verification codes
#[async_trait]
pub trait OtpNotifier: Send + Sync {
    async fn send_code(&self, phone_number: &str, code: &str) -> Result<(), DeliveryError>;
}

/// A code handed to the simulated notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub phone_number: String,
    pub code: String,
    pub sent_at: DateTime<Utc>,
}

/// Simulated WhatsApp delivery
#[derive(Debug, Default)]
pub struct SimulatedWhatsAppNotifier {
    delay: Duration,
    outbox: Mutex<Vec<SentCode>>,
    failures_pending: AtomicU32,
}

impl SimulatedWhatsAppNotifier {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Make the next `count` sends fail
    pub fn fail_next(&self, count: u32) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Everything delivered so far, oldest first
    pub fn sent(&self) -> Vec<SentCode> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// Most recent code delivered to `phone_number`
    pub fn last_code_for(&self, phone_number: &str) -> Option<String> {
        self.outbox.lock().ok().and_then(|outbox| {
            outbox
                .iter()
                .rev()
                .find(|sent| sent.phone_number == phone_number)
                .map(|sent| sent.code.clone())
        })
    }

    fn take_failure(&self) -> bool {
        self.failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl OtpNotifier for SimulatedWhatsAppNotifier {
    async fn send_code(&self, phone_number: &str, code: &str) -> Result<(), DeliveryError> {
        tokio::time::sleep(self.delay).await;

        if self.take_failure() {
            warn!(phone = %phone_number, "Simulated WhatsApp delivery failure");
            return Err(DeliveryError::SendFailed {
                phone_number: phone_number.to_string(),
                reason: "simulated delivery failure".to_string(),
            });
        }

        info!(phone = %phone_number, code = %code, "WhatsApp OTP sent (simulated)");

        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.push(SentCode {
                phone_number: phone_number.to_string(),
                code: code.to_string(),
                sent_at: Utc::now(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_send_waits_and_records() {
        let notifier = SimulatedWhatsAppNotifier::new(Duration::from_secs(1));
        let started = tokio::time::Instant::now();

        notifier.send_code("+15551234567", "483920").await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(
            notifier.last_code_for("+15551234567").as_deref(),
            Some("483920")
        );
        assert_eq!(notifier.last_code_for("+15550000000"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_failures_are_consumed() {
        let notifier = SimulatedWhatsAppNotifier::new(Duration::ZERO);
        notifier.fail_next(1);

        let err = notifier.send_code("+1", "111111").await.unwrap_err();
        assert!(matches!(err, DeliveryError::SendFailed { .. }));
        assert!(notifier.sent().is_empty());

        notifier.send_code("+1", "222222").await.unwrap();
        assert_eq!(notifier.sent().len(), 1);
    }
}
