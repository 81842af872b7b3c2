//! Subscription Wizard
//!
//! Drives a user through opting into outage alerts:
//!
//! ```text
//! ChoosingPreferences --submit (WhatsApp)--> AwaitingOtp --verify--> Succeeded
//!         |                                   |   ^
//!         +--submit (browser only)------------|---|----------------> Succeeded
//!                                             |   |
//!                                           back  resend (after cooldown)
//! ```
//!
//! A logged-out session never reaches the state machine; `open` returns a
//! login prompt instead.
//!
//! The wizard never calls back into its host. Operations return a [`Step`],
//! and [`SubscriptionWizard::close`] returns a [`WizardExit`] for the host to
//! act on.
//!
//! All simulated latency runs inside the operation futures. A [`CloseHandle`]
//! lets the host tear the wizard down mid-operation: the operation returns
//! [`WizardError::Closed`] without touching state, and the cooldown ticker
//! stops.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WizardConfig;
use crate::cooldown::ResendCooldown;
use crate::delivery::{DeliveryError, OtpNotifier, SimulatedWhatsAppNotifier};
use crate::otp::{draw_code, sanitize_code_input, CodeGenerator, OtpChallenge, RandomCodeGenerator};
use crate::service::{ServiceError, SimulatedSubscriptionService, SubscriptionService};
use crate::session::Session;
use crate::subscription::{SubscriptionPreferences, SubscriptionResult};
use crate::validation::{Field, FieldErrors, ValidationError};

/// Shown under the code input when the final step fails
pub const VERIFICATION_FAILED_MESSAGE: &str = "Verification failed. Please try again.";

/// Shown under the phone input when the first code cannot be sent
pub const SEND_FAILED_MESSAGE: &str = "Failed to send WhatsApp OTP. Please try again.";

/// Shown under the code input when a resend cannot be delivered
pub const RESEND_FAILED_MESSAGE: &str = "Failed to resend WhatsApp OTP. Please try again.";

/// Shown on the prompt a logged-out user sees
pub const LOGIN_REQUIRED_MESSAGE: &str = "You need to be logged in to subscribe to alerts.";

/// Which screen the wizard is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStage {
    ChoosingPreferences,
    AwaitingOtp,
    Succeeded,
}

impl WizardStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChoosingPreferences => "choosing_preferences",
            Self::AwaitingOtp => "awaiting_otp",
            Self::Succeeded => "succeeded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Display for WizardStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned by wizard operations
///
/// None of these are fatal; the wizard stays usable after every one.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Verification failed: {0}")]
    Verification(#[from] ServiceError),

    #[error("Cannot {operation} while {stage}")]
    WrongStage {
        operation: &'static str,
        stage: WizardStage,
    },

    #[error("Subscription wizard was closed")]
    Closed,
}

impl WizardError {
    /// True when the entered code was wrong or the final step failed
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::Validation(ValidationError::CodeMismatch) | Self::Verification(_)
        )
    }
}

/// Outcome of a successful `submit` or `verify`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A code was sent; the OTP screen is showing
    AwaitingOtp { challenge_id: Uuid },
    /// The subscription was saved
    Subscribed(SubscriptionResult),
}

/// How the wizard ended, for the host to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardExit {
    /// Dismissed before success; nothing was recorded
    Cancelled,
    /// The login prompt's "Log In" was chosen
    LoginRequested,
    /// Dismissed after success
    Subscribed(SubscriptionResult),
}

/// Result of opening the wizard
#[derive(Debug)]
pub enum WizardEntry {
    LoginRequired(LoginPrompt),
    Ready(SubscriptionWizard),
}

/// Shown instead of the wizard when nobody is logged in
#[derive(Debug, Default)]
pub struct LoginPrompt;

impl LoginPrompt {
    pub fn message(&self) -> &'static str {
        LOGIN_REQUIRED_MESSAGE
    }

    pub fn cancel(self) -> WizardExit {
        WizardExit::Cancelled
    }

    /// Close the prompt and ask the host to open the login flow
    pub fn log_in(self) -> WizardExit {
        WizardExit::LoginRequested
    }
}

/// Everything the wizard talks to
#[derive(Clone)]
pub struct WizardCollaborators {
    pub notifier: Arc<dyn OtpNotifier>,
    pub service: Arc<dyn SubscriptionService>,
    pub codes: Arc<dyn CodeGenerator>,
}

impl WizardCollaborators {
    /// Simulated notifier and service with random codes
    pub fn simulated(config: &WizardConfig) -> Self {
        Self {
            notifier: Arc::new(SimulatedWhatsAppNotifier::new(config.delivery_delay)),
            service: Arc::new(SimulatedSubscriptionService::new(config)),
            codes: Arc::new(RandomCodeGenerator),
        }
    }
}

/// Tears a wizard down from outside an in-flight operation
#[derive(Debug, Clone)]
pub struct CloseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.tx.send_replace(true);
    }
}

/// Publishes `true` for the lifetime of an in-flight operation
struct PendingGuard(Arc<watch::Sender<bool>>);

impl PendingGuard {
    fn enter(tx: &Arc<watch::Sender<bool>>) -> Self {
        tx.send_replace(true);
        Self(Arc::clone(tx))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

/// The notification-subscription wizard
pub struct SubscriptionWizard {
    config: WizardConfig,
    notifier: Arc<dyn OtpNotifier>,
    service: Arc<dyn SubscriptionService>,
    codes: Arc<dyn CodeGenerator>,

    stage: WizardStage,
    preferences: SubscriptionPreferences,
    phone_number: String,
    code_input: String,
    errors: FieldErrors,

    challenge: Option<OtpChallenge>,
    /// Code of the challenge discarded by `back`; the next code must differ
    discarded_code: Option<String>,
    cooldown: Option<ResendCooldown>,
    result: Option<SubscriptionResult>,

    pending: Arc<watch::Sender<bool>>,
    close_tx: Arc<watch::Sender<bool>>,
    closed: watch::Receiver<bool>,
}

impl std::fmt::Debug for SubscriptionWizard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionWizard")
            .field("stage", &self.stage)
            .field("preferences", &self.preferences)
            .field("phone_number", &self.phone_number)
            .field("errors", &self.errors)
            .field("challenge_id", &self.challenge.as_ref().map(|c| c.challenge_id))
            .finish_non_exhaustive()
    }
}

impl SubscriptionWizard {
    /// Open the wizard for `session`
    pub fn open(
        session: &Session,
        collaborators: WizardCollaborators,
        config: WizardConfig,
    ) -> WizardEntry {
        if !session.is_logged_in() {
            debug!("Subscription wizard opened without a session, prompting for login");
            return WizardEntry::LoginRequired(LoginPrompt);
        }
        WizardEntry::Ready(Self::new(collaborators, config))
    }

    /// Create a wizard on the preferences screen
    pub fn new(collaborators: WizardCollaborators, config: WizardConfig) -> Self {
        let (pending, _) = watch::channel(false);
        let (close_tx, closed) = watch::channel(false);

        Self {
            config,
            notifier: collaborators.notifier,
            service: collaborators.service,
            codes: collaborators.codes,
            stage: WizardStage::ChoosingPreferences,
            preferences: SubscriptionPreferences::default(),
            phone_number: String::new(),
            code_input: String::new(),
            errors: FieldErrors::new(),
            challenge: None,
            discarded_code: None,
            cooldown: None,
            result: None,
            pending: Arc::new(pending),
            close_tx: Arc::new(close_tx),
            closed,
        }
    }

    // ── Accessors ──

    pub fn stage(&self) -> WizardStage {
        self.stage
    }

    pub fn preferences(&self) -> SubscriptionPreferences {
        self.preferences
    }

    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn code_input(&self) -> &str {
        &self.code_input
    }

    /// Inline messages from the last validating operation
    pub fn field_errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn field_error(&self, field: Field) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }

    /// The live challenge, if a code has been sent
    pub fn challenge(&self) -> Option<&OtpChallenge> {
        self.challenge.as_ref()
    }

    pub fn result(&self) -> Option<&SubscriptionResult> {
        self.result.as_ref()
    }

    /// Seconds left before resend is allowed (0 when no code is out)
    pub fn resend_remaining(&self) -> u32 {
        self.cooldown.as_ref().map_or(0, ResendCooldown::remaining)
    }

    /// Watch the resend countdown
    pub fn subscribe_resend_countdown(&self) -> Option<watch::Receiver<u32>> {
        self.cooldown.as_ref().map(ResendCooldown::subscribe)
    }

    /// Watch whether an operation is in flight
    pub fn subscribe_pending(&self) -> watch::Receiver<bool> {
        self.pending.subscribe()
    }

    pub fn is_pending(&self) -> bool {
        *self.pending.borrow()
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            tx: Arc::clone(&self.close_tx),
        }
    }

    /// Whether "Verify & Subscribe" should be enabled
    pub fn can_verify(&self) -> bool {
        self.stage == WizardStage::AwaitingOtp
            && !self.is_pending()
            && self.code_input.chars().count() == crate::otp::CODE_LENGTH
    }

    /// Whether "Resend Code" should be enabled
    pub fn can_resend(&self) -> bool {
        self.stage == WizardStage::AwaitingOtp
            && !self.is_pending()
            && self
                .challenge
                .as_ref()
                .is_some_and(|c| c.resend_allowed(Instant::now()))
    }

    // ── Preferences screen ──

    pub fn toggle_browser(&mut self) -> Result<(), WizardError> {
        self.expect_stage(WizardStage::ChoosingPreferences, "toggle browser alerts")?;
        self.preferences.browser_enabled = !self.preferences.browser_enabled;
        Ok(())
    }

    pub fn toggle_whatsapp(&mut self) -> Result<(), WizardError> {
        self.expect_stage(WizardStage::ChoosingPreferences, "toggle WhatsApp alerts")?;
        self.preferences.whatsapp_enabled = !self.preferences.whatsapp_enabled;
        Ok(())
    }

    pub fn set_phone_number(&mut self, phone_number: impl Into<String>) -> Result<(), WizardError> {
        self.expect_stage(WizardStage::ChoosingPreferences, "edit the phone number")?;
        self.phone_number = phone_number.into();
        self.errors.remove(&Field::Phone);
        Ok(())
    }

    /// Submit the preferences screen
    ///
    /// With WhatsApp selected this sends a code and moves to the OTP screen;
    /// otherwise it saves the preferences and succeeds.
    pub async fn submit(&mut self) -> Result<Step, WizardError> {
        self.expect_stage(WizardStage::ChoosingPreferences, "submit preferences")?;
        self.errors.clear();

        if self.preferences.whatsapp_enabled {
            let phone = self.phone_number.trim().to_string();
            if phone.is_empty() {
                return Err(self.reject(ValidationError::PhoneRequired));
            }

            let _pending = PendingGuard::enter(&self.pending);
            let challenge = match self
                .deliver_code(&phone, self.discarded_code.as_deref())
                .await
            {
                Ok(challenge) => challenge,
                Err(e) => {
                    return Err(self.delivery_failed(e, Field::Phone, SEND_FAILED_MESSAGE));
                }
            };
            self.discarded_code = None;
            let challenge_id = challenge.challenge_id;
            self.install_challenge(challenge);
            self.stage = WizardStage::AwaitingOtp;

            info!(phone = %phone, %challenge_id, "Awaiting WhatsApp verification");
            return Ok(Step::AwaitingOtp { challenge_id });
        }

        let _pending = PendingGuard::enter(&self.pending);
        let result = self.preferences.unverified_result();
        let service = Arc::clone(&self.service);

        if let Err(e) = self.until_closed(service.save_preferences(&result)).await? {
            error!(error = %e, "Error saving notification preferences");
            return Err(WizardError::Verification(e));
        }

        Ok(self.finish(result))
    }

    // ── OTP screen ──

    /// Update the code input; non-digits are dropped and it is capped at six digits
    pub fn set_code_input(&mut self, raw: &str) -> Result<(), WizardError> {
        self.expect_stage(WizardStage::AwaitingOtp, "enter a code")?;
        self.code_input = sanitize_code_input(raw);
        self.errors.remove(&Field::Otp);
        Ok(())
    }

    /// Check the entered code and, if it matches, verify the number and save
    pub async fn verify(&mut self) -> Result<Step, WizardError> {
        self.expect_stage(WizardStage::AwaitingOtp, "verify a code")?;
        self.errors.clear();

        let checked = match &self.challenge {
            Some(challenge) => challenge.check(&self.code_input),
            None => {
                return Err(WizardError::WrongStage {
                    operation: "verify a code",
                    stage: self.stage,
                })
            }
        };
        if let Err(e) = checked {
            debug!(reason = %e, "Rejected verification code");
            return Err(self.reject(e));
        }

        let _pending = PendingGuard::enter(&self.pending);
        let phone = self.phone_number.trim().to_string();
        let result = self.preferences.verified_result(phone.clone());
        let service = Arc::clone(&self.service);

        let outcome = self
            .until_closed(async {
                match service.verify_number(&phone).await {
                    Ok(()) => service.save_preferences(&result).await,
                    Err(e) => Err(e),
                }
            })
            .await?;

        if let Err(e) = outcome {
            error!(phone = %phone, error = %e, "Error verifying WhatsApp number");
            self.errors
                .insert(Field::Otp, VERIFICATION_FAILED_MESSAGE.to_string());
            return Err(WizardError::Verification(e));
        }

        Ok(self.finish(result))
    }

    /// Send a fresh code once the cooldown has run out
    ///
    /// Returns `Ok(None)` without doing anything while the cooldown is running.
    pub async fn resend(&mut self) -> Result<Option<Uuid>, WizardError> {
        self.expect_stage(WizardStage::AwaitingOtp, "resend a code")?;

        let previous = match &self.challenge {
            Some(challenge) if challenge.resend_allowed(Instant::now()) => {
                challenge.code().to_string()
            }
            Some(_) => {
                debug!(
                    remaining = self.resend_remaining(),
                    "Resend requested during cooldown, ignoring"
                );
                return Ok(None);
            }
            None => {
                return Err(WizardError::WrongStage {
                    operation: "resend a code",
                    stage: self.stage,
                })
            }
        };

        let _pending = PendingGuard::enter(&self.pending);
        self.errors.remove(&Field::Otp);
        let phone = self.phone_number.trim().to_string();
        let challenge = match self.deliver_code(&phone, Some(&previous)).await {
            Ok(challenge) => challenge,
            Err(e) => {
                return Err(self.delivery_failed(e, Field::Otp, RESEND_FAILED_MESSAGE));
            }
        };
        let challenge_id = challenge.challenge_id;
        self.install_challenge(challenge);

        info!(phone = %phone, %challenge_id, "WhatsApp OTP resent");
        Ok(Some(challenge_id))
    }

    /// Return to the preferences screen, discarding the live challenge
    pub fn back(&mut self) -> Result<(), WizardError> {
        self.expect_stage(WizardStage::AwaitingOtp, "go back")?;

        if let Some(challenge) = self.challenge.take() {
            debug!(challenge_id = %challenge.challenge_id, "Discarded verification challenge");
            self.discarded_code = Some(challenge.code().to_string());
        }
        self.cooldown = None;
        self.code_input.clear();
        self.errors.remove(&Field::Otp);
        self.stage = WizardStage::ChoosingPreferences;
        Ok(())
    }

    /// Close the wizard
    ///
    /// Before success nothing is recorded. After success this is the
    /// dismissal and hands the result back.
    pub fn close(self) -> WizardExit {
        self.close_tx.send_replace(true);

        match (self.stage, self.result.clone()) {
            (WizardStage::Succeeded, Some(result)) => WizardExit::Subscribed(result),
            (stage, _) => {
                debug!(%stage, "Subscription wizard closed without subscribing");
                WizardExit::Cancelled
            }
        }
    }

    // ── Internals ──

    fn expect_stage(
        &self,
        expected: WizardStage,
        operation: &'static str,
    ) -> Result<(), WizardError> {
        if *self.closed.borrow() {
            return Err(WizardError::Closed);
        }
        if self.stage != expected {
            return Err(WizardError::WrongStage {
                operation,
                stage: self.stage,
            });
        }
        Ok(())
    }

    fn reject(&mut self, err: ValidationError) -> WizardError {
        err.record(&mut self.errors);
        WizardError::Validation(err)
    }

    /// Record the inline retry prompt for a failed send; a close passes through untouched
    fn delivery_failed(
        &mut self,
        err: WizardError,
        field: Field,
        message: &'static str,
    ) -> WizardError {
        if matches!(err, WizardError::Delivery(_)) {
            self.errors.insert(field, message.to_string());
        }
        err
    }

    /// Run `fut` unless the wizard is closed first
    async fn until_closed<F: Future>(&self, fut: F) -> Result<F::Output, WizardError> {
        let mut closed = self.closed.clone();
        if *closed.borrow_and_update() {
            return Err(WizardError::Closed);
        }

        tokio::select! {
            output = fut => Ok(output),
            _ = closed.wait_for(|closed| *closed) => {
                warn!(stage = %self.stage, "Subscription wizard closed mid-operation");
                Err(WizardError::Closed)
            }
        }
    }

    /// Draw a code and hand it to the notifier; the challenge exists only once delivered
    async fn deliver_code(
        &self,
        phone: &str,
        previous: Option<&str>,
    ) -> Result<OtpChallenge, WizardError> {
        let Some(code) = draw_code(self.codes.as_ref(), previous) else {
            error!(phone = %phone, "Code generator kept repeating the previous code");
            return Err(WizardError::Delivery(DeliveryError::CodeUnavailable));
        };
        let notifier = Arc::clone(&self.notifier);

        if let Err(e) = self.until_closed(notifier.send_code(phone, &code)).await? {
            warn!(phone = %phone, error = %e, "Failed to send WhatsApp OTP");
            return Err(WizardError::Delivery(e));
        }

        Ok(OtpChallenge::new(code, self.config.resend_cooldown()))
    }

    fn install_challenge(&mut self, challenge: OtpChallenge) {
        // Replacing the cooldown drops (and aborts) the previous ticker.
        self.cooldown = Some(ResendCooldown::start(
            challenge.resend_available_at,
            self.closed.clone(),
        ));
        self.challenge = Some(challenge);
    }

    fn finish(&mut self, result: SubscriptionResult) -> Step {
        self.stage = WizardStage::Succeeded;
        self.challenge = None;
        self.discarded_code = None;
        self.cooldown = None;
        self.code_input.clear();

        info!(
            browser = result.browser_enabled,
            whatsapp = result.whatsapp_enabled,
            phone = ?result.phone_number,
            "Notification preferences saved"
        );

        self.result = Some(result.clone());
        Step::Subscribed(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::ScriptedCodeGenerator;
    use crate::session::{MemorySessionStore, User};
    use std::time::Duration;

    struct Harness {
        notifier: Arc<SimulatedWhatsAppNotifier>,
        service: Arc<SimulatedSubscriptionService>,
        wizard: SubscriptionWizard,
    }

    fn harness(codes: &[&str]) -> Harness {
        let config = WizardConfig::default();
        let notifier = Arc::new(SimulatedWhatsAppNotifier::new(config.delivery_delay));
        let service = Arc::new(SimulatedSubscriptionService::new(&config));
        let collaborators = WizardCollaborators {
            notifier: notifier.clone(),
            service: service.clone(),
            codes: Arc::new(ScriptedCodeGenerator::new(codes.iter().copied())),
        };
        Harness {
            notifier,
            service,
            wizard: SubscriptionWizard::new(collaborators, config),
        }
    }

    async fn on_otp_screen(h: &mut Harness) {
        h.wizard.toggle_whatsapp().unwrap();
        h.wizard.set_phone_number("+15551234567").unwrap();
        h.wizard.submit().await.unwrap();
        assert_eq!(h.wizard.stage(), WizardStage::AwaitingOtp);
    }

    #[tokio::test]
    async fn test_logged_out_session_gets_login_prompt() {
        let session = Session::anonymous(Arc::new(MemorySessionStore::new()));
        let config = WizardConfig::default();

        match SubscriptionWizard::open(&session, WizardCollaborators::simulated(&config), config) {
            WizardEntry::LoginRequired(prompt) => {
                assert_eq!(prompt.message(), LOGIN_REQUIRED_MESSAGE);
                assert_eq!(prompt.log_in(), WizardExit::LoginRequested);
            }
            WizardEntry::Ready(_) => panic!("expected login prompt"),
        }
    }

    #[tokio::test]
    async fn test_logged_in_session_opens_on_preferences() {
        let mut session = Session::anonymous(Arc::new(MemorySessionStore::new()));
        session
            .log_in(User::new("Alice", "alice@example.com"))
            .await
            .unwrap();
        let config = WizardConfig::default();

        match SubscriptionWizard::open(&session, WizardCollaborators::simulated(&config), config) {
            WizardEntry::Ready(wizard) => {
                assert_eq!(wizard.stage(), WizardStage::ChoosingPreferences);
                assert_eq!(wizard.preferences(), SubscriptionPreferences::new(true, false));
            }
            WizardEntry::LoginRequired(_) => panic!("expected wizard"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_phone_error_cleared_on_edit() {
        let mut h = harness(&[]);
        h.wizard.toggle_whatsapp().unwrap();

        let err = h.wizard.submit().await.unwrap_err();
        assert!(matches!(
            err,
            WizardError::Validation(ValidationError::PhoneRequired)
        ));
        assert_eq!(
            h.wizard.field_error(Field::Phone),
            Some("Phone number is required for WhatsApp notifications")
        );

        h.wizard.set_phone_number("+1").unwrap();
        assert_eq!(h.wizard.field_error(Field::Phone), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_phone_is_empty() {
        let mut h = harness(&[]);
        h.wizard.toggle_whatsapp().unwrap();
        h.wizard.set_phone_number("   ").unwrap();

        assert!(h.wizard.submit().await.is_err());
        assert_eq!(h.wizard.stage(), WizardStage::ChoosingPreferences);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_code_input_is_sanitized() {
        let mut h = harness(&["483920"]);
        on_otp_screen(&mut h).await;

        h.wizard.set_code_input("48-39 20 99").unwrap();
        assert_eq!(h.wizard.code_input(), "483920");
        assert!(h.wizard.can_verify());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_and_empty_codes() {
        let mut h = harness(&["483920"]);
        on_otp_screen(&mut h).await;

        let err = h.wizard.verify().await.unwrap_err();
        assert!(matches!(
            err,
            WizardError::Validation(ValidationError::CodeRequired)
        ));

        h.wizard.set_code_input("4839").unwrap();
        let err = h.wizard.verify().await.unwrap_err();
        assert!(matches!(
            err,
            WizardError::Validation(ValidationError::CodeLength)
        ));
        assert_eq!(h.wizard.field_error(Field::Otp), Some("OTP must be 6 digits"));
        assert_eq!(h.wizard.stage(), WizardStage::AwaitingOtp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_stage_is_rejected_without_change() {
        let mut h = harness(&[]);

        let err = h.wizard.verify().await.unwrap_err();
        assert!(matches!(
            err,
            WizardError::WrongStage {
                stage: WizardStage::ChoosingPreferences,
                ..
            }
        ));
        assert!(h.wizard.back().is_err());
        assert!(h.wizard.resend().await.is_err());
        assert_eq!(h.wizard.stage(), WizardStage::ChoosingPreferences);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preferences_locked_after_submit() {
        let mut h = harness(&["483920"]);
        on_otp_screen(&mut h).await;

        assert!(h.wizard.toggle_browser().is_err());
        assert!(h.wizard.set_phone_number("+1").is_err());
        assert_eq!(h.wizard.phone_number(), "+15551234567");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_failure_stays_on_preferences() {
        let mut h = harness(&["483920"]);
        h.notifier.fail_next(1);
        h.wizard.toggle_whatsapp().unwrap();
        h.wizard.set_phone_number("+15551234567").unwrap();

        let err = h.wizard.submit().await.unwrap_err();
        assert!(matches!(err, WizardError::Delivery(_)));
        assert_eq!(h.wizard.stage(), WizardStage::ChoosingPreferences);
        assert!(h.wizard.challenge().is_none());
        assert_eq!(h.wizard.resend_remaining(), 0);
        assert!(!h.wizard.is_pending());
        assert_eq!(h.wizard.field_error(Field::Phone), Some(SEND_FAILED_MESSAGE));

        // Retry succeeds and clears the prompt
        h.wizard.submit().await.unwrap();
        assert_eq!(h.wizard.stage(), WizardStage::AwaitingOtp);
        assert_eq!(h.wizard.field_error(Field::Phone), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_resend_keeps_previous_code() {
        let mut h = harness(&["483920", "222222"]);
        on_otp_screen(&mut h).await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        h.notifier.fail_next(1);
        let err = h.wizard.resend().await.unwrap_err();
        assert!(matches!(err, WizardError::Delivery(_)));
        assert_eq!(h.wizard.field_error(Field::Otp), Some(RESEND_FAILED_MESSAGE));
        assert!(h.wizard.can_resend());

        h.wizard.set_code_input("483920").unwrap();
        assert!(matches!(
            h.wizard.verify().await.unwrap(),
            Step::Subscribed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_generator_fails_resend_instead_of_reissuing() {
        let codes: Vec<&str> = std::iter::repeat("111111").take(40).collect();
        let mut h = harness(&codes);
        on_otp_screen(&mut h).await;
        let challenge_id = h.wizard.challenge().unwrap().challenge_id;
        tokio::time::sleep(Duration::from_secs(60)).await;

        let err = h.wizard.resend().await.unwrap_err();

        assert!(matches!(
            err,
            WizardError::Delivery(DeliveryError::CodeUnavailable)
        ));
        assert_eq!(h.wizard.challenge().unwrap().challenge_id, challenge_id);
        assert_eq!(h.notifier.sent().len(), 1);
        assert_eq!(h.wizard.field_error(Field::Otp), Some(RESEND_FAILED_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verification_failure_stays_on_otp_screen() {
        let mut h = harness(&["483920"]);
        on_otp_screen(&mut h).await;
        h.service.set_fail_verification(true);

        h.wizard.set_code_input("483920").unwrap();
        let err = h.wizard.verify().await.unwrap_err();

        assert!(err.is_verification_failure());
        assert_eq!(h.wizard.stage(), WizardStage::AwaitingOtp);
        assert_eq!(
            h.wizard.field_error(Field::Otp),
            Some(VERIFICATION_FAILED_MESSAGE)
        );
        assert!(h.service.saved().is_empty());

        // Retry once the backend recovers
        h.service.set_fail_verification(false);
        assert!(matches!(
            h.wizard.verify().await.unwrap(),
            Step::Subscribed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_browser_save_failure_does_not_advance() {
        let mut h = harness(&[]);
        h.service.set_fail_persist(true);

        let err = h.wizard.submit().await.unwrap_err();
        assert!(matches!(err, WizardError::Verification(_)));
        assert_eq!(h.wizard.stage(), WizardStage::ChoosingPreferences);
        assert!(h.wizard.result().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_published_during_submit() {
        let mut h = harness(&[]);
        let mut pending = h.wizard.subscribe_pending();
        let handle = tokio::spawn(async move {
            pending.wait_for(|p| *p).await.unwrap();
            true
        });

        h.wizard.submit().await.unwrap();

        assert!(handle.await.unwrap());
        assert!(!h.wizard.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_mid_operation_leaves_state_untouched() {
        let mut h = harness(&["483920"]);
        h.wizard.toggle_whatsapp().unwrap();
        h.wizard.set_phone_number("+15551234567").unwrap();

        let closer = h.wizard.close_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            closer.close();
        });

        let err = h.wizard.submit().await.unwrap_err();
        assert!(matches!(err, WizardError::Closed));
        assert_eq!(h.wizard.stage(), WizardStage::ChoosingPreferences);
        assert!(h.wizard.challenge().is_none());
        assert!(h.notifier.sent().is_empty());
        assert!(matches!(h.wizard.toggle_browser(), Err(WizardError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_before_success_is_cancelled() {
        let mut h = harness(&["483920"]);
        on_otp_screen(&mut h).await;
        let mut countdown = h.wizard.subscribe_resend_countdown().unwrap();

        assert_eq!(h.wizard.close(), WizardExit::Cancelled);

        tokio::time::sleep(Duration::from_secs(5)).await;
        // Ticker is gone; the countdown never moved past its last value
        assert!(countdown.has_changed().is_err() || *countdown.borrow_and_update() == 60);
        assert!(h.service.saved().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_after_success_returns_result() {
        let mut h = harness(&[]);
        h.wizard.submit().await.unwrap();

        let expected = SubscriptionPreferences::new(true, false).unverified_result();
        assert_eq!(h.wizard.close(), WizardExit::Subscribed(expected));
    }
}
