//! AlertShip
//!
//! Client-side core of the AlertShip outage-alert app: the notification
//! subscription wizard with WhatsApp one-time-code verification, plus the
//! session, page navigation and outage report form around it.
//!
//! The WhatsApp channel and the backend are simulated in-process
//! ([`SimulatedWhatsAppNotifier`], [`SimulatedSubscriptionService`]) behind
//! async traits, so a real transport can be swapped in without touching the
//! wizard.
//!
//! ```ignore
//! let config = WizardConfig::from_env()?;
//! let mut wizard = SubscriptionWizard::new(WizardCollaborators::simulated(&config), config);
//! wizard.toggle_whatsapp()?;
//! wizard.set_phone_number("+15551234567")?;
//! wizard.submit().await?;
//! wizard.set_code_input("483920")?;
//! if let Step::Subscribed(result) = wizard.verify().await? {
//!     println!("{}", serde_json::to_string(&result)?);
//! }
//! ```

pub mod config;
pub mod cooldown;
pub mod delivery;
pub mod otp;
pub mod report;
pub mod service;
pub mod session;
pub mod shell;
pub mod subscription;
pub mod telemetry;
pub mod validation;
pub mod wizard;

pub use config::{ConfigError, WizardConfig};
pub use cooldown::ResendCooldown;
pub use delivery::{DeliveryError, OtpNotifier, SentCode, SimulatedWhatsAppNotifier};
pub use otp::{CodeGenerator, OtpChallenge, RandomCodeGenerator, ScriptedCodeGenerator};
pub use report::{
    OutageReport, ReportError, ReportForm, ReportReceipt, ReportService, SimulatedReportService,
};
pub use service::{ServiceError, SimulatedSubscriptionService, SubscriptionService};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionError, SessionStore, User};
pub use shell::{AppView, DashboardTab, Modal, Shell};
pub use subscription::{NotificationSettings, SubscriptionPreferences, SubscriptionResult};
pub use validation::{Field, FieldErrors, ValidationError};
pub use wizard::{
    CloseHandle, LoginPrompt, Step, SubscriptionWizard, WizardCollaborators, WizardEntry,
    WizardError, WizardExit, WizardStage,
};
