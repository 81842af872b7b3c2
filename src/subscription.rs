//! Subscription Types
//!
//! Channel preferences chosen in the wizard, the result handed back to the
//! host on success, and the dashboard's view of notification settings.

use serde::{Deserialize, Serialize};

/// Alert channels selected on the preferences screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPreferences {
    pub browser_enabled: bool,
    pub whatsapp_enabled: bool,
}

impl Default for SubscriptionPreferences {
    fn default() -> Self {
        Self {
            browser_enabled: true,
            whatsapp_enabled: false,
        }
    }
}

impl SubscriptionPreferences {
    pub fn new(browser_enabled: bool, whatsapp_enabled: bool) -> Self {
        Self {
            browser_enabled,
            whatsapp_enabled,
        }
    }

    /// Result for a submission that skipped phone verification
    pub fn unverified_result(&self) -> SubscriptionResult {
        SubscriptionResult {
            browser_enabled: self.browser_enabled,
            whatsapp_enabled: false,
            phone_number: None,
        }
    }

    /// Result after the WhatsApp number was verified
    pub fn verified_result(&self, phone_number: impl Into<String>) -> SubscriptionResult {
        SubscriptionResult {
            browser_enabled: self.browser_enabled,
            whatsapp_enabled: true,
            phone_number: Some(phone_number.into()),
        }
    }
}

/// What the user subscribed to; emitted once the wizard succeeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResult {
    pub browser_enabled: bool,
    pub whatsapp_enabled: bool,
    pub phone_number: Option<String>,
}

/// Notification settings as shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub browser: bool,
    pub whatsapp: bool,
    pub email: bool,
    /// Verified WhatsApp number, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_number: Option<String>,
}

impl NotificationSettings {
    /// Fold a completed subscription into the settings
    ///
    /// Email is managed from the account tab and is left untouched.
    pub fn apply(&mut self, result: &SubscriptionResult) {
        self.browser = result.browser_enabled;
        self.whatsapp = result.whatsapp_enabled;
        if result.whatsapp_enabled {
            self.whatsapp_number = result.phone_number.clone();
        }
    }
}
