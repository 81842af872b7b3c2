//! Host Shell
//!
//! Which page is showing, which modal (if any) sits on top of it, and the
//! session every page reads from. Pages are one enum so two of them can never
//! be showing at once.

use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::WizardConfig;
use crate::report::{ReportError, ReportForm, ReportReceipt, ReportService};
use crate::session::{Session, SessionError, User};
use crate::subscription::NotificationSettings;
use crate::wizard::{SubscriptionWizard, WizardCollaborators, WizardEntry, WizardExit};

/// How outages are laid out on the outage page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutageLayout {
    #[default]
    List,
    Map,
}

impl OutageLayout {
    pub fn toggled(self) -> Self {
        match self {
            Self::List => Self::Map,
            Self::Map => Self::List,
        }
    }
}

/// Tabs on the user dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardTab {
    #[default]
    Overview,
    Reports,
    Locations,
    Notifications,
    Account,
}

impl DashboardTab {
    pub const ALL: [DashboardTab; 5] = [
        Self::Overview,
        Self::Reports,
        Self::Locations,
        Self::Notifications,
        Self::Account,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Reports => "reports",
            Self::Locations => "locations",
            Self::Notifications => "notifications",
            Self::Account => "account",
        }
    }
}

impl std::fmt::Display for DashboardTab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DashboardTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tab| tab.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown dashboard tab: {}", s))
    }
}

/// The page currently showing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "view")]
pub enum AppView {
    #[default]
    Landing,
    Outages {
        location: String,
        layout: OutageLayout,
    },
    ReportForm {
        location: String,
    },
    UpcomingOutages {
        location: String,
    },
    Dashboard {
        tab: DashboardTab,
    },
}

impl AppView {
    /// The searched location, on pages that have one
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Outages { location, .. }
            | Self::ReportForm { location }
            | Self::UpcomingOutages { location } => Some(location),
            Self::Landing | Self::Dashboard { .. } => None,
        }
    }
}

/// Overlay on top of the current page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Modal {
    LogIn,
    SignUp,
    Notifications,
}

/// Application shell
#[derive(Debug)]
pub struct Shell {
    session: Session,
    view: AppView,
    modal: Option<Modal>,
    report_form: ReportForm,
    last_receipt: Option<ReportReceipt>,
    notification_settings: NotificationSettings,
}

impl Shell {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            view: AppView::Landing,
            modal: None,
            report_form: ReportForm::new(),
            last_receipt: None,
            notification_settings: NotificationSettings {
                browser: true,
                ..NotificationSettings::default()
            },
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn view(&self) -> &AppView {
        &self.view
    }

    pub fn modal(&self) -> Option<Modal> {
        self.modal
    }

    pub fn report_form(&self) -> &ReportForm {
        &self.report_form
    }

    pub fn report_form_mut(&mut self) -> &mut ReportForm {
        &mut self.report_form
    }

    /// Receipt of the report just submitted, until the user navigates away
    pub fn last_receipt(&self) -> Option<&ReportReceipt> {
        self.last_receipt.as_ref()
    }

    pub fn notification_settings(&self) -> &NotificationSettings {
        &self.notification_settings
    }

    fn navigate(&mut self, view: AppView) {
        debug!(from = ?self.view, to = ?view, "Navigate");
        self.view = view;
    }

    // ── Pages ──

    /// Search a location; blank input is ignored
    pub fn submit_location(&mut self, location: &str) {
        let location = location.trim();
        if location.is_empty() {
            return;
        }
        self.navigate(AppView::Outages {
            location: location.to_string(),
            layout: OutageLayout::default(),
        });
    }

    pub fn back_to_home(&mut self) {
        self.last_receipt = None;
        self.navigate(AppView::Landing);
    }

    /// From the report form or calendar back to the outage page
    pub fn back_to_outages(&mut self) {
        self.last_receipt = None;
        if let AppView::ReportForm { location } | AppView::UpcomingOutages { location } =
            &self.view
        {
            let location = location.clone();
            self.navigate(AppView::Outages {
                location,
                layout: OutageLayout::default(),
            });
        }
    }

    pub fn toggle_layout(&mut self) {
        if let AppView::Outages { layout, .. } = &mut self.view {
            *layout = layout.toggled();
        }
    }

    /// Open the report form; logged-out users get the login modal instead
    pub fn report_issue(&mut self) {
        if !self.session.is_logged_in() {
            self.open_login();
            return;
        }
        if let Some(location) = self.view.location().map(str::to_string) {
            self.navigate(AppView::ReportForm { location });
        }
    }

    pub fn view_upcoming_outages(&mut self) {
        if let Some(location) = self.view.location().map(str::to_string) {
            self.navigate(AppView::UpcomingOutages { location });
        }
    }

    /// Open the dashboard (logged-in users only)
    pub fn open_dashboard(&mut self) {
        if self.session.is_logged_in() {
            self.navigate(AppView::Dashboard {
                tab: DashboardTab::default(),
            });
        } else {
            self.open_login();
        }
    }

    pub fn select_tab(&mut self, tab: DashboardTab) {
        if let AppView::Dashboard { tab: current } = &mut self.view {
            *current = tab;
        }
    }

    /// Submit the report form from the report page
    pub async fn submit_report(
        &mut self,
        service: &dyn ReportService,
    ) -> Result<&ReportReceipt, ReportError> {
        let receipt = self.report_form.submit(service).await?;
        Ok(&*self.last_receipt.insert(receipt))
    }

    // ── Modals ──

    pub fn open_login(&mut self) {
        self.modal = Some(Modal::LogIn);
    }

    pub fn open_sign_up(&mut self) {
        self.modal = Some(Modal::SignUp);
    }

    pub fn switch_to_login(&mut self) {
        if self.modal == Some(Modal::SignUp) {
            self.modal = Some(Modal::LogIn);
        }
    }

    pub fn switch_to_sign_up(&mut self) {
        if self.modal == Some(Modal::LogIn) {
            self.modal = Some(Modal::SignUp);
        }
    }

    pub fn close_modal(&mut self) {
        self.modal = None;
    }

    /// Log in from the login or sign-up modal and land on the dashboard
    pub async fn log_in(&mut self, user: User) -> Result<(), SessionError> {
        self.session.log_in(user).await?;
        self.modal = None;
        self.navigate(AppView::Dashboard {
            tab: DashboardTab::Overview,
        });
        Ok(())
    }

    pub async fn log_out(&mut self) -> Result<(), SessionError> {
        self.session.log_out().await?;
        self.modal = None;
        self.navigate(AppView::Landing);
        Ok(())
    }

    /// Show the subscription modal and open the wizard against this session
    pub fn open_notifications(
        &mut self,
        collaborators: WizardCollaborators,
        config: WizardConfig,
    ) -> WizardEntry {
        self.modal = Some(Modal::Notifications);
        SubscriptionWizard::open(&self.session, collaborators, config)
    }

    /// Act on how the wizard (or its login prompt) ended
    pub fn apply_wizard_exit(&mut self, exit: WizardExit) {
        if self.modal == Some(Modal::Notifications) {
            self.modal = None;
        }

        match exit {
            WizardExit::Cancelled => {}
            WizardExit::LoginRequested => self.open_login(),
            WizardExit::Subscribed(result) => {
                info!(
                    browser = result.browser_enabled,
                    whatsapp = result.whatsapp_enabled,
                    "Subscription applied to notification settings"
                );
                self.notification_settings.apply(&result);
            }
        }
    }
}
