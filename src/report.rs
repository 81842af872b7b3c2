//! Outage Report Form
//!
//! Form state for reporting an electricity or water outage, with inline
//! validation and a simulated submission.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::validation::{Field, FieldErrors, ValidationError};

/// Which utility is out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Utility {
    #[default]
    Electricity,
    Water,
}

/// How bad it is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

/// A photo picked for upload (only its metadata is kept)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoAttachment {
    pub file_name: String,
    pub size_bytes: u64,
}

/// The report as entered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutageReport {
    pub utility: Utility,
    pub description: String,
    pub address: String,
    pub severity: Severity,
    pub photo: Option<PhotoAttachment>,
}

impl OutageReport {
    /// Every validation failure, not just the first
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.description.trim().is_empty() {
            ValidationError::DescriptionRequired.record(&mut errors);
        }
        if self.address.trim().is_empty() {
            ValidationError::AddressRequired.record(&mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Acknowledgement for a submitted report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportReceipt {
    pub report_id: Uuid,
    pub submitted_at: DateTime<Utc>,
}

/// Error type for report submission
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Report has {} invalid field(s)", .0.len())]
    Invalid(FieldErrors),

    #[error("Failed to submit report: {0}")]
    SubmitFailed(String),
}

/// Accepts outage reports
#[async_trait]
pub trait ReportService: Send + Sync {
    async fn submit_report(&self, report: &OutageReport) -> Result<ReportReceipt, ReportError>;
}

/// In-process stand-in for the report backend
#[derive(Debug, Default)]
pub struct SimulatedReportService {
    delay: Duration,
    received: Mutex<Vec<OutageReport>>,
    fail: AtomicBool,
}

impl SimulatedReportService {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<OutageReport> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReportService for SimulatedReportService {
    async fn submit_report(&self, report: &OutageReport) -> Result<ReportReceipt, ReportError> {
        tokio::time::sleep(self.delay).await;

        if self.fail.load(Ordering::SeqCst) {
            return Err(ReportError::SubmitFailed("simulated failure".to_string()));
        }

        if let Ok(mut received) = self.received.lock() {
            received.push(report.clone());
        }
        Ok(ReportReceipt {
            report_id: Uuid::new_v4(),
            submitted_at: Utc::now(),
        })
    }
}

/// Editable report form with inline errors
#[derive(Debug, Clone, Default)]
pub struct ReportForm {
    report: OutageReport,
    errors: FieldErrors,
}

impl ReportForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> &OutageReport {
        &self.report
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn set_utility(&mut self, utility: Utility) {
        self.report.utility = utility;
    }

    pub fn set_severity(&mut self, severity: Severity) {
        self.report.severity = severity;
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.report.description = description.into();
        self.errors.remove(&Field::Description);
    }

    pub fn set_address(&mut self, address: impl Into<String>) {
        self.report.address = address.into();
        self.errors.remove(&Field::Address);
    }

    pub fn attach_photo(&mut self, photo: PhotoAttachment) {
        self.report.photo = Some(photo);
    }

    pub fn remove_photo(&mut self) {
        self.report.photo = None;
    }

    /// Validate and submit; on success the form resets to its defaults
    pub async fn submit(&mut self, service: &dyn ReportService) -> Result<ReportReceipt, ReportError> {
        if let Err(errors) = self.report.validate() {
            self.errors = errors.clone();
            return Err(ReportError::Invalid(errors));
        }
        self.errors.clear();

        match service.submit_report(&self.report).await {
            Ok(receipt) => {
                info!(
                    report_id = %receipt.report_id,
                    utility = ?self.report.utility,
                    severity = ?self.report.severity,
                    "Report submitted"
                );
                self.report = OutageReport::default();
                Ok(receipt)
            }
            Err(e) => {
                error!(error = %e, "Error submitting report");
                Err(e)
            }
        }
    }
}
