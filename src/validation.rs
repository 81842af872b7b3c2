//! Field Validation
//!
//! Field-level validation failures shared by the subscription wizard and the
//! outage report form. Messages are the ones shown inline under each input.

use serde::Serialize;
use std::collections::BTreeMap;

/// Input fields that can carry an inline error message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// WhatsApp number on the preferences screen
    Phone,
    /// Verification code on the OTP screen
    Otp,
    /// Outage report description
    Description,
    /// Outage report address
    Address,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Otp => "otp",
            Self::Description => "description",
            Self::Address => "address",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inline error messages keyed by field
pub type FieldErrors = BTreeMap<Field, String>;

/// A recoverable, field-level validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Phone number is required for WhatsApp notifications")]
    PhoneRequired,

    #[error("OTP is required")]
    CodeRequired,

    #[error("OTP must be 6 digits")]
    CodeLength,

    #[error("Invalid OTP. Please try again.")]
    CodeMismatch,

    #[error("Description is required")]
    DescriptionRequired,

    #[error("Address is required")]
    AddressRequired,
}

impl ValidationError {
    /// The field this failure is reported against
    pub fn field(&self) -> Field {
        match self {
            Self::PhoneRequired => Field::Phone,
            Self::CodeRequired | Self::CodeLength | Self::CodeMismatch => Field::Otp,
            Self::DescriptionRequired => Field::Description,
            Self::AddressRequired => Field::Address,
        }
    }

    /// Record this failure in an error map, replacing any earlier message for the field
    pub fn record(self, errors: &mut FieldErrors) {
        errors.insert(self.field(), self.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_failures_report_against_otp_field() {
        for err in [
            ValidationError::CodeRequired,
            ValidationError::CodeLength,
            ValidationError::CodeMismatch,
        ] {
            assert_eq!(err.field(), Field::Otp);
        }
        assert_eq!(ValidationError::PhoneRequired.field(), Field::Phone);
    }

    #[test]
    fn test_record_replaces_previous_message() {
        let mut errors = FieldErrors::new();
        ValidationError::CodeRequired.record(&mut errors);
        ValidationError::CodeMismatch.record(&mut errors);

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get(&Field::Otp).map(String::as_str),
            Some("Invalid OTP. Please try again.")
        );
    }
}
