//! Engine-level errors

use mecha_core::{DtcCode, Timestamp};
use thiserror::Error;

/// Fault Tracker boundary errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackerError {
    /// Scan is not newer than the last applied scan of the same session
    #[error("Out-of-order scan: observed at {observed_at}, last applied {last_applied}")]
    OutOfOrderScan {
        observed_at: Timestamp,
        last_applied: Timestamp,
    },

    /// Code is not in the static fault table
    #[error("Unknown DTC code: {0}")]
    UnknownDtcCode(DtcCode),
}

/// DTC catalog loading errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid DTC code '{code}': {reason}")]
    InvalidCode { code: String, reason: String },

    #[error("Invalid entry for {code}: {reason}")]
    InvalidEntry { code: String, reason: String },

    #[error("Duplicate DTC code: {0}")]
    DuplicateCode(DtcCode),
}

/// Engine configuration errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
