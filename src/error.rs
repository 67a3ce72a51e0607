// Typed error conditions
//
// Operation boundaries return `anyhow::Result` with context. The enums below
// are the causes a caller can branch on (via `downcast_ref`), e.g. to tell a
// user exactly which columns are missing from an export.

use thiserror::Error;

/// Why an import file could not be read at all.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImportError {
    #[error("unsupported file type '{0}' (expected .csv, .xlsx, .xls, .ods or .json)")]
    UnsupportedFormat(String),

    #[error("missing required column(s): {} (found: {})", .missing.join(", "), .found.join(", "))]
    MissingColumns {
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("sheet '{requested}' not found (available: {})", .available.join(", "))]
    UnknownSheet {
        requested: String,
        available: Vec<String>,
    },

    #[error("the file contains no data rows")]
    EmptyTable,

    #[error("JSON document is not a BWA export, missing key(s): {}", .missing.join(", "))]
    InvalidJsonSchema { missing: Vec<String> },
}

/// Why a single input row was rejected during import.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RowError {
    #[error("account number is empty")]
    MissingAccount,

    #[error("amount '{0}' is not a number")]
    InvalidAmount(String),

    #[error("date '{0}' matches none of the supported formats")]
    InvalidDate(String),
}

impl RowError {
    /// Short machine-friendly name, used to group rejections in reports
    pub fn kind(&self) -> &'static str {
        match self {
            RowError::MissingAccount => "missing_account",
            RowError::InvalidAmount(_) => "invalid_amount",
            RowError::InvalidDate(_) => "invalid_date",
        }
    }
}

/// Problems with persisted configuration values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettingsError {
    #[error("unknown settings key '{0}'")]
    UnknownKey(String),

    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("stored value for '{key}' is not valid JSON: {reason}")]
    CorruptBlob { key: String, reason: String },
}

impl SettingsError {
    pub fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_every_column() {
        let err = ImportError::MissingColumns {
            missing: vec!["Betrag".to_string(), "Buchungstag".to_string()],
            found: vec!["Sachkontonr.".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Betrag, Buchungstag"));
        assert!(msg.contains("found: Sachkontonr."));
    }

    #[test]
    fn test_row_error_kinds() {
        assert_eq!(RowError::MissingAccount.kind(), "missing_account");
        assert_eq!(RowError::InvalidAmount("x".into()).kind(), "invalid_amount");
        assert_eq!(RowError::InvalidDate("x".into()).kind(), "invalid_date");
    }
}
