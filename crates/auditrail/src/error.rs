use thiserror::Error;

/// Message returned to callers when a write fails after validation.
pub const LOG_FAILED_MESSAGE: &str = "Failed to log activity";

#[derive(Debug, Error)]
pub enum AuditError {
    /// Input failed a field check. Recoverable, returned to the caller.
    #[error("Validation error on `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("Metadata too large: {size} bytes (limit {limit})")]
    MetadataTooLarge { size: usize, limit: usize },

    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    /// Generic write failure. Internal detail is only logged, never carried here.
    #[error("{}", LOG_FAILED_MESSAGE)]
    LogFailed,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Activity not found: {0}")]
    NotFound(i64),

    #[error("Start date and end date are required for a compliance report")]
    DateRangeRequired,

    #[error("Configuration error: {0}")]
    Config(#[from] envy::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(String),
}

impl AuditError {
    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AuditError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The offending field for validation failures.
    pub fn field(&self) -> Option<&str> {
        match self {
            AuditError::Validation { field, .. } => Some(field),
            AuditError::MetadataTooLarge { .. } | AuditError::InvalidJson(_) => Some("metadata"),
            _ => None,
        }
    }

    /// Whether the caller can fix the request and retry.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AuditError::Validation { .. }
                | AuditError::MetadataTooLarge { .. }
                | AuditError::InvalidJson(_)
                | AuditError::DateRangeRequired
        )
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
