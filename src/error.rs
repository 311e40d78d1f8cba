//! Error types for a3s-cdr

use thiserror::Error;

/// Errors that can occur while protecting a stored object
///
/// Expected CDR rejections (4xx/5xx, exhausted 429s) are not errors: they
/// become placeholder artifacts. Everything here ends the invocation.
#[derive(Debug, Error)]
pub enum CdrError {
    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Trigger payload could not be parsed
    #[error("Invalid event payload: {0}")]
    Event(String),

    /// Storage read/write failure
    #[error("Transfer of '{key}' in '{location}' failed: {reason}")]
    Transfer {
        location: String,
        key: String,
        reason: String,
    },

    /// CDR request failed before any HTTP status was received
    #[error("CDR transport error for '{file_name}': {reason}")]
    Transport { file_name: String, reason: String },

    /// Invocation aborted through its cancellation token
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local I/O failure outside the object store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdrError {
    /// Build a transfer error for an object
    pub fn transfer(
        location: impl Into<String>,
        key: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Transfer {
            location: location.into(),
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for CDR operations
pub type Result<T> = std::result::Result<T, CdrError>;
