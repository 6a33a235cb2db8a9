//! Error types for the application

use thiserror::Error;

use crate::oracle::{OracleError, Role};

/// Result type alias using our DcaError
pub type Result<T> = std::result::Result<T, DcaError>;

/// Main error type for pipeline and client operations
///
/// Guardrail tripwires, verifier issues and normalization rejections are
/// outcomes, not errors. They travel as data through the pipeline.
#[derive(Error, Debug)]
pub enum DcaError {
    /// Market context or every research query failed
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// A reasoning oracle call failed or returned malformed output
    #[error("{role} oracle call failed: {source}")]
    Oracle {
        role: Role,
        #[source]
        source: OracleError,
    },

    /// Exchange rejected or failed a request
    #[error("Exchange error {code}: {message}")]
    Exchange { code: i64, message: String },

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded: {message}, retry after {retry_after_seconds:?} seconds")]
    RateLimit {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Session record could not be written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Notification sink failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DcaError {
    /// Wrap an oracle failure with the role that produced it
    pub fn oracle(role: Role, source: OracleError) -> Self {
        DcaError::Oracle { role, source }
    }

    /// True when an oracle returned output that violated its declared schema
    pub fn is_schema_violation(&self) -> bool {
        matches!(
            self,
            DcaError::Oracle {
                source: OracleError::SchemaViolation(_) | OracleError::Json(_) | OracleError::RoleMismatch { .. },
                ..
            }
        )
    }
}

impl From<std::io::Error> for DcaError {
    fn from(err: std::io::Error) -> Self {
        DcaError::Persistence(err.to_string())
    }
}
