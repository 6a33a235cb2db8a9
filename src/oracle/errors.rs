use thiserror::Error;

use super::types::Role;

/// Failure of a single oracle call
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("API request failed: {0}")]
    Api(String),
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Timeout")]
    Timeout,
    #[error("Schema validation failed: {0}")]
    SchemaViolation(String),
    #[error("expected {expected}, got {got} output")]
    RoleMismatch { expected: &'static str, got: Role },
}
