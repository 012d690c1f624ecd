//! Query-layer error types

use thiserror::Error;

use crate::models::SessionId;

/// Result type for query operations
pub type DiagnosticsResult<T> = Result<T, DiagnosticsError>;

/// Errors returned across the query boundary
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DiagnosticsError {
    /// No session with this id is known to the engine
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// No readings and no faults fall inside the requested window
    #[error("No readings or faults between {start} and {end}")]
    EmptyWindow { start: String, end: String },

    /// Window bounds are inverted or otherwise unusable
    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    /// Request could not be interpreted (bad PID, bad filter value)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DiagnosticsError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            DiagnosticsError::SessionNotFound(_) => 404,
            DiagnosticsError::EmptyWindow { .. } => 422,
            DiagnosticsError::InvalidWindow(_) => 400,
            DiagnosticsError::InvalidRequest(_) => 400,
            DiagnosticsError::Internal(_) => 500,
        }
    }
}
