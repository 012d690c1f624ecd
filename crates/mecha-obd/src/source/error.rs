//! Line source errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid replay line {line}: {reason}")]
    InvalidReplayLine { line: usize, reason: String },
}
