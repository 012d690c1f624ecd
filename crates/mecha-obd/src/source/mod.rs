//! Line sources feeding the ingestion loop
//!
//! The engine only needs `read_line() -> bytes | EOF | error`; timeouts are
//! applied by the caller. Sources:
//! - [`TcpLineSource`]: ELM327-compatible Wi-Fi adapter, one response per `>` prompt
//! - [`ReplaySource`]: captured adapter log with per-line timestamps
//! - [`ChannelSource`]: in-process producers and tests

mod channel;
pub mod error;
mod replay;
mod tcp;

pub use channel::ChannelSource;
pub use error::SourceError;
pub use replay::ReplaySource;
pub use tcp::{PollPlan, TcpLineSource};

use async_trait::async_trait;
use bytes::Bytes;
use mecha_core::Timestamp;

/// One raw adapter response with the time the transport received it
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub bytes: Bytes,
    pub observed_at: Timestamp,
}

impl RawLine {
    pub fn new(bytes: impl Into<Bytes>, observed_at: Timestamp) -> Self {
        Self {
            bytes: bytes.into(),
            observed_at,
        }
    }
}

/// Transport-agnostic source of raw adapter responses
///
/// Implementations must be cancel-safe: a `read_line` future dropped by a
/// timeout must not lose data that a later call would have returned.
#[async_trait]
pub trait LineSource: Send {
    /// Next response, or `None` at end of stream
    async fn read_line(&mut self) -> Result<Option<RawLine>, SourceError>;

    /// Short description for logs
    fn describe(&self) -> String;
}

#[async_trait]
impl<S: LineSource + ?Sized> LineSource for Box<S> {
    async fn read_line(&mut self) -> Result<Option<RawLine>, SourceError> {
        (**self).read_line().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
