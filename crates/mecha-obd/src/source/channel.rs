//! Channel-backed line source

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{LineSource, RawLine, SourceError};

/// Line source fed through an mpsc channel
///
/// The stream ends when every sender is dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<Result<RawLine, SourceError>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Result<RawLine, SourceError>>) -> Self {
        Self { rx }
    }

    /// Create a source together with its sender
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<RawLine, SourceError>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl LineSource for ChannelSource {
    async fn read_line(&mut self) -> Result<Option<RawLine>, SourceError> {
        self.rx.recv().await.transpose()
    }

    fn describe(&self) -> String {
        "channel".to_string()
    }
}
