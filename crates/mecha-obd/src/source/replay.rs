//! Replay of captured adapter logs
//!
//! One response per line: an RFC 3339 timestamp, whitespace, then the raw
//! response text. Multi-line responses write their line breaks as the two
//! characters `\r`. Blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! 2024-01-15T14:30:22Z 41 0C 1A F8
//! 2024-01-15T14:30:23Z 7E8 10 0A 43 04 01 03 02 71\r7E8 21 01 04 00 00 00 00
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mecha_core::Timestamp;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::time::Instant;
use tracing::debug;

use super::{LineSource, RawLine, SourceError};

/// Longest pause inserted between paced lines
const MAX_PACE_GAP: Duration = Duration::from_secs(60);

/// Line source replaying a captured log
pub struct ReplaySource {
    name: String,
    lines: Lines<Box<dyn AsyncBufRead + Send + Unpin>>,
    line_no: usize,
    /// Sleep between lines for the gap between their timestamps
    pace: bool,
    last_at: Option<Timestamp>,
    /// Line already read from the file, held until its release time
    pending: Option<(RawLine, Instant)>,
}

impl ReplaySource {
    /// Open a replay file
    pub async fn open(path: impl AsRef<Path>, pace: bool) -> Result<Self, SourceError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| SourceError::ConnectFailed(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), pace, "Opened replay file");
        Ok(Self::from_reader(
            path.display().to_string(),
            BufReader::new(file),
            pace,
        ))
    }

    /// Replay from any buffered reader
    pub fn from_reader(
        name: impl Into<String>,
        reader: impl AsyncBufRead + Send + Unpin + 'static,
        pace: bool,
    ) -> Self {
        let reader: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(reader);
        Self {
            name: name.into(),
            lines: reader.lines(),
            line_no: 0,
            pace,
            last_at: None,
            pending: None,
        }
    }

    /// Replay from an in-memory log
    pub fn from_string(name: impl Into<String>, log: impl Into<String>) -> Self {
        let bytes = log.into().into_bytes();
        Self::from_reader(name, BufReader::new(std::io::Cursor::new(bytes)), false)
    }
}

/// Parse one log line into a timestamped response
pub fn parse_replay_line(line_no: usize, line: &str) -> Result<Option<RawLine>, SourceError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let invalid = |reason: String| SourceError::InvalidReplayLine {
        line: line_no,
        reason,
    };
    let (stamp, frame) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| invalid("missing frame after timestamp".to_string()))?;
    let observed_at = DateTime::parse_from_rfc3339(stamp)
        .map_err(|e| invalid(format!("bad timestamp '{}': {}", stamp, e)))?
        .with_timezone(&Utc);

    let frame = frame.trim().replace("\\r", "\r");
    Ok(Some(RawLine::new(frame.into_bytes(), observed_at)))
}

#[async_trait]
impl LineSource for ReplaySource {
    async fn read_line(&mut self) -> Result<Option<RawLine>, SourceError> {
        loop {
            // Dropping this future while asleep keeps the line for the next call
            if let Some(release_at) = self.pending.as_ref().map(|(_, at)| *at) {
                tokio::time::sleep_until(release_at).await;
                if let Some((raw, _)) = self.pending.take() {
                    self.last_at = Some(raw.observed_at);
                    return Ok(Some(raw));
                }
            }

            let Some(line) = self
                .lines
                .next_line()
                .await
                .map_err(|e| SourceError::ReceiveFailed(e.to_string()))?
            else {
                return Ok(None);
            };
            self.line_no += 1;

            let Some(raw) = parse_replay_line(self.line_no, &line)? else {
                continue;
            };

            let gap = if self.pace {
                self.last_at
                    .and_then(|last| (raw.observed_at - last).to_std().ok())
            } else {
                None
            };
            match gap {
                Some(gap) => {
                    self.pending = Some((raw, Instant::now() + gap.min(MAX_PACE_GAP)));
                }
                None => {
                    self.last_at = Some(raw.observed_at);
                    return Ok(Some(raw));
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.name)
    }
}
