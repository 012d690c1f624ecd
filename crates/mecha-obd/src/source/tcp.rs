//! ELM327-compatible adapter over TCP (Wi-Fi dongles)
//!
//! The adapter is request/response: every command is answered with text
//! terminated by a `>` prompt. This source cycles through a poll plan and
//! yields one response per prompt.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

use super::{LineSource, RawLine, SourceError};

const PROMPT: u8 = b'>';
const MAX_RESPONSE: usize = 4096;

/// Commands sent once after connect, and the request cycle that follows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPlan {
    /// Adapter setup commands; their responses are discarded
    #[serde(default = "default_init")]
    pub init: Vec<String>,
    /// Requests polled round-robin
    #[serde(default = "default_requests")]
    pub requests: Vec<String>,
}

fn default_init() -> Vec<String> {
    // reset, echo off, linefeeds off, spaces on, headers on, auto protocol
    ["ATZ", "ATE0", "ATL0", "ATS1", "ATH1", "ATSP0"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_requests() -> Vec<String> {
    ["0105", "010C", "010D", "0142", "012F", "0107", "015C", "03", "07"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for PollPlan {
    fn default() -> Self {
        Self {
            init: default_init(),
            requests: default_requests(),
        }
    }
}

/// Line source talking to an ELM327 adapter over TCP
pub struct TcpLineSource {
    address: String,
    stream: TcpStream,
    buf: BytesMut,
    plan: PollPlan,
    next_request: usize,
    /// A request was sent and its prompt has not arrived yet
    awaiting_prompt: bool,
}

impl TcpLineSource {
    /// Connect and run the init commands
    pub async fn connect(
        address: &str,
        plan: PollPlan,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| SourceError::ConnectFailed(format!("{}: timed out", address)))?
            .map_err(|e| SourceError::ConnectFailed(format!("{}: {}", address, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| SourceError::ConnectFailed(e.to_string()))?;

        let mut source = Self {
            address: address.to_string(),
            stream,
            buf: BytesMut::with_capacity(256),
            plan,
            next_request: 0,
            awaiting_prompt: false,
        };

        let init = source.plan.init.clone();
        for command in &init {
            source.send(command).await?;
            let response = tokio::time::timeout(timeout, source.read_response())
                .await
                .map_err(|_| SourceError::ConnectFailed(format!("{} did not answer {}", address, command)))??;
            trace!(command = %command, response = %String::from_utf8_lossy(&response), "Adapter init");
        }

        info!(address = %source.address, "Connected to adapter");
        Ok(source)
    }

    async fn send(&mut self, command: &str) -> Result<(), SourceError> {
        debug!(command = %command, "Sending request");
        self.stream
            .write_all(format!("{}\r", command).as_bytes())
            .await
            .map_err(|e| SourceError::SendFailed(e.to_string()))?;
        self.awaiting_prompt = true;
        Ok(())
    }

    /// Read until the next prompt. Partial data stays in `buf` if cancelled.
    async fn read_response(&mut self) -> Result<Vec<u8>, SourceError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == PROMPT) {
                let response = self.buf.split_to(pos).to_vec();
                self.buf.advance(1);
                self.awaiting_prompt = false;
                return Ok(response);
            }
            if self.buf.len() > MAX_RESPONSE {
                self.buf.clear();
                return Err(SourceError::ReceiveFailed(format!(
                    "no prompt within {} bytes",
                    MAX_RESPONSE
                )));
            }

            let n = self
                .stream
                .read_buf(&mut self.buf)
                .await
                .map_err(|e| SourceError::ReceiveFailed(e.to_string()))?;
            if n == 0 {
                return Err(SourceError::ConnectionClosed);
            }
        }
    }
}

#[async_trait]
impl LineSource for TcpLineSource {
    async fn read_line(&mut self) -> Result<Option<RawLine>, SourceError> {
        if !self.awaiting_prompt && !self.plan.requests.is_empty() {
            let command = self.plan.requests[self.next_request % self.plan.requests.len()].clone();
            self.next_request = self.next_request.wrapping_add(1);
            self.send(&command).await?;
        }
        let response = self.read_response().await?;
        Ok(Some(RawLine::new(response, Utc::now())))
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.address)
    }
}
