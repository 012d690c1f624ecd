//! Session identity and summary models

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Timestamp;

/// Identifier of one vehicle-interface connection's worth of state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Ingestion task is attached and reading
    Ingesting,
    /// Session exists but no ingestion task is attached (e.g. waiting for reconnect)
    Idle,
    /// Session was closed; state is still queryable until removed
    Closed,
}

/// Summary of a session for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    /// Vehicle this session is connected to
    pub vehicle_id: String,
    /// Human-readable vehicle name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_name: Option<String>,
    pub status: SessionStatus,
    /// Timestamp of the most recent applied reading or scan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_data_at: Option<Timestamp>,
    /// Number of readings currently buffered
    pub buffered_readings: usize,
    /// Whether the link is currently flagged as degraded
    pub link_degraded: bool,
}
