//! Session events broadcast to subscribers

use serde::{Deserialize, Serialize};

use super::{DtcCode, SessionId, Severity, SubsystemTag, Timestamp};

/// Fault lifecycle transition worth surfacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultEventKind {
    /// Candidate confirmed by the debounce count
    Raised,
    /// Active fault re-reported often enough to escalate
    Escalated,
    /// Fault absent for the clear count
    Cleared,
}

/// A fault lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    pub session_id: SessionId,
    pub code: DtcCode,
    pub kind: FaultEventKind,
    pub system: SubsystemTag,
    pub severity: Severity,
    pub at: Timestamp,
}

/// Event emitted by a session's ingestion pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Fault(FaultEvent),
    /// Consecutive malformed frames reached the configured threshold
    LinkDegraded {
        session_id: SessionId,
        consecutive: u32,
    },
    /// Interface read timed out
    NoData { session_id: SessionId },
    /// Ingestion task for this session ended
    IngestionStopped {
        session_id: SessionId,
        reason: String,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionEvent::Fault(e) => &e.session_id,
            SessionEvent::LinkDegraded { session_id, .. } => session_id,
            SessionEvent::NoData { session_id } => session_id,
            SessionEvent::IngestionStopped { session_id, .. } => session_id,
        }
    }
}
