//! Immutable diagnostic report snapshot

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{ActiveFault, SessionId, SubsystemHealth, Timestamp};

/// Point-in-time snapshot of fault and health state for a time window
///
/// Reports are never mutated after assembly. Every collection is ordered, so
/// the serialized form is canonical and can be hashed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub session_id: SessionId,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub subsystem_health: Vec<SubsystemHealth>,
    pub faults: Vec<ActiveFault>,
    /// As-of time: the latest data timestamp the session had applied
    pub generated_at: Timestamp,
}

impl Report {
    /// Canonical JSON bytes of this report
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Serializing plain structs, Vecs and BTreeSets cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Lowercase hex SHA-256 of the canonical serialization
    ///
    /// Suitable as an external cache key for rendered documents.
    pub fn content_hash(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_bytes()))
    }

    /// Aggregate score over the report's subsystems
    pub fn overall_score(&self) -> u8 {
        super::VehicleHealth::from_subsystems(self.subsystem_health.clone()).score
    }
}
