//! DiagnosticsQuery trait - the read-only seam for presentation collaborators

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::broadcast;

use crate::error::DiagnosticsResult;
use crate::models::{
    ActiveFault, DtcReport, DtcReportKind, FaultFilter, Pid, Reading, Report, SessionEvent,
    SessionId, SessionInfo, SubsystemHealth, Timestamp, VehicleHealth,
};

/// Read-only query API over live diagnostics sessions
///
/// Every method is side-effect-free with respect to session state. Implementors
/// take a point-in-time snapshot instead of holding locks across calls.
#[async_trait]
pub trait DiagnosticsQuery: Send + Sync {
    /// List known sessions
    async fn sessions(&self) -> Vec<SessionInfo>;

    /// Summary of one session
    async fn session_info(&self, session_id: &SessionId) -> DiagnosticsResult<SessionInfo>;

    /// Latest reading for every PID seen in the session, ordered by PID
    async fn get_latest(&self, session_id: &SessionId) -> DiagnosticsResult<Vec<Reading>>;

    /// Readings for one PID within `duration` of the session's latest data
    async fn get_window(
        &self,
        session_id: &SessionId,
        pid: Pid,
        duration: Duration,
    ) -> DiagnosticsResult<Vec<Reading>>;

    /// Faults currently surfaced (Active or Clearing)
    async fn get_active_faults(
        &self,
        session_id: &SessionId,
        filter: Option<&FaultFilter>,
    ) -> DiagnosticsResult<Vec<ActiveFault>>;

    /// Cleared faults still inside the retention period
    async fn get_fault_history(&self, session_id: &SessionId)
        -> DiagnosticsResult<Vec<ActiveFault>>;

    /// Most recent non-lifecycle DTC report of the given kind
    async fn get_dtc_snapshot(
        &self,
        session_id: &SessionId,
        kind: DtcReportKind,
    ) -> DiagnosticsResult<Option<DtcReport>>;

    /// Per-subsystem health from the current window and active faults
    async fn get_health(&self, session_id: &SessionId) -> DiagnosticsResult<Vec<SubsystemHealth>>;

    /// Aggregate vehicle health
    async fn get_vehicle_health(&self, session_id: &SessionId) -> DiagnosticsResult<VehicleHealth>;

    /// Assemble an immutable report for `[start, end]`
    async fn get_report(
        &self,
        session_id: &SessionId,
        start: Timestamp,
        end: Timestamp,
    ) -> DiagnosticsResult<Report>;

    /// Subscribe to events from all sessions
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}
