//! Per-session state: one vehicle connection's buffer and fault tracker
//!
//! The ingestion task is the only writer. Writers hold the lock for a single
//! apply; readers copy what they need under the lock and compute outside it.

use std::sync::Arc;

use chrono::Duration;
use mecha_core::{
    ActiveFault, DtcReport, DtcReportKind, FaultFilter, Pid, Reading, SessionEvent, SessionId,
    SessionInfo, SessionStatus, Timestamp,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::buffer::SessionBuffer;
use crate::catalog::FaultCatalog;
use crate::config::EngineConfig;
use crate::decode::Frame;
use crate::error::TrackerError;
use crate::tracker::{FaultTracker, ScanOutcome};

#[derive(Debug)]
struct SessionState {
    buffer: SessionBuffer,
    tracker: FaultTracker,
    status: SessionStatus,
    link_degraded: bool,
}

/// Point-in-time copy of a session's data
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub buffer: SessionBuffer,
    pub tracker: FaultTracker,
}

/// One continuous vehicle-interface connection's state
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    vehicle_id: String,
    vehicle_name: Option<String>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(
        id: SessionId,
        vehicle_id: impl Into<String>,
        vehicle_name: Option<String>,
        config: &EngineConfig,
        catalog: Arc<FaultCatalog>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let state = SessionState {
            buffer: SessionBuffer::new(config.buffer_capacity),
            tracker: FaultTracker::new(id.clone(), config.tracker.clone(), catalog),
            status: SessionStatus::Idle,
            link_degraded: false,
        };
        Self {
            id,
            vehicle_id: vehicle_id.into(),
            vehicle_name,
            state: Mutex::new(state),
            events,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    /// Apply one decoded frame
    pub fn apply(&self, frame: Frame) -> Result<ScanOutcome, TrackerError> {
        match frame {
            Frame::Reading(reading) => {
                self.push_reading(reading);
                Ok(ScanOutcome::default())
            }
            Frame::Dtc(report) => self.apply_scan(&report),
        }
    }

    pub fn push_reading(&self, reading: Reading) {
        self.state.lock().buffer.push(reading);
    }

    /// Apply a DTC scan and broadcast the resulting lifecycle events
    pub fn apply_scan(&self, report: &DtcReport) -> Result<ScanOutcome, TrackerError> {
        let outcome = self.state.lock().tracker.apply(report)?;
        for event in &outcome.events {
            self.emit(SessionEvent::Fault(event.clone()));
        }
        Ok(outcome)
    }

    /// Broadcast an event; having no subscribers is fine
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub fn set_status(&self, status: SessionStatus) {
        let mut state = self.state.lock();
        if state.status != status {
            debug!(session_id = %self.id, from = ?state.status, to = ?status, "Session status changed");
            state.status = status;
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    pub fn set_link_degraded(&self, degraded: bool) {
        self.state.lock().link_degraded = degraded;
    }

    pub fn close(&self) {
        self.set_status(SessionStatus::Closed);
        info!(session_id = %self.id, vehicle_id = %self.vehicle_id, "Session closed");
    }

    pub fn info(&self) -> SessionInfo {
        let state = self.state.lock();
        SessionInfo {
            id: self.id.clone(),
            vehicle_id: self.vehicle_id.clone(),
            vehicle_name: self.vehicle_name.clone(),
            status: state.status,
            last_data_at: latest_data_at(&state.buffer, &state.tracker),
            buffered_readings: state.buffer.len(),
            link_degraded: state.link_degraded,
        }
    }

    pub fn latest(&self) -> Vec<Reading> {
        self.state.lock().buffer.latest_all()
    }

    pub fn window(&self, pid: Pid, duration: Duration) -> Vec<Reading> {
        self.state.lock().buffer.window(pid, duration)
    }

    /// Readings within `duration` of the latest data plus the active faults,
    /// copied under one lock so both describe the same moment
    pub fn live_inputs(&self, duration: Duration) -> (Vec<Reading>, Vec<ActiveFault>) {
        let state = self.state.lock();
        (
            state.buffer.window_all(duration),
            state.tracker.active_faults(),
        )
    }

    pub fn active_faults(&self, filter: Option<&FaultFilter>) -> Vec<ActiveFault> {
        let faults = self.state.lock().tracker.active_faults();
        match filter {
            Some(filter) => faults.into_iter().filter(|f| filter.matches(f)).collect(),
            None => faults,
        }
    }

    pub fn fault_history(&self) -> Vec<ActiveFault> {
        self.state.lock().tracker.history().to_vec()
    }

    pub fn dtc_snapshot(&self, kind: DtcReportKind) -> Option<DtcReport> {
        self.state.lock().tracker.snapshot(kind).cloned()
    }

    /// Copy of the whole buffer and tracker
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            buffer: state.buffer.clone(),
            tracker: state.tracker.clone(),
        }
    }
}

fn latest_data_at(buffer: &SessionBuffer, tracker: &FaultTracker) -> Option<Timestamp> {
    [buffer.now(), tracker.last_scan_at()].into_iter().flatten().max()
}
