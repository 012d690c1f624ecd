//! DiagnosticsEngine - session registry and query API implementation

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use mecha_core::{
    ActiveFault, DiagnosticsError, DiagnosticsQuery, DiagnosticsResult, DtcReport, DtcReportKind,
    FaultFilter, Pid, Reading, Report, SessionEvent, SessionId, SessionInfo, SubsystemHealth,
    Timestamp, VehicleHealth,
};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::info;

use crate::catalog::FaultCatalog;
use crate::config::{EngineConfig, ScoringConfig};
use crate::error::ConfigError;
use crate::ingest::Ingestor;
use crate::report::ReportAssembler;
use crate::scoring::HealthScorer;
use crate::session::Session;

const EVENT_CAPACITY: usize = 1024;

/// Owns every live session; no state is shared between sessions
pub struct DiagnosticsEngine {
    config: EngineConfig,
    catalog: Arc<FaultCatalog>,
    scorer: HealthScorer,
    assembler: ReportAssembler,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl DiagnosticsEngine {
    pub fn new(
        config: EngineConfig,
        scoring: ScoringConfig,
        catalog: Arc<FaultCatalog>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        scoring.validate()?;

        let scorer = HealthScorer::new(scoring);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            config,
            catalog,
            assembler: ReportAssembler::new(scorer.clone()),
            scorer,
            sessions: RwLock::new(HashMap::new()),
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<FaultCatalog> {
        &self.catalog
    }

    /// Open a session for one vehicle connection
    pub fn open_session(&self, vehicle_id: &str, vehicle_name: Option<String>) -> Arc<Session> {
        let id = SessionId::generate();
        let session = Arc::new(Session::new(
            id.clone(),
            vehicle_id,
            vehicle_name,
            &self.config,
            self.catalog.clone(),
            self.events.clone(),
        ));
        self.sessions.write().insert(id.clone(), session.clone());
        info!(session_id = %id, vehicle_id = %vehicle_id, "Session opened");
        session
    }

    /// Mark a session closed; its state stays queryable
    pub fn close_session(&self, session_id: &SessionId) -> DiagnosticsResult<()> {
        self.session(session_id)?.close();
        Ok(())
    }

    /// Drop a session and all of its state
    pub fn remove_session(&self, session_id: &SessionId) -> DiagnosticsResult<Arc<Session>> {
        let removed = self
            .sessions
            .write()
            .remove(session_id)
            .ok_or_else(|| DiagnosticsError::SessionNotFound(session_id.clone()))?;
        removed.close();
        Ok(removed)
    }

    pub fn session(&self, session_id: &SessionId) -> DiagnosticsResult<Arc<Session>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| DiagnosticsError::SessionNotFound(session_id.clone()))
    }

    /// Ingestion loop bound to a session
    pub fn ingestor(&self, session: Arc<Session>) -> Ingestor {
        Ingestor::new(session, &self.config)
    }
}

#[async_trait]
impl DiagnosticsQuery for DiagnosticsEngine {
    async fn sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        let mut infos: Vec<SessionInfo> = sessions.iter().map(|s| s.info()).collect();
        infos.sort_by(|a, b| {
            a.vehicle_id
                .cmp(&b.vehicle_id)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        infos
    }

    async fn session_info(&self, session_id: &SessionId) -> DiagnosticsResult<SessionInfo> {
        Ok(self.session(session_id)?.info())
    }

    async fn get_latest(&self, session_id: &SessionId) -> DiagnosticsResult<Vec<Reading>> {
        Ok(self.session(session_id)?.latest())
    }

    async fn get_window(
        &self,
        session_id: &SessionId,
        pid: Pid,
        duration: Duration,
    ) -> DiagnosticsResult<Vec<Reading>> {
        if duration < Duration::zero() {
            return Err(DiagnosticsError::InvalidRequest(
                "window duration must not be negative".to_string(),
            ));
        }
        Ok(self.session(session_id)?.window(pid, duration))
    }

    async fn get_active_faults(
        &self,
        session_id: &SessionId,
        filter: Option<&FaultFilter>,
    ) -> DiagnosticsResult<Vec<ActiveFault>> {
        Ok(self.session(session_id)?.active_faults(filter))
    }

    async fn get_fault_history(
        &self,
        session_id: &SessionId,
    ) -> DiagnosticsResult<Vec<ActiveFault>> {
        Ok(self.session(session_id)?.fault_history())
    }

    async fn get_dtc_snapshot(
        &self,
        session_id: &SessionId,
        kind: DtcReportKind,
    ) -> DiagnosticsResult<Option<DtcReport>> {
        Ok(self.session(session_id)?.dtc_snapshot(kind))
    }

    async fn get_health(&self, session_id: &SessionId) -> DiagnosticsResult<Vec<SubsystemHealth>> {
        let session = self.session(session_id)?;
        let (readings, faults) = session.live_inputs(self.config.scoring_window());
        Ok(self.scorer.score(&readings, &faults))
    }

    async fn get_vehicle_health(&self, session_id: &SessionId) -> DiagnosticsResult<VehicleHealth> {
        let session = self.session(session_id)?;
        let (readings, faults) = session.live_inputs(self.config.scoring_window());
        Ok(self.scorer.vehicle_health(&readings, &faults))
    }

    async fn get_report(
        &self,
        session_id: &SessionId,
        start: Timestamp,
        end: Timestamp,
    ) -> DiagnosticsResult<Report> {
        let snapshot = self.session(session_id)?.snapshot();
        self.assembler
            .assemble(session_id, &snapshot.buffer, &snapshot.tracker, start, end)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mecha_core::{FaultCode, HealthStatus, Severity, SubsystemTag};
    use pretty_assertions::assert_eq;
    use tokio::sync::watch;

    use crate::source::{ChannelSource, RawLine};

    fn at(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn engine() -> DiagnosticsEngine {
        let catalog = FaultCatalog::from_codes([
            FaultCode {
                code: "P0302".parse().unwrap(),
                system: SubsystemTag::Engine,
                severity: Severity::High,
                description: "Cylinder 2 misfire detected".into(),
                recommended_action: None,
            },
            FaultCode {
                code: "P0171".parse().unwrap(),
                system: SubsystemTag::Fuel,
                severity: Severity::Medium,
                description: "System too lean (bank 1)".into(),
                recommended_action: None,
            },
        ])
        .unwrap();
        DiagnosticsEngine::new(
            EngineConfig::default(),
            ScoringConfig::default(),
            Arc::new(catalog),
        )
        .unwrap()
    }

    async fn ingest(engine: &DiagnosticsEngine, session: Arc<Session>, lines: &[(&str, i64)]) {
        let (tx, mut source) = ChannelSource::channel(lines.len().max(1));
        for (raw, secs) in lines {
            tx.send(Ok(RawLine::new(raw.as_bytes().to_vec(), at(*secs))))
                .await
                .unwrap();
        }
        drop(tx);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        engine.ingestor(session).run(&mut source, cancel_rx).await;
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let engine = engine();
        let missing = SessionId::from("missing");
        assert_eq!(
            engine.get_latest(&missing).await.unwrap_err(),
            DiagnosticsError::SessionNotFound(missing.clone())
        );
        assert!(engine.close_session(&missing).is_err());
    }

    #[tokio::test]
    async fn test_query_api_over_ingested_session() {
        let engine = engine();
        let session = engine.open_session("vehicle-1", Some("Test car".into()));
        let id = session.id().clone();

        ingest(
            &engine,
            session,
            &[
                ("41 05 7B", 0),
                ("41 0C 1A F8", 1),
                ("43 02 03 02 01 71", 2),
                ("41 05 7C", 3),
                ("43 02 03 02 01 71", 4),
                ("47 01 04 20", 5),
            ],
        )
        .await;

        let latest = engine.get_latest(&id).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].value, 84.0);

        let window = engine
            .get_window(&id, Pid::COOLANT_TEMP, Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(window.len(), 2);
        let everything = engine
            .get_window(&id, Pid::COOLANT_TEMP, Duration::seconds(10_000_000_000_000))
            .await
            .unwrap();
        assert_eq!(everything.len(), 2);

        let faults = engine.get_active_faults(&id, None).await.unwrap();
        assert_eq!(faults.len(), 2);
        let engine_only = FaultFilter {
            system: Some(SubsystemTag::Engine),
            ..FaultFilter::default()
        };
        let filtered = engine.get_active_faults(&id, Some(&engine_only)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].code.as_str(), "P0302");

        let health = engine.get_health(&id).await.unwrap();
        let engine_health = health.iter().find(|h| h.system == SubsystemTag::Engine).unwrap();
        assert_eq!(engine_health.score, 75);
        assert_eq!(engine_health.status, HealthStatus::Fair);

        let vehicle = engine.get_vehicle_health(&id).await.unwrap();
        assert_eq!(vehicle.subsystems.len(), SubsystemTag::ALL.len());

        // P0420 is not in the test catalog, so the snapshot is empty
        let pending = engine
            .get_dtc_snapshot(&id, DtcReportKind::Pending)
            .await
            .unwrap()
            .unwrap();
        assert!(pending.codes.is_empty());

        let first = engine.get_report(&id, at(0), at(10)).await.unwrap();
        let second = engine.get_report(&id, at(0), at(10)).await.unwrap();
        assert_eq!(first.content_hash(), second.content_hash());

        let infos = engine.sessions().await;
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].vehicle_name.as_deref(), Some("Test car"));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let engine = engine();
        let a = engine.open_session("vehicle-a", None);
        let b = engine.open_session("vehicle-b", None);
        let a_id = a.id().clone();
        let b_id = b.id().clone();

        ingest(&engine, a, &[("41 05 7B", 0)]).await;

        assert_eq!(engine.get_latest(&a_id).await.unwrap().len(), 1);
        assert!(engine.get_latest(&b_id).await.unwrap().is_empty());

        engine.close_session(&a_id).unwrap();
        assert_eq!(
            engine.session_info(&a_id).await.unwrap().status,
            mecha_core::SessionStatus::Closed
        );
        engine.remove_session(&a_id).unwrap();
        assert!(engine.session(&a_id).is_err());
    }

    #[tokio::test]
    async fn test_subscribe_receives_fault_events() {
        let engine = engine();
        let mut events = engine.subscribe();
        let session = engine.open_session("vehicle-1", None);
        ingest(&engine, session, &[("43 01 03 02", 0), ("43 01 03 02", 1)]).await;

        let mut saw_raise = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Fault(f) = event {
                saw_raise |= f.code.as_str() == "P0302";
            }
        }
        assert!(saw_raise);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            buffer_capacity: 0,
            ..EngineConfig::default()
        };
        let result = DiagnosticsEngine::new(
            config,
            ScoringConfig::default(),
            Arc::new(FaultCatalog::default()),
        );
        assert!(result.is_err());
    }
}
