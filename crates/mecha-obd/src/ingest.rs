//! Ingestion loop: read -> decode -> apply, one task per vehicle connection
//!
//! A single bad frame never stops the loop. Transport conditions end it and
//! are reported to the caller, which owns any reconnect policy:
//!
//! - read timeout: [`IngestExit::NoData`]
//! - end of stream: [`IngestExit::EndOfStream`]
//! - transport error: [`IngestExit::TransportFailed`]
//!
//! Cancellation is observed only while waiting for the next frame, so an
//! in-flight decode/apply always completes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mecha_core::{SessionEvent, SessionStatus};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::config::EngineConfig;
use crate::decode::{DecodeError, FrameDecoder};
use crate::error::TrackerError;
use crate::session::Session;
use crate::source::{LineSource, RawLine, SourceError};

/// Why an ingestion run ended
#[derive(Debug, Clone, PartialEq)]
pub enum IngestExit {
    EndOfStream,
    Cancelled,
    /// No response within the read timeout
    NoData,
    TransportFailed(SourceError),
}

impl fmt::Display for IngestExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestExit::EndOfStream => f.write_str("end of stream"),
            IngestExit::Cancelled => f.write_str("cancelled"),
            IngestExit::NoData => f.write_str("no data within read timeout"),
            IngestExit::TransportFailed(e) => write!(f, "transport failed: {}", e),
        }
    }
}

/// Counters for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub frames: u64,
    pub readings: u64,
    pub scans: u64,
    pub malformed: u64,
    pub dropped: u64,
}

/// Drives one session from one line source
pub struct Ingestor {
    session: Arc<Session>,
    decoder: FrameDecoder,
    read_timeout: Duration,
    malformed_threshold: u32,
    consecutive_malformed: u32,
    stats: IngestStats,
}

impl Ingestor {
    pub fn new(session: Arc<Session>, config: &EngineConfig) -> Self {
        Self {
            session,
            decoder: FrameDecoder::new(config.framing),
            read_timeout: config.read_timeout(),
            malformed_threshold: config.malformed_threshold.max(1),
            consecutive_malformed: 0,
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Run until the source ends, fails, times out or `cancel` flips to true
    pub async fn run<S>(&mut self, source: &mut S, mut cancel: watch::Receiver<bool>) -> IngestExit
    where
        S: LineSource + ?Sized,
    {
        let session_id = self.session.id().clone();
        info!(session_id = %session_id, source = %source.describe(), "Ingestion started");
        self.session.set_status(SessionStatus::Ingesting);

        let exit = loop {
            if *cancel.borrow() {
                break IngestExit::Cancelled;
            }

            let read = tokio::select! {
                biased;
                changed = cancel.changed() => {
                    // A dropped sender means the owner is gone
                    if changed.is_err() || *cancel.borrow() {
                        break IngestExit::Cancelled;
                    }
                    continue;
                }
                read = tokio::time::timeout(self.read_timeout, source.read_line()) => read,
            };

            match read {
                Err(_) => {
                    warn!(session_id = %session_id, timeout_ms = self.read_timeout.as_millis() as u64, "No data from adapter");
                    self.session.emit(SessionEvent::NoData {
                        session_id: session_id.clone(),
                    });
                    break IngestExit::NoData;
                }
                Ok(Err(e)) => {
                    error!(session_id = %session_id, error = %e, "Transport failed");
                    break IngestExit::TransportFailed(e);
                }
                Ok(Ok(None)) => break IngestExit::EndOfStream,
                Ok(Ok(Some(line))) => self.handle_line(line),
            }
        };

        if self.session.status() == SessionStatus::Ingesting {
            self.session.set_status(SessionStatus::Idle);
        }
        self.session.emit(SessionEvent::IngestionStopped {
            session_id: session_id.clone(),
            reason: exit.to_string(),
        });
        info!(
            session_id = %session_id,
            reason = %exit,
            frames = self.stats.frames,
            readings = self.stats.readings,
            scans = self.stats.scans,
            malformed = self.stats.malformed,
            "Ingestion stopped"
        );
        exit
    }

    /// Decode and apply one response
    pub fn handle_line(&mut self, line: RawLine) {
        self.stats.frames += 1;
        let session = Arc::clone(&self.session);
        let session_id = session.id();

        match self.decoder.decode(session_id, &line.bytes, line.observed_at) {
            Ok(frame) => {
                self.reset_malformed();
                let is_scan = matches!(frame, crate::decode::Frame::Dtc(_));
                match session.apply(frame) {
                    Ok(_) if is_scan => self.stats.scans += 1,
                    Ok(_) => self.stats.readings += 1,
                    Err(e @ TrackerError::OutOfOrderScan { .. }) => {
                        self.stats.dropped += 1;
                        warn!(session_id = %session_id, error = %e, "Dropping DTC scan");
                    }
                    Err(e) => {
                        self.stats.dropped += 1;
                        warn!(session_id = %session_id, error = %e, "Scan rejected");
                    }
                }
            }
            Err(DecodeError::UnknownPid(reading)) => {
                self.reset_malformed();
                debug!(session_id = %session_id, pid = %reading.pid, "Recording unrecognized PID");
                session.push_reading(*reading);
                self.stats.readings += 1;
            }
            Err(DecodeError::MalformedFrame(reason)) => {
                self.stats.malformed += 1;
                self.stats.dropped += 1;
                self.consecutive_malformed += 1;
                warn!(
                    session_id = %session_id,
                    consecutive = self.consecutive_malformed,
                    reason = %reason,
                    "Dropping malformed frame"
                );
                if self.consecutive_malformed == self.malformed_threshold {
                    warn!(session_id = %session_id, consecutive = self.consecutive_malformed, "Link degraded");
                    session.set_link_degraded(true);
                    session.emit(SessionEvent::LinkDegraded {
                        session_id: session_id.clone(),
                        consecutive: self.consecutive_malformed,
                    });
                }
            }
            Err(DecodeError::NoData) => {
                self.reset_malformed();
                debug!(session_id = %session_id, "Vehicle answered NO DATA");
            }
            Err(DecodeError::AdapterMessage(msg)) => {
                self.reset_malformed();
                trace!(session_id = %session_id, message = %msg, "Adapter message");
            }
            Err(e @ DecodeError::NegativeResponse { .. }) => {
                self.reset_malformed();
                debug!(session_id = %session_id, error = %e, "Request rejected by vehicle");
            }
        }
    }

    fn reset_malformed(&mut self) {
        if self.consecutive_malformed >= self.malformed_threshold {
            info!(session_id = %self.session.id(), "Link recovered");
            self.session.set_link_degraded(false);
        }
        self.consecutive_malformed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use mecha_core::{FaultCode, FaultEventKind, Pid, SessionId, Severity, SubsystemTag, Timestamp};
    use tokio::sync::broadcast;

    use crate::catalog::FaultCatalog;
    use crate::source::ChannelSource;

    fn at(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    fn line(raw: &str, secs: i64) -> Result<RawLine, SourceError> {
        Ok(RawLine::new(raw.as_bytes().to_vec(), at(secs)))
    }

    fn setup(config: &EngineConfig) -> (Arc<Session>, broadcast::Receiver<SessionEvent>) {
        let (tx, rx) = broadcast::channel(64);
        let catalog = FaultCatalog::from_codes([FaultCode {
            code: "P0302".parse().unwrap(),
            system: SubsystemTag::Engine,
            severity: Severity::High,
            description: "Cylinder 2 misfire detected".into(),
            recommended_action: None,
        }])
        .unwrap();
        let session = Session::new(
            SessionId::from("s1"),
            "vehicle-1",
            None,
            config,
            Arc::new(catalog),
            tx,
        );
        (Arc::new(session), rx)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_bad_frames_do_not_stop_ingestion() {
        let config = EngineConfig::default();
        let (session, _rx) = setup(&config);
        let (tx, mut source) = ChannelSource::channel(16);
        for item in [
            line("41 05 7B", 0),
            line("41 05", 1),
            line("SEARCHING...", 2),
            line("NO DATA", 3),
            line("41 A6 01", 4),
            line("41 0C 1A F8", 5),
        ] {
            tx.send(item).await.unwrap();
        }
        drop(tx);

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let mut ingestor = Ingestor::new(session.clone(), &config);
        let exit = ingestor.run(&mut source, cancel_rx).await;

        assert_eq!(exit, IngestExit::EndOfStream);
        assert_eq!(ingestor.stats().frames, 6);
        assert_eq!(ingestor.stats().malformed, 1);
        assert_eq!(ingestor.stats().readings, 3);
        let pids: Vec<Pid> = session.latest().iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![Pid::COOLANT_TEMP, Pid::ENGINE_RPM, Pid(0xA6)]);
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_link_degraded_after_threshold() {
        let config = EngineConfig::default();
        let (session, mut rx) = setup(&config);
        let (tx, mut source) = ChannelSource::channel(16);
        for i in 0..6 {
            tx.send(line("41 0C", i)).await.unwrap();
        }
        tx.send(line("41 0C 1A F8", 6)).await.unwrap();
        drop(tx);

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        Ingestor::new(session.clone(), &config)
            .run(&mut source, cancel_rx)
            .await;

        let degraded: Vec<u32> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::LinkDegraded { consecutive, .. } => Some(consecutive),
                _ => None,
            })
            .collect();
        assert_eq!(degraded, vec![5]);
        // The good frame at the end recovered the link
        assert!(!session.info().link_degraded);
    }

    #[tokio::test]
    async fn test_fault_events_and_out_of_order_scan() {
        let config = EngineConfig::default();
        let (session, mut rx) = setup(&config);
        let (tx, mut source) = ChannelSource::channel(16);
        tx.send(line("43 01 03 02", 10)).await.unwrap();
        tx.send(line("43 01 03 02", 5)).await.unwrap();
        tx.send(line("43 01 03 02", 20)).await.unwrap();
        drop(tx);

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let mut ingestor = Ingestor::new(session.clone(), &config);
        ingestor.run(&mut source, cancel_rx).await;

        assert_eq!(ingestor.stats().dropped, 1);
        let raised = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Fault(f) if f.kind == FaultEventKind::Raised))
            .count();
        assert_eq!(raised, 1);
        assert_eq!(session.active_faults(None).len(), 1);
    }

    #[tokio::test]
    async fn test_read_timeout_reports_no_data() {
        let config = EngineConfig {
            read_timeout_ms: 50,
            ..EngineConfig::default()
        };
        let (session, mut rx) = setup(&config);
        let (_tx, mut source) = ChannelSource::channel(1);

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let exit = Ingestor::new(session, &config).run(&mut source, cancel_rx).await;

        assert_eq!(exit, IngestExit::NoData);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SessionEvent::NoData { .. })));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let config = EngineConfig {
            read_timeout_ms: 60_000,
            ..EngineConfig::default()
        };
        let (session, _rx) = setup(&config);
        let (_tx, mut source) = ChannelSource::channel(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            Ingestor::new(session, &config).run(&mut source, cancel_rx).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), IngestExit::Cancelled);
    }

    #[tokio::test]
    async fn test_transport_failure_ends_run() {
        let config = EngineConfig::default();
        let (session, _rx) = setup(&config);
        let (tx, mut source) = ChannelSource::channel(4);
        tx.send(Err(SourceError::ConnectionClosed)).await.unwrap();

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let exit = Ingestor::new(session, &config).run(&mut source, cancel_rx).await;
        assert_eq!(exit, IngestExit::TransportFailed(SourceError::ConnectionClosed));
    }
}
