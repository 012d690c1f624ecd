//! Fault Tracker - debounced DTC lifecycle per session
//!
//! Each code moves through `Candidate -> Active -> Clearing -> Cleared`:
//!
//! - A code seen in `debounce_count` consecutive stored-DTC scans becomes
//!   Active. A Candidate missing from a scan is purged.
//! - An Active code missing from a scan starts Clearing; `clear_count`
//!   consecutive clean scans clear it. Reported again while Clearing, it
//!   returns to Active.
//! - Cleared faults move to history and are garbage-collected once older
//!   than the retention period. A later detection starts a fresh Candidate.
//!
//! Scans must arrive with strictly increasing `observed_at` per report kind.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use mecha_core::{
    ActiveFault, DtcCode, DtcReport, DtcReportKind, FaultCode, FaultEvent, FaultEventKind,
    FaultState, SessionId, Timestamp,
};
use tracing::{debug, info, warn};

use crate::catalog::FaultCatalog;
use crate::config::TrackerConfig;
use crate::error::TrackerError;

/// Result of applying one DTC scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutcome {
    /// Lifecycle transitions caused by the scan
    pub events: Vec<FaultEvent>,
    /// Codes skipped because they are not in the catalog
    pub rejected: Vec<TrackerError>,
}

#[derive(Debug, Clone)]
struct Tracked {
    fault: ActiveFault,
    /// Consecutive reports while Candidate, consecutive clean scans while Clearing
    streak: u32,
}

/// Fault lifecycle state for one session
#[derive(Debug, Clone)]
pub struct FaultTracker {
    session_id: SessionId,
    config: TrackerConfig,
    catalog: Arc<FaultCatalog>,
    /// Candidate, Active and Clearing faults
    tracked: BTreeMap<DtcCode, Tracked>,
    /// Cleared faults inside the retention period, in clear order
    history: Vec<ActiveFault>,
    last_scan: HashMap<DtcReportKind, Timestamp>,
    /// Latest pending/permanent reports
    snapshots: HashMap<DtcReportKind, DtcReport>,
}

impl FaultTracker {
    pub fn new(session_id: SessionId, config: TrackerConfig, catalog: Arc<FaultCatalog>) -> Self {
        Self {
            session_id,
            config,
            catalog,
            tracked: BTreeMap::new(),
            history: Vec::new(),
            last_scan: HashMap::new(),
            snapshots: HashMap::new(),
        }
    }

    /// Look up static reference data, rejecting codes outside the catalog
    pub fn reference(&self, code: &DtcCode) -> Result<&FaultCode, TrackerError> {
        self.catalog
            .get(code)
            .ok_or_else(|| TrackerError::UnknownDtcCode(code.clone()))
    }

    /// Apply one DTC report
    ///
    /// Out-of-order reports are rejected without touching any state.
    pub fn apply(&mut self, report: &DtcReport) -> Result<ScanOutcome, TrackerError> {
        let at = report.observed_at;
        if let Some(&last_applied) = self.last_scan.get(&report.kind) {
            if at <= last_applied {
                return Err(TrackerError::OutOfOrderScan {
                    observed_at: at,
                    last_applied,
                });
            }
        }

        let mut outcome = ScanOutcome::default();
        let mut seen = BTreeSet::new();
        for code in &report.codes {
            match self.reference(code) {
                Ok(_) => {
                    seen.insert(code.clone());
                }
                Err(e) => {
                    warn!(session_id = %self.session_id, code = %code, "Skipping unknown DTC");
                    if !outcome.rejected.contains(&e) {
                        outcome.rejected.push(e);
                    }
                }
            }
        }

        self.last_scan.insert(report.kind, at);

        if report.kind != DtcReportKind::Stored {
            debug!(
                session_id = %self.session_id,
                kind = ?report.kind,
                count = seen.len(),
                "Updated DTC snapshot"
            );
            self.snapshots.insert(
                report.kind,
                DtcReport {
                    codes: seen.into_iter().collect(),
                    ..report.clone()
                },
            );
            return Ok(outcome);
        }

        for code in &seen {
            self.on_reported(code, at, &mut outcome.events);
        }

        let missing: Vec<DtcCode> = self
            .tracked
            .keys()
            .filter(|code| !seen.contains(*code))
            .cloned()
            .collect();
        for code in missing {
            self.on_missing(&code, at, &mut outcome.events);
        }

        self.collect_garbage(at);
        Ok(outcome)
    }

    fn on_reported(&mut self, code: &DtcCode, at: Timestamp, events: &mut Vec<FaultEvent>) {
        let debounce = self.config.debounce_count;
        let escalate_after = self.config.escalate_after;

        let Some(tracked) = self.tracked.get_mut(code) else {
            let Some(reference) = self.catalog.get(code) else {
                return;
            };
            let tracked = Tracked {
                fault: ActiveFault {
                    code: code.clone(),
                    system: reference.system,
                    severity: reference.severity,
                    first_seen: at,
                    last_seen: at,
                    occurrences: 0,
                    state: FaultState::Candidate,
                    escalated: false,
                    cleared_at: None,
                },
                streak: 1,
            };
            debug!(session_id = %self.session_id, code = %code, "New fault candidate");
            self.tracked.insert(code.clone(), tracked);
            if debounce <= 1 {
                self.activate(code, at, events);
            }
            return;
        };

        tracked.fault.last_seen = at;
        match tracked.fault.state {
            FaultState::Candidate => {
                tracked.streak += 1;
                if tracked.streak >= debounce {
                    self.activate(code, at, events);
                }
            }
            FaultState::Active | FaultState::Clearing => {
                if tracked.fault.state == FaultState::Clearing {
                    debug!(session_id = %self.session_id, code = %code, "Fault reported again while clearing");
                }
                tracked.fault.state = FaultState::Active;
                tracked.streak = 0;
                tracked.fault.occurrences += 1;

                if escalate_after > 0
                    && !tracked.fault.escalated
                    && tracked.fault.occurrences >= escalate_after
                {
                    tracked.fault.escalated = true;
                    warn!(
                        session_id = %self.session_id,
                        code = %code,
                        occurrences = tracked.fault.occurrences,
                        "Fault escalated"
                    );
                    events.push(event(&self.session_id, &tracked.fault, FaultEventKind::Escalated, at));
                }
            }
            FaultState::Cleared => {}
        }
    }

    fn on_missing(&mut self, code: &DtcCode, at: Timestamp, events: &mut Vec<FaultEvent>) {
        let clear_count = self.config.clear_count;
        let Some(tracked) = self.tracked.get_mut(code) else {
            return;
        };

        match tracked.fault.state {
            FaultState::Candidate => {
                debug!(session_id = %self.session_id, code = %code, "Purging unconfirmed candidate");
                self.tracked.remove(code);
            }
            FaultState::Active => {
                tracked.fault.state = FaultState::Clearing;
                tracked.streak = 1;
                if clear_count <= 1 {
                    self.clear(code, at, events);
                }
            }
            FaultState::Clearing => {
                tracked.streak += 1;
                if tracked.streak >= clear_count {
                    self.clear(code, at, events);
                }
            }
            FaultState::Cleared => {}
        }
    }

    fn activate(&mut self, code: &DtcCode, at: Timestamp, events: &mut Vec<FaultEvent>) {
        if let Some(tracked) = self.tracked.get_mut(code) {
            tracked.fault.state = FaultState::Active;
            tracked.streak = 0;
            info!(
                session_id = %self.session_id,
                code = %code,
                severity = %tracked.fault.severity,
                system = %tracked.fault.system,
                "Fault raised"
            );
            events.push(event(&self.session_id, &tracked.fault, FaultEventKind::Raised, at));
        }
    }

    fn clear(&mut self, code: &DtcCode, at: Timestamp, events: &mut Vec<FaultEvent>) {
        if let Some(mut tracked) = self.tracked.remove(code) {
            tracked.fault.state = FaultState::Cleared;
            tracked.fault.cleared_at = Some(at);
            info!(
                session_id = %self.session_id,
                code = %code,
                occurrences = tracked.fault.occurrences,
                "Fault cleared"
            );
            events.push(event(&self.session_id, &tracked.fault, FaultEventKind::Cleared, at));
            self.history.push(tracked.fault);
        }
    }

    fn collect_garbage(&mut self, now: Timestamp) {
        let retention = self.config.retention();
        let before = self.history.len();
        // A cleared_at + retention past the calendar range never expires
        self.history.retain(|f| {
            f.cleared_at
                .and_then(|cleared| cleared.checked_add_signed(retention))
                .map_or(true, |expires| expires >= now)
        });
        let dropped = before - self.history.len();
        if dropped > 0 {
            debug!(session_id = %self.session_id, dropped, "Expired cleared faults");
        }
    }

    /// Faults currently surfaced (Active or Clearing), ordered by code
    pub fn active_faults(&self) -> Vec<ActiveFault> {
        self.tracked
            .values()
            .filter(|t| t.fault.is_present())
            .map(|t| t.fault.clone())
            .collect()
    }

    /// Unconfirmed candidates, ordered by code
    pub fn candidates(&self) -> Vec<ActiveFault> {
        self.tracked
            .values()
            .filter(|t| t.fault.state == FaultState::Candidate)
            .map(|t| t.fault.clone())
            .collect()
    }

    /// Cleared faults still inside the retention period
    pub fn history(&self) -> &[ActiveFault] {
        &self.history
    }

    /// State of one tracked code, if it is Candidate, Active or Clearing
    pub fn get(&self, code: &DtcCode) -> Option<&ActiveFault> {
        self.tracked.get(code).map(|t| &t.fault)
    }

    /// Surfaced or cleared faults whose lifetime overlaps `[start, end]`
    pub fn faults_between(&self, start: Timestamp, end: Timestamp) -> Vec<ActiveFault> {
        let mut faults: Vec<ActiveFault> = self
            .history
            .iter()
            .filter(|f| f.first_seen <= end && f.cleared_at.map_or(true, |c| c >= start))
            .chain(
                self.tracked
                    .values()
                    .map(|t| &t.fault)
                    .filter(|f| f.is_present() && f.first_seen <= end),
            )
            .cloned()
            .collect();
        faults.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.code.cmp(&b.code)));
        faults
    }

    /// Latest pending or permanent report
    pub fn snapshot(&self, kind: DtcReportKind) -> Option<&DtcReport> {
        self.snapshots.get(&kind)
    }

    /// `observed_at` of the latest applied scan of any kind
    pub fn last_scan_at(&self) -> Option<Timestamp> {
        self.last_scan.values().copied().max()
    }
}

fn event(session_id: &SessionId, fault: &ActiveFault, kind: FaultEventKind, at: Timestamp) -> FaultEvent {
    FaultEvent {
        session_id: session_id.clone(),
        code: fault.code.clone(),
        kind,
        system: fault.system,
        severity: fault.severity,
        at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use mecha_core::{Severity, SubsystemTag};
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn catalog() -> Arc<FaultCatalog> {
        Arc::new(
            FaultCatalog::from_codes([
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
            .unwrap(),
        )
    }

    fn tracker(config: TrackerConfig) -> FaultTracker {
        FaultTracker::new(SessionId::from("s1"), config, catalog())
    }

    fn scan(kind: DtcReportKind, codes: &[&str], secs: i64) -> DtcReport {
        DtcReport {
            kind,
            codes: codes.iter().map(|c| c.parse().unwrap()).collect(),
            observed_at: at(secs),
            session_id: SessionId::from("s1"),
        }
    }

    fn stored(codes: &[&str], secs: i64) -> DtcReport {
        scan(DtcReportKind::Stored, codes, secs)
    }

    fn kinds(outcome: &ScanOutcome) -> Vec<FaultEventKind> {
        outcome.events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_single_report_never_activates() {
        let mut t = tracker(TrackerConfig::default());
        t.apply(&stored(&["P0302"], 0)).unwrap();
        assert_eq!(t.candidates().len(), 1);
        assert!(t.active_faults().is_empty());

        let outcome = t.apply(&stored(&[], 10)).unwrap();
        assert!(outcome.events.is_empty());
        assert!(t.candidates().is_empty());
        assert!(t.active_faults().is_empty());
        assert!(t.history().is_empty());
    }

    #[test]
    fn test_raise_clear_round_trip() {
        let mut t = tracker(TrackerConfig::default());
        let code: DtcCode = "P0302".parse().unwrap();

        assert!(t.apply(&stored(&["P0302"], 0)).unwrap().events.is_empty());
        let raised = t.apply(&stored(&["P0302"], 10)).unwrap();
        assert_eq!(kinds(&raised), vec![FaultEventKind::Raised]);
        assert_eq!(t.get(&code).unwrap().state, FaultState::Active);

        // Three re-reports while Active
        for i in 2..5 {
            t.apply(&stored(&["P0302"], i * 10)).unwrap();
        }
        assert_eq!(t.get(&code).unwrap().occurrences, 3);

        assert!(t.apply(&stored(&[], 50)).unwrap().events.is_empty());
        assert_eq!(t.get(&code).unwrap().state, FaultState::Clearing);
        assert_eq!(t.active_faults().len(), 1);

        let cleared = t.apply(&stored(&[], 60)).unwrap();
        assert_eq!(kinds(&cleared), vec![FaultEventKind::Cleared]);
        assert!(t.active_faults().is_empty());

        let history = t.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, FaultState::Cleared);
        assert_eq!(history[0].occurrences, 3);
        assert_eq!(history[0].first_seen, at(0));
        assert_eq!(history[0].last_seen, at(40));
        assert_eq!(history[0].cleared_at, Some(at(60)));
        assert!(history[0].last_seen >= history[0].first_seen);
    }

    #[test]
    fn test_clearing_relapse_returns_to_active() {
        let mut t = tracker(TrackerConfig::default());
        let code: DtcCode = "P0302".parse().unwrap();
        t.apply(&stored(&["P0302"], 0)).unwrap();
        t.apply(&stored(&["P0302"], 1)).unwrap();
        t.apply(&stored(&[], 2)).unwrap();

        let outcome = t.apply(&stored(&["P0302"], 3)).unwrap();
        assert!(outcome.events.is_empty());
        assert_eq!(t.get(&code).unwrap().state, FaultState::Active);

        // Clean-scan streak restarts after the relapse
        t.apply(&stored(&[], 4)).unwrap();
        assert_eq!(t.get(&code).unwrap().state, FaultState::Clearing);
    }

    #[test]
    fn test_out_of_order_scan_does_not_mutate() {
        let mut t = tracker(TrackerConfig::default());
        t.apply(&stored(&["P0302"], 10)).unwrap();
        let before = t.candidates();

        let err = t.apply(&stored(&["P0302"], 5)).unwrap_err();
        assert!(matches!(err, TrackerError::OutOfOrderScan { .. }));
        let err = t.apply(&stored(&["P0302"], 10)).unwrap_err();
        assert!(matches!(err, TrackerError::OutOfOrderScan { .. }));

        assert_eq!(t.candidates(), before);
        assert!(t.active_faults().is_empty());
        assert_eq!(t.last_scan_at(), Some(at(10)));
    }

    #[test]
    fn test_unknown_codes_skipped_individually() {
        let mut t = tracker(TrackerConfig {
            debounce_count: 1,
            ..TrackerConfig::default()
        });
        let outcome = t.apply(&stored(&["P0302", "P1ABC"], 0)).unwrap();
        assert_eq!(kinds(&outcome), vec![FaultEventKind::Raised]);
        assert_eq!(
            outcome.rejected,
            vec![TrackerError::UnknownDtcCode("P1ABC".parse().unwrap())]
        );
        assert_eq!(t.active_faults().len(), 1);
    }

    #[test]
    fn test_escalation_once_per_activation() {
        let mut t = tracker(TrackerConfig {
            escalate_after: 3,
            ..TrackerConfig::default()
        });
        let mut escalations = 0;
        for i in 0..10 {
            let outcome = t.apply(&stored(&["P0171"], i)).unwrap();
            escalations += outcome
                .events
                .iter()
                .filter(|e| e.kind == FaultEventKind::Escalated)
                .count();
        }
        assert_eq!(escalations, 1);
        assert!(t.active_faults()[0].escalated);
    }

    #[test]
    fn test_pending_reports_are_snapshots_only() {
        let mut t = tracker(TrackerConfig::default());
        for i in 0..3 {
            t.apply(&scan(DtcReportKind::Pending, &["P0171"], i)).unwrap();
        }
        assert!(t.active_faults().is_empty());
        assert!(t.candidates().is_empty());

        let pending = t.snapshot(DtcReportKind::Pending).unwrap();
        assert_eq!(pending.codes, vec!["P0171".parse::<DtcCode>().unwrap()]);
        assert!(t.snapshot(DtcReportKind::Permanent).is_none());

        // Ordering is tracked per kind
        t.apply(&stored(&["P0302"], 1)).unwrap();
    }

    #[test]
    fn test_history_garbage_collected_after_retention() {
        let mut t = tracker(TrackerConfig {
            debounce_count: 1,
            clear_count: 1,
            retention_secs: 60,
            ..TrackerConfig::default()
        });
        t.apply(&stored(&["P0302"], 0)).unwrap();
        t.apply(&stored(&[], 10)).unwrap();
        assert_eq!(t.history().len(), 1);

        t.apply(&stored(&[], 70)).unwrap();
        assert_eq!(t.history().len(), 1);
        t.apply(&stored(&[], 71)).unwrap();
        assert!(t.history().is_empty());
    }

    #[test]
    fn test_retention_beyond_calendar_keeps_history() {
        let mut t = tracker(TrackerConfig {
            debounce_count: 1,
            clear_count: 1,
            retention_secs: 10_000_000_000_000,
            ..TrackerConfig::default()
        });
        t.apply(&stored(&["P0302"], 0)).unwrap();
        t.apply(&stored(&[], 10)).unwrap();
        t.apply(&stored(&[], 20)).unwrap();
        assert_eq!(t.history().len(), 1);
    }

    #[test]
    fn test_redetection_after_clear_starts_fresh_candidate() {
        let mut t = tracker(TrackerConfig {
            clear_count: 1,
            ..TrackerConfig::default()
        });
        let code: DtcCode = "P0302".parse().unwrap();
        t.apply(&stored(&["P0302"], 0)).unwrap();
        t.apply(&stored(&["P0302"], 1)).unwrap();
        t.apply(&stored(&[], 2)).unwrap();
        assert_eq!(t.history().len(), 1);

        t.apply(&stored(&["P0302"], 3)).unwrap();
        let fresh = t.get(&code).unwrap();
        assert_eq!(fresh.state, FaultState::Candidate);
        assert_eq!(fresh.first_seen, at(3));
        assert_eq!(fresh.occurrences, 0);
    }

    #[test]
    fn test_faults_between_includes_cleared_history() {
        let mut t = tracker(TrackerConfig {
            debounce_count: 1,
            clear_count: 1,
            ..TrackerConfig::default()
        });
        t.apply(&stored(&["P0302"], 0)).unwrap();
        t.apply(&stored(&["P0171"], 10)).unwrap();

        let all = t.faults_between(at(0), at(20));
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].code.as_str(), "P0302");
        assert_eq!(all[0].state, FaultState::Cleared);

        let late = t.faults_between(at(11), at(20));
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].code.as_str(), "P0171");
    }
}
