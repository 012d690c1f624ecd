//! Report Assembler - immutable, content-addressable window reports

use mecha_core::{DiagnosticsError, DiagnosticsResult, Report, SessionId, Timestamp};
use tracing::debug;

use crate::buffer::SessionBuffer;
use crate::scoring::HealthScorer;
use crate::tracker::FaultTracker;

/// Builds [`Report`]s from a point-in-time session snapshot
///
/// The report is stamped with the session's latest data timestamp rather than
/// the wall clock, so assembling the same window twice without new data yields
/// byte-identical output (and the same [`Report::content_hash`]).
#[derive(Debug, Clone, Default)]
pub struct ReportAssembler {
    scorer: HealthScorer,
}

impl ReportAssembler {
    pub fn new(scorer: HealthScorer) -> Self {
        Self { scorer }
    }

    pub fn assemble(
        &self,
        session_id: &SessionId,
        buffer: &SessionBuffer,
        tracker: &FaultTracker,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> DiagnosticsResult<Report> {
        if window_start > window_end {
            return Err(DiagnosticsError::InvalidWindow(format!(
                "start {} is after end {}",
                window_start.to_rfc3339(),
                window_end.to_rfc3339()
            )));
        }

        let readings = buffer.range_all(window_start, window_end);
        let faults = tracker.faults_between(window_start, window_end);
        if readings.is_empty() && faults.is_empty() {
            return Err(DiagnosticsError::EmptyWindow {
                start: window_start.to_rfc3339(),
                end: window_end.to_rfc3339(),
            });
        }

        // Health reflects faults still present at the end of the window
        let scored: Vec<_> = faults
            .iter()
            .filter(|f| f.cleared_at.map_or(true, |cleared| cleared > window_end))
            .cloned()
            .collect();
        let subsystem_health = self.scorer.score(&readings, &scored);

        let generated_at = [buffer.now(), tracker.last_scan_at()]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(window_end);

        debug!(
            session_id = %session_id,
            readings = readings.len(),
            faults = faults.len(),
            "Assembled report"
        );

        Ok(Report {
            session_id: session_id.clone(),
            window_start,
            window_end,
            subsystem_health,
            faults,
            generated_at,
        })
    }
}
