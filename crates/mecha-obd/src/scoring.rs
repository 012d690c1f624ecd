//! Health Scorer - deterministic subsystem scores
//!
//! Each subsystem starts at 100 and loses:
//!
//! - one penalty per fault mapped to it, by severity. The k-th fault of the
//!   same severity counts at `diminishing_factor^k` of the base weight, so the
//!   total fault penalty per severity is bounded.
//! - a continuous penalty per reading rule: `penalty_per_unit` times the mean
//!   excess over the alert threshold, capped at `max_penalty`, plus an optional
//!   rate-of-rise penalty.
//!
//! The score is a pure function of the readings and faults passed in.

use std::collections::{BTreeMap, BTreeSet};

use mecha_core::{
    ActiveFault, FaultState, Reading, Severity, SubsystemHealth, SubsystemTag, VehicleHealth,
};

use crate::config::{ReadingRule, ScoringConfig};

#[derive(Debug, Clone, Default)]
pub struct HealthScorer {
    config: ScoringConfig,
}

impl HealthScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score every subsystem, in [`SubsystemTag::ALL`] order
    ///
    /// Candidate faults are ignored; every other fault passed in counts.
    pub fn score(&self, readings: &[Reading], faults: &[ActiveFault]) -> Vec<SubsystemHealth> {
        SubsystemTag::ALL
            .iter()
            .map(|system| self.score_subsystem(*system, readings, faults))
            .collect()
    }

    /// Score and aggregate
    pub fn vehicle_health(&self, readings: &[Reading], faults: &[ActiveFault]) -> VehicleHealth {
        VehicleHealth::from_subsystems(self.score(readings, faults))
    }

    fn score_subsystem(
        &self,
        system: SubsystemTag,
        readings: &[Reading],
        faults: &[ActiveFault],
    ) -> SubsystemHealth {
        let relevant: Vec<&ActiveFault> = faults
            .iter()
            .filter(|f| f.system == system && f.state != FaultState::Candidate)
            .collect();

        let mut per_severity: BTreeMap<Severity, u32> = BTreeMap::new();
        for fault in &relevant {
            *per_severity.entry(fault.severity).or_default() += 1;
        }
        let fault_penalty: f64 = per_severity
            .iter()
            .map(|(severity, count)| {
                let base = self.config.penalties.for_severity(*severity);
                (0..*count)
                    .map(|k| base * self.config.diminishing_factor.powi(k as i32))
                    .sum::<f64>()
            })
            .sum();

        let reading_penalty: f64 = self
            .config
            .rules
            .iter()
            .filter(|rule| rule.system == system)
            .map(|rule| rule_penalty(rule, readings))
            .sum();

        let contributing: BTreeSet<_> = relevant.iter().map(|f| f.code.clone()).collect();
        SubsystemHealth::new(system, 100.0 - fault_penalty - reading_penalty, contributing)
    }
}

fn rule_penalty(rule: &ReadingRule, readings: &[Reading]) -> f64 {
    let mut trusted: Vec<&Reading> = readings
        .iter()
        .filter(|r| r.pid == rule.pid && r.is_trusted())
        .collect();
    if trusted.is_empty() {
        return 0.0;
    }
    trusted.sort_by_key(|r| r.observed_at);

    let excess = |value: f64| {
        let above = rule.alert_above.map_or(0.0, |limit| (value - limit).max(0.0));
        let below = rule.alert_below.map_or(0.0, |limit| (limit - value).max(0.0));
        above + below
    };
    let mean_excess = trusted.iter().map(|r| excess(r.value)).sum::<f64>() / trusted.len() as f64;
    let mut penalty = (rule.penalty_per_unit * mean_excess).min(rule.max_penalty);

    if let (Some(max_rise), [first, .., last]) = (rule.max_rise_per_min, trusted.as_slice()) {
        let minutes = (last.observed_at - first.observed_at).num_milliseconds() as f64 / 60_000.0;
        if minutes > 0.0 && (last.value - first.value) / minutes > max_rise {
            penalty += rule.rate_penalty;
        }
    }

    penalty
}
