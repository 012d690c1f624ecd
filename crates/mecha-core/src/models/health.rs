//! Subsystem and vehicle health models

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{DtcCode, SubsystemTag};

/// Health band derived from a 0-100 score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    NeedsAttention,
    Critical,
}

impl HealthStatus {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => HealthStatus::Excellent,
            80..=89 => HealthStatus::Good,
            70..=79 => HealthStatus::Fair,
            50..=69 => HealthStatus::NeedsAttention,
            _ => HealthStatus::Critical,
        }
    }
}

/// Health of one subsystem. Always recomputed from current inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemHealth {
    pub system: SubsystemTag,
    /// Score in `[0, 100]`
    pub score: u8,
    pub status: HealthStatus,
    pub contributing_faults: BTreeSet<DtcCode>,
}

impl SubsystemHealth {
    /// Build a subsystem entry from an unclamped score
    pub fn new(system: SubsystemTag, raw_score: f64, contributing_faults: BTreeSet<DtcCode>) -> Self {
        let score = clamp_score(raw_score);
        Self {
            system,
            score,
            status: HealthStatus::from_score(score),
            contributing_faults,
        }
    }
}

/// Aggregate health of the vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleHealth {
    /// Unweighted mean of subsystem scores, rounded to nearest
    pub score: u8,
    pub status: HealthStatus,
    pub subsystems: Vec<SubsystemHealth>,
}

impl VehicleHealth {
    pub fn from_subsystems(subsystems: Vec<SubsystemHealth>) -> Self {
        let score = if subsystems.is_empty() {
            100
        } else {
            let total: u32 = subsystems.iter().map(|s| s.score as u32).sum();
            clamp_score(total as f64 / subsystems.len() as f64)
        };

        Self {
            score,
            status: HealthStatus::from_score(score),
            subsystems,
        }
    }
}

/// Round and clamp a raw score into `[0, 100]`
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bands() {
        assert_eq!(HealthStatus::from_score(94), HealthStatus::Excellent);
        assert_eq!(HealthStatus::from_score(87), HealthStatus::Good);
        assert_eq!(HealthStatus::from_score(72), HealthStatus::Fair);
        assert_eq!(HealthStatus::from_score(65), HealthStatus::NeedsAttention);
        assert_eq!(HealthStatus::from_score(12), HealthStatus::Critical);
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(-40.0), 0);
        assert_eq!(clamp_score(140.0), 100);
        assert_eq!(clamp_score(87.5), 88);
        assert_eq!(clamp_score(f64::NAN), 0);
    }

    #[test]
    fn test_aggregate_is_rounded_mean() {
        let subsystems = vec![
            SubsystemHealth::new(SubsystemTag::Engine, 87.0, BTreeSet::new()),
            SubsystemHealth::new(SubsystemTag::Battery, 72.0, BTreeSet::new()),
            SubsystemHealth::new(SubsystemTag::Cooling, 94.0, BTreeSet::new()),
            SubsystemHealth::new(SubsystemTag::Brake, 65.0, BTreeSet::new()),
            SubsystemHealth::new(SubsystemTag::Fuel, 89.0, BTreeSet::new()),
        ];
        let health = VehicleHealth::from_subsystems(subsystems);
        // (87 + 72 + 94 + 65 + 89) / 5 = 81.4
        assert_eq!(health.score, 81);
        assert_eq!(health.status, HealthStatus::Good);
    }
}
