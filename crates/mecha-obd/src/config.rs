//! Engine configuration
//!
//! Every table is optional; missing fields fall back to the built-in defaults
//! so an empty `[engine]` section yields a working engine.

use std::time::Duration;

use mecha_core::{Pid, Severity, SubsystemTag};
use serde::{Deserialize, Serialize};

use crate::decode::Framing;
use crate::error::ConfigError;

/// Per-session ingestion and state settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ring capacity per PID in the Session Buffer
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Read timeout before reporting NoData (milliseconds)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Consecutive malformed frames that signal LinkDegraded
    #[serde(default = "default_malformed_threshold")]
    pub malformed_threshold: u32,
    /// Trailing window the live health score looks at (seconds)
    #[serde(default = "default_scoring_window_secs")]
    pub scoring_window_secs: u64,
    /// Adapter framing
    #[serde(default)]
    pub framing: Framing,
    /// Fault lifecycle settings
    #[serde(flatten)]
    pub tracker: TrackerConfig,
}

fn default_buffer_capacity() -> usize {
    2000
}

fn default_read_timeout_ms() -> u64 {
    3000
}

fn default_malformed_threshold() -> u32 {
    5
}

fn default_scoring_window_secs() -> u64 {
    300
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            read_timeout_ms: default_read_timeout_ms(),
            malformed_threshold: default_malformed_threshold(),
            scoring_window_secs: default_scoring_window_secs(),
            framing: Framing::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn scoring_window(&self) -> chrono::Duration {
        seconds_delta(self.scoring_window_secs).unwrap_or(chrono::Duration::MAX)
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::invalid("buffer_capacity", "must be at least 1"));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::invalid("read_timeout_ms", "must be at least 1"));
        }
        if self.malformed_threshold == 0 {
            return Err(ConfigError::invalid("malformed_threshold", "must be at least 1"));
        }
        if self.scoring_window_secs == 0 {
            return Err(ConfigError::invalid("scoring_window_secs", "must be at least 1"));
        }
        if seconds_delta(self.scoring_window_secs).is_none() {
            return Err(ConfigError::invalid("scoring_window_secs", "out of range"));
        }
        self.tracker.validate()
    }
}

/// Fault Tracker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Consecutive reports needed for Candidate -> Active
    #[serde(default = "default_debounce_count")]
    pub debounce_count: u32,
    /// Consecutive clean scans needed for Clearing -> Cleared
    #[serde(default = "default_clear_count")]
    pub clear_count: u32,
    /// Occurrences at which an Active fault escalates (0 disables)
    #[serde(default = "default_escalate_after")]
    pub escalate_after: u32,
    /// How long Cleared faults stay in history (seconds)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_debounce_count() -> u32 {
    2
}

fn default_clear_count() -> u32 {
    2
}

fn default_escalate_after() -> u32 {
    10
}

fn default_retention_secs() -> u64 {
    86400
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce_count: default_debounce_count(),
            clear_count: default_clear_count(),
            escalate_after: default_escalate_after(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl TrackerConfig {
    pub fn retention(&self) -> chrono::Duration {
        seconds_delta(self.retention_secs).unwrap_or(chrono::Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_count == 0 {
            return Err(ConfigError::invalid("debounce_count", "must be at least 1"));
        }
        if self.clear_count == 0 {
            return Err(ConfigError::invalid("clear_count", "must be at least 1"));
        }
        if seconds_delta(self.retention_secs).is_none() {
            return Err(ConfigError::invalid("retention_secs", "out of range"));
        }
        Ok(())
    }
}

/// Whole seconds as a chrono delta, `None` past its range
fn seconds_delta(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

// =============================================================================
// Scoring
// =============================================================================

/// Health Scorer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Base penalty per active fault, by severity
    #[serde(default)]
    pub penalties: SeverityPenalties,
    /// Weight multiplier applied to each further fault of the same severity
    #[serde(default = "default_diminishing_factor")]
    pub diminishing_factor: f64,
    /// Continuous penalties from out-of-range readings
    #[serde(default = "default_rules")]
    pub rules: Vec<ReadingRule>,
}

fn default_diminishing_factor() -> f64 {
    0.5
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            penalties: SeverityPenalties::default(),
            diminishing_factor: default_diminishing_factor(),
            rules: default_rules(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.diminishing_factor) {
            return Err(ConfigError::invalid(
                "diminishing_factor",
                format!("{} is outside [0, 1)", self.diminishing_factor),
            ));
        }
        for (field, value) in [
            ("penalties.high", self.penalties.high),
            ("penalties.medium", self.penalties.medium),
            ("penalties.low", self.penalties.low),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, format!("{} is not a valid penalty", value)));
            }
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }
}

/// Per-severity fault penalties
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityPenalties {
    #[serde(default = "default_high_penalty")]
    pub high: f64,
    #[serde(default = "default_medium_penalty")]
    pub medium: f64,
    #[serde(default = "default_low_penalty")]
    pub low: f64,
}

fn default_high_penalty() -> f64 {
    25.0
}

fn default_medium_penalty() -> f64 {
    12.0
}

fn default_low_penalty() -> f64 {
    5.0
}

impl Default for SeverityPenalties {
    fn default() -> Self {
        Self {
            high: default_high_penalty(),
            medium: default_medium_penalty(),
            low: default_low_penalty(),
        }
    }
}

impl SeverityPenalties {
    pub fn for_severity(&self, severity: Severity) -> f64 {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// Out-of-nominal-range penalty for one PID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRule {
    pub pid: Pid,
    pub system: SubsystemTag,
    /// Readings above this value count as excess
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_above: Option<f64>,
    /// Readings below this value count as excess
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_below: Option<f64>,
    /// Penalty per unit of mean excess
    pub penalty_per_unit: f64,
    /// Cap for the excess penalty
    pub max_penalty: f64,
    /// Rise rate (units per minute) above which `rate_penalty` applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rise_per_min: Option<f64>,
    #[serde(default)]
    pub rate_penalty: f64,
}

impl ReadingRule {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.alert_above.is_none() && self.alert_below.is_none() {
            return Err(ConfigError::invalid(
                "rules",
                format!("rule for PID {} has no alert threshold", self.pid),
            ));
        }
        if let (Some(above), Some(below)) = (self.alert_above, self.alert_below) {
            if below > above {
                return Err(ConfigError::invalid(
                    "rules",
                    format!("rule for PID {} has alert_below above alert_above", self.pid),
                ));
            }
        }
        if self.penalty_per_unit < 0.0 || self.max_penalty < 0.0 || self.rate_penalty < 0.0 {
            return Err(ConfigError::invalid(
                "rules",
                format!("rule for PID {} has a negative penalty", self.pid),
            ));
        }
        Ok(())
    }
}

fn rule(pid: Pid, system: SubsystemTag, above: Option<f64>, below: Option<f64>, per_unit: f64, max: f64) -> ReadingRule {
    ReadingRule {
        pid,
        system,
        alert_above: above,
        alert_below: below,
        penalty_per_unit: per_unit,
        max_penalty: max,
        max_rise_per_min: None,
        rate_penalty: 0.0,
    }
}

/// Built-in reading rules
pub fn default_rules() -> Vec<ReadingRule> {
    vec![
        ReadingRule {
            max_rise_per_min: Some(5.0),
            rate_penalty: 5.0,
            ..rule(Pid::COOLANT_TEMP, SubsystemTag::Cooling, Some(105.0), None, 2.0, 40.0)
        },
        rule(Pid::MODULE_VOLTAGE, SubsystemTag::Battery, Some(15.0), Some(12.2), 20.0, 30.0),
        rule(Pid::FUEL_LEVEL, SubsystemTag::Fuel, None, Some(10.0), 1.5, 15.0),
        rule(Pid::LONG_FUEL_TRIM_1, SubsystemTag::Fuel, Some(10.0), Some(-10.0), 2.0, 20.0),
        rule(Pid::OIL_TEMP, SubsystemTag::Engine, Some(130.0), None, 1.5, 30.0),
        rule(Pid::ENGINE_RPM, SubsystemTag::Engine, Some(6000.0), None, 0.01, 15.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(default)]
        engine: EngineConfig,
        #[serde(default)]
        scoring: ScoringConfig,
    }

    #[test]
    fn test_empty_tables_use_defaults() {
        let parsed: Wrapper = toml::from_str("[engine]\n[scoring]\n").unwrap();
        assert_eq!(parsed.engine.buffer_capacity, 2000);
        assert_eq!(parsed.engine.tracker, TrackerConfig::default());
        assert_eq!(parsed.scoring, ScoringConfig::default());
        assert!(parsed.engine.validate().is_ok());
        assert!(parsed.scoring.validate().is_ok());
    }

    #[test]
    fn test_flattened_tracker_fields() {
        let parsed: Wrapper = toml::from_str(
            r#"
[engine]
debounce_count = 3
escalate_after = 0
framing = "can"
"#,
        )
        .unwrap();
        assert_eq!(parsed.engine.tracker.debounce_count, 3);
        assert_eq!(parsed.engine.tracker.escalate_after, 0);
        assert_eq!(parsed.engine.tracker.clear_count, 2);
        assert_eq!(parsed.engine.framing, Framing::Can);
    }

    #[test]
    fn test_custom_rules_replace_defaults() {
        let parsed: Wrapper = toml::from_str(
            r#"
[scoring.penalties]
high = 30.0

[[scoring.rules]]
pid = 0x05
system = "cooling"
alert_above = 100.0
penalty_per_unit = 1.0
max_penalty = 20.0
"#,
        )
        .unwrap();
        assert_eq!(parsed.scoring.penalties.high, 30.0);
        assert_eq!(parsed.scoring.penalties.low, 5.0);
        assert_eq!(parsed.scoring.rules.len(), 1);
        assert_eq!(parsed.scoring.rules[0].pid, Pid::COOLANT_TEMP);
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let mut config = EngineConfig::default();
        config.tracker.debounce_count = 0;
        assert!(config.validate().is_err());

        let config = EngineConfig {
            buffer_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_durations() {
        for secs in [u64::MAX, i64::MAX as u64] {
            let mut config = EngineConfig::default();
            config.tracker.retention_secs = secs;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidValue { field: "retention_secs", .. })
            ));

            let config = EngineConfig {
                scoring_window_secs: secs,
                ..EngineConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidValue { field: "scoring_window_secs", .. })
            ));
        }

        let mut config = EngineConfig::default();
        config.tracker.retention_secs = 10_000_000_000_000;
        assert!(config.validate().is_ok());
        assert_eq!(config.tracker.retention().num_seconds(), 10_000_000_000_000);
    }

    #[test]
    fn test_validate_rejects_thresholdless_rule() {
        let mut scoring = ScoringConfig::default();
        scoring.rules.push(rule(Pid::ENGINE_LOAD, SubsystemTag::Engine, None, None, 1.0, 1.0));
        assert!(scoring.validate().is_err());
    }
}
