//! Fault models: DTC reference data and tracked fault lifecycle state

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{SessionId, Timestamp};

/// A standard five-character Diagnostic Trouble Code (e.g. `P0302`)
///
/// Always stored upper-case. The first character is the category letter
/// (P, C, B, U), the second digit is 0-3 and the remaining three are hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DtcCode(String);

impl DtcCode {
    /// Build a code from the two-byte OBD-II encoding used by modes 03/07/0A
    pub fn from_obd_bytes(a: u8, b: u8) -> Self {
        let prefix = match (a >> 6) & 0x03 {
            0 => 'P',
            1 => 'C',
            2 => 'B',
            _ => 'U',
        };
        let second_digit = (a >> 4) & 0x03;
        let third_digit = a & 0x0F;
        let fourth_digit = (b >> 4) & 0x0F;
        let fifth_digit = b & 0x0F;

        Self(format!(
            "{}{:01X}{:01X}{:01X}{:01X}",
            prefix, second_digit, third_digit, fourth_digit, fifth_digit
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DtcCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        let mut chars = code.chars();

        let valid = code.len() == 5
            && matches!(chars.next(), Some('P' | 'C' | 'B' | 'U'))
            && matches!(chars.next(), Some('0'..='3'))
            && chars.all(|c| c.is_ascii_hexdigit());

        if valid {
            Ok(Self(code))
        } else {
            Err(format!("invalid DTC code: {}", s))
        }
    }
}

impl TryFrom<String> for DtcCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DtcCode> for String {
    fn from(code: DtcCode) -> Self {
        code.0
    }
}

impl fmt::Display for DtcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Vehicle subsystem a fault or reading rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsystemTag {
    Engine,
    Battery,
    Cooling,
    Brake,
    Fuel,
}

impl SubsystemTag {
    /// All subsystems in report order
    pub const ALL: [SubsystemTag; 5] = [
        SubsystemTag::Engine,
        SubsystemTag::Battery,
        SubsystemTag::Cooling,
        SubsystemTag::Brake,
        SubsystemTag::Fuel,
    ];
}

impl fmt::Display for SubsystemTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubsystemTag::Engine => "engine",
            SubsystemTag::Battery => "battery",
            SubsystemTag::Cooling => "cooling",
            SubsystemTag::Brake => "brake",
            SubsystemTag::Fuel => "fuel",
        };
        f.write_str(s)
    }
}

impl FromStr for SubsystemTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "engine" => Ok(SubsystemTag::Engine),
            // Electrical faults (charging, low voltage) land on the battery subsystem
            "battery" | "electrical" => Ok(SubsystemTag::Battery),
            "cooling" => Ok(SubsystemTag::Cooling),
            "brake" | "brakes" => Ok(SubsystemTag::Brake),
            "fuel" => Ok(SubsystemTag::Fuel),
            other => Err(format!("unknown subsystem: {}", other)),
        }
    }
}

/// Fault severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Static reference data for one DTC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultCode {
    pub code: DtcCode,
    pub system: SubsystemTag,
    pub severity: Severity,
    pub description: String,
    /// Suggested repair or inspection step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
}

/// Lifecycle state of a tracked fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultState {
    /// Seen but not yet confirmed by the debounce count
    Candidate,
    /// Confirmed and surfaced
    Active,
    /// Missing from recent scans, waiting for the clear count
    Clearing,
    /// Inactive; kept in history until the retention period expires
    Cleared,
}

/// A fault tracked for one session
///
/// `occurrences` counts re-reports received while the fault was already active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveFault {
    pub code: DtcCode,
    pub system: SubsystemTag,
    pub severity: Severity,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub occurrences: u32,
    pub state: FaultState,
    /// Set once the fault has been re-reported often enough to escalate
    #[serde(default)]
    pub escalated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared_at: Option<Timestamp>,
}

impl ActiveFault {
    /// Whether the fault is surfaced to queries as currently present
    pub fn is_present(&self) -> bool {
        matches!(self.state, FaultState::Active | FaultState::Clearing)
    }
}

/// Which DTC query produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtcReportKind {
    /// Mode 03: confirmed/stored codes
    Stored,
    /// Mode 07: pending codes from the current or last drive cycle
    Pending,
    /// Mode 0A: permanent codes
    Permanent,
}

/// The set of codes a DTC query response reported as currently set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtcReport {
    pub kind: DtcReportKind,
    pub codes: Vec<DtcCode>,
    pub observed_at: Timestamp,
    pub session_id: SessionId,
}

/// Filter for querying faults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SubsystemTag>,
}

impl FaultFilter {
    pub fn matches(&self, fault: &ActiveFault) -> bool {
        self.severity.map_or(true, |s| fault.severity == s)
            && self.system.map_or(true, |s| fault.system == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtc_from_obd_bytes() {
        assert_eq!(DtcCode::from_obd_bytes(0x03, 0x02).as_str(), "P0302");
        assert_eq!(DtcCode::from_obd_bytes(0x01, 0x71).as_str(), "P0171");
        assert_eq!(DtcCode::from_obd_bytes(0x45, 0x61).as_str(), "C0561");
        assert_eq!(DtcCode::from_obd_bytes(0x92, 0x34).as_str(), "B1234");
        assert_eq!(DtcCode::from_obd_bytes(0xC1, 0x00).as_str(), "U0100");
    }

    #[test]
    fn test_dtc_parse_validation() {
        assert_eq!("p0302".parse::<DtcCode>().unwrap().as_str(), "P0302");
        assert!("X0302".parse::<DtcCode>().is_err());
        assert!("P4302".parse::<DtcCode>().is_err());
        assert!("P030".parse::<DtcCode>().is_err());
        assert!("P03G2".parse::<DtcCode>().is_err());
    }

    #[test]
    fn test_dtc_serde_rejects_invalid() {
        let ok: DtcCode = serde_json::from_str("\"P0420\"").unwrap();
        assert_eq!(ok.as_str(), "P0420");
        assert!(serde_json::from_str::<DtcCode>("\"nope\"").is_err());
    }

    #[test]
    fn test_subsystem_aliases() {
        assert_eq!("Electrical".parse::<SubsystemTag>().unwrap(), SubsystemTag::Battery);
        assert_eq!("Brake".parse::<SubsystemTag>().unwrap(), SubsystemTag::Brake);
        assert!("transmission".parse::<SubsystemTag>().is_err());
    }
}
