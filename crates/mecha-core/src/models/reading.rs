//! Decoded sensor readings

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{SessionId, Timestamp};

/// OBD-II mode 01 Parameter ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u8);

impl Pid {
    pub const ENGINE_LOAD: Pid = Pid(0x04);
    pub const COOLANT_TEMP: Pid = Pid(0x05);
    pub const SHORT_FUEL_TRIM_1: Pid = Pid(0x06);
    pub const LONG_FUEL_TRIM_1: Pid = Pid(0x07);
    pub const INTAKE_PRESSURE: Pid = Pid(0x0B);
    pub const ENGINE_RPM: Pid = Pid(0x0C);
    pub const VEHICLE_SPEED: Pid = Pid(0x0D);
    pub const INTAKE_AIR_TEMP: Pid = Pid(0x0F);
    pub const MAF_RATE: Pid = Pid(0x10);
    pub const THROTTLE_POSITION: Pid = Pid(0x11);
    pub const RUN_TIME: Pid = Pid(0x1F);
    pub const FUEL_LEVEL: Pid = Pid(0x2F);
    pub const BAROMETRIC_PRESSURE: Pid = Pid(0x33);
    pub const MODULE_VOLTAGE: Pid = Pid(0x42);
    pub const AMBIENT_AIR_TEMP: Pid = Pid(0x46);
    pub const OIL_TEMP: Pid = Pid(0x5C);
    pub const FUEL_RATE: Pid = Pid(0x5E);
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

impl FromStr for Pid {
    type Err = String;

    /// Accepts "0C", "0x0C", "0X0C" and "0c"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.trim().trim_start_matches("0x").trim_start_matches("0X");
        u8::from_str_radix(cleaned, 16)
            .map(Pid)
            .map_err(|_| format!("invalid PID: {}", s))
    }
}

/// Physical unit of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Percent,
    Celsius,
    Kilopascal,
    Rpm,
    KilometersPerHour,
    GramsPerSecond,
    Seconds,
    Volts,
    LitersPerHour,
    /// Undecoded payload interpreted as a big-endian unsigned integer
    Raw,
}

/// Plausibility tag attached at decode time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingQuality {
    /// Known PID, value inside its plausible range
    #[default]
    Valid,
    /// Known PID, value outside its plausible range
    Suspect,
    /// PID not in the supported table; value is the raw payload
    Unrecognized,
}

/// A single decoded sensor value. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub pid: Pid,
    pub value: f64,
    pub unit: Unit,
    pub observed_at: Timestamp,
    pub session_id: SessionId,
    #[serde(default)]
    pub quality: ReadingQuality,
}

impl Reading {
    /// Whether this reading can feed scoring rules
    pub fn is_trusted(&self) -> bool {
        self.quality == ReadingQuality::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_parse_and_display() {
        assert_eq!("0C".parse::<Pid>().unwrap(), Pid::ENGINE_RPM);
        assert_eq!("0x05".parse::<Pid>().unwrap(), Pid::COOLANT_TEMP);
        assert_eq!("2f".parse::<Pid>().unwrap(), Pid::FUEL_LEVEL);
        assert!("1FF".parse::<Pid>().is_err());
        assert_eq!(Pid(0x0C).to_string(), "0C");
    }
}
