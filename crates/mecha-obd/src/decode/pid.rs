//! Standard OBD-II mode 01 PID table
//!
//! Each entry carries the byte count, the scaling formula, the physical unit
//! and a plausibility range. Decoded values outside the plausibility range are
//! kept but tagged suspect.

use mecha_core::{Pid, Unit};

/// Decoding rule for one PID
#[derive(Clone, Copy)]
pub struct PidDefinition {
    pub pid: Pid,
    /// Semantic identifier (e.g. "coolant_temp")
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// Number of data bytes following the PID byte
    pub bytes: usize,
    pub unit: Unit,
    /// Decimal places kept after scaling
    pub precision: u8,
    /// Lowest physically plausible value
    pub min: f64,
    /// Highest physically plausible value
    pub max: f64,
    formula: fn(&[u8]) -> f64,
}

impl std::fmt::Debug for PidDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PidDefinition")
            .field("pid", &self.pid)
            .field("id", &self.id)
            .field("bytes", &self.bytes)
            .field("unit", &self.unit)
            .finish()
    }
}

impl PidDefinition {
    /// Apply the scaling formula and round to the PID's precision
    ///
    /// `data` must hold at least `self.bytes` bytes.
    pub fn decode(&self, data: &[u8]) -> f64 {
        round_to_precision((self.formula)(data), self.precision)
    }

    pub fn is_plausible(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

fn a(d: &[u8]) -> f64 {
    d[0] as f64
}

fn ab(d: &[u8]) -> f64 {
    (256.0 * d[0] as f64) + d[1] as f64
}

fn percent(d: &[u8]) -> f64 {
    a(d) * 100.0 / 255.0
}

fn temperature(d: &[u8]) -> f64 {
    a(d) - 40.0
}

fn fuel_trim(d: &[u8]) -> f64 {
    (a(d) - 128.0) * 100.0 / 128.0
}

fn rpm(d: &[u8]) -> f64 {
    ab(d) / 4.0
}

fn maf(d: &[u8]) -> f64 {
    ab(d) / 100.0
}

fn module_voltage(d: &[u8]) -> f64 {
    ab(d) / 1000.0
}

fn fuel_rate(d: &[u8]) -> f64 {
    ab(d) / 20.0
}

macro_rules! pid {
    ($pid:expr, $id:literal, $name:literal, $bytes:literal, $unit:expr, $prec:literal, $min:expr, $max:expr, $f:expr) => {
        PidDefinition {
            pid: $pid,
            id: $id,
            name: $name,
            bytes: $bytes,
            unit: $unit,
            precision: $prec,
            min: $min,
            max: $max,
            formula: $f,
        }
    };
}

/// Supported PIDs, ordered by PID byte
pub static PID_TABLE: &[PidDefinition] = &[
    pid!(Pid::ENGINE_LOAD, "engine_load", "Calculated Engine Load", 1, Unit::Percent, 1, 0.0, 100.0, percent),
    pid!(Pid::COOLANT_TEMP, "coolant_temp", "Engine Coolant Temperature", 1, Unit::Celsius, 0, -40.0, 150.0, temperature),
    pid!(Pid::SHORT_FUEL_TRIM_1, "short_fuel_trim_1", "Short Term Fuel Trim Bank 1", 1, Unit::Percent, 1, -100.0, 100.0, fuel_trim),
    pid!(Pid::LONG_FUEL_TRIM_1, "long_fuel_trim_1", "Long Term Fuel Trim Bank 1", 1, Unit::Percent, 1, -100.0, 100.0, fuel_trim),
    pid!(Pid::INTAKE_PRESSURE, "intake_pressure", "Intake Manifold Absolute Pressure", 1, Unit::Kilopascal, 0, 10.0, 255.0, a),
    pid!(Pid::ENGINE_RPM, "engine_rpm", "Engine Speed", 2, Unit::Rpm, 2, 0.0, 10000.0, rpm),
    pid!(Pid::VEHICLE_SPEED, "vehicle_speed", "Vehicle Speed", 1, Unit::KilometersPerHour, 0, 0.0, 250.0, a),
    pid!(Pid::INTAKE_AIR_TEMP, "intake_air_temp", "Intake Air Temperature", 1, Unit::Celsius, 0, -40.0, 100.0, temperature),
    pid!(Pid::MAF_RATE, "maf_rate", "Mass Air Flow Rate", 2, Unit::GramsPerSecond, 2, 0.0, 500.0, maf),
    pid!(Pid::THROTTLE_POSITION, "throttle_position", "Throttle Position", 1, Unit::Percent, 1, 0.0, 100.0, percent),
    pid!(Pid::RUN_TIME, "run_time", "Run Time Since Engine Start", 2, Unit::Seconds, 0, 0.0, 65535.0, ab),
    pid!(Pid::FUEL_LEVEL, "fuel_level", "Fuel Tank Level", 1, Unit::Percent, 1, 0.0, 100.0, percent),
    pid!(Pid::BAROMETRIC_PRESSURE, "barometric_pressure", "Barometric Pressure", 1, Unit::Kilopascal, 0, 50.0, 110.0, a),
    pid!(Pid::MODULE_VOLTAGE, "module_voltage", "Control Module Voltage", 2, Unit::Volts, 3, 5.0, 20.0, module_voltage),
    pid!(Pid::AMBIENT_AIR_TEMP, "ambient_air_temp", "Ambient Air Temperature", 1, Unit::Celsius, 0, -40.0, 60.0, temperature),
    pid!(Pid::OIL_TEMP, "oil_temp", "Engine Oil Temperature", 1, Unit::Celsius, 0, -40.0, 180.0, temperature),
    pid!(Pid::FUEL_RATE, "fuel_rate", "Engine Fuel Rate", 2, Unit::LitersPerHour, 2, 0.0, 100.0, fuel_rate),
];

/// Look up a PID definition
pub fn lookup(pid: Pid) -> Option<&'static PidDefinition> {
    PID_TABLE
        .binary_search_by_key(&pid, |def| def.pid)
        .ok()
        .map(|idx| &PID_TABLE[idx])
}

/// Round a value to the specified number of decimal places
fn round_to_precision(value: f64, precision: u8) -> f64 {
    if precision == 0 {
        value.round()
    } else {
        let factor = 10_f64.powi(precision as i32);
        (value * factor).round() / factor
    }
}
