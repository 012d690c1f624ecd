//! Frame decoding errors

use mecha_core::Reading;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Framing, checksum, length or hex syntax is wrong, or the adapter
    /// reported a bus-level error
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// PID is not in the supported table. The payload is still decoded
    /// generically and carried here, tagged unrecognized.
    #[error("Unknown PID {}", .0.pid)]
    UnknownPid(Box<Reading>),

    /// Adapter answered "NO DATA": the vehicle did not respond
    #[error("No data from vehicle")]
    NoData,

    /// Adapter chatter that carries no vehicle data (echo, prompt, OK, SEARCHING...)
    #[error("Adapter message: {0}")]
    AdapterMessage(String),

    /// Vehicle rejected the request (service 0x7F)
    #[error("Negative response: service 0x{service:02X}, NRC 0x{nrc:02X}")]
    NegativeResponse { service: u8, nrc: u8 },
}

impl DecodeError {
    /// Whether this error counts towards link degradation
    pub fn is_malformed(&self) -> bool {
        matches!(self, DecodeError::MalformedFrame(_))
    }

    /// The generically decoded reading carried by `UnknownPid`
    pub fn into_recovered_reading(self) -> Option<Reading> {
        match self {
            DecodeError::UnknownPid(reading) => Some(*reading),
            _ => None,
        }
    }
}

pub(crate) fn malformed(msg: impl Into<String>) -> DecodeError {
    DecodeError::MalformedFrame(msg.into())
}
