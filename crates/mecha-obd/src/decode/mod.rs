//! Frame Decoder: raw adapter responses to typed readings and DTC reports
//!
//! Decoding is a pure function of the input bytes, the observation time and
//! the session id. It holds no state and performs no I/O, so captured adapter
//! logs can be replayed and produce identical results.
//!
//! # Frame families
//!
//! | Service | Response | Output |
//! |---------|----------|--------|
//! | 0x01 current data | `41 PID A [B..]` | [`Frame::Reading`] |
//! | 0x03 stored DTCs | `43 [count] A1 B1 ..` | [`Frame::Dtc`] (stored) |
//! | 0x07 pending DTCs | `47 [count] A1 B1 ..` | [`Frame::Dtc`] (pending) |
//! | 0x0A permanent DTCs | `4A [count] A1 B1 ..` | [`Frame::Dtc`] (permanent) |

mod error;
mod framing;
pub mod pid;

pub use error::DecodeError;
pub use framing::Framing;
pub use pid::{PidDefinition, PID_TABLE};

use mecha_core::{
    DtcCode, DtcReport, DtcReportKind, Pid, Reading, ReadingQuality, SessionId, Timestamp, Unit,
};

use error::malformed;
use framing::extract_payloads;

/// Positive response service ids
mod service {
    pub const CURRENT_DATA: u8 = 0x41;
    pub const STORED_DTC: u8 = 0x43;
    pub const PENDING_DTC: u8 = 0x47;
    pub const PERMANENT_DTC: u8 = 0x4A;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}

/// A successfully decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Reading(Reading),
    Dtc(DtcReport),
}

/// Stateless decoder for one adapter configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    framing: Framing,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self { framing }
    }

    /// Decode one raw adapter response
    pub fn decode(
        &self,
        session_id: &SessionId,
        raw: &[u8],
        observed_at: Timestamp,
    ) -> Result<Frame, DecodeError> {
        let extracted = extract_payloads(raw, self.framing)?;
        let has_count_byte = |payload: &[u8]| match extracted.framing {
            Framing::Can => true,
            Framing::Iso9141 => false,
            // Headers off: CAN responses carry a count byte, legacy ones do not,
            // and DTC pairs are always even
            _ => payload.len() % 2 == 0,
        };

        let first = extracted
            .payloads
            .first()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| malformed("empty service payload"))?;
        let sid = first[0];

        match sid {
            service::CURRENT_DATA => decode_reading(session_id, first, observed_at),
            service::STORED_DTC | service::PENDING_DTC | service::PERMANENT_DTC => {
                let kind = match sid {
                    service::STORED_DTC => DtcReportKind::Stored,
                    service::PENDING_DTC => DtcReportKind::Pending,
                    _ => DtcReportKind::Permanent,
                };

                // Several ECUs may answer one DTC query; merge their codes
                let mut codes: Vec<DtcCode> = Vec::new();
                for payload in &extracted.payloads {
                    if payload.first() != Some(&sid) {
                        return Err(malformed(format!(
                            "mixed services in one DTC response: 0x{:02X} and 0x{:02X}",
                            sid,
                            payload.first().copied().unwrap_or_default()
                        )));
                    }
                    for code in decode_dtc_payload(payload, has_count_byte(payload))? {
                        if !codes.contains(&code) {
                            codes.push(code);
                        }
                    }
                }

                Ok(Frame::Dtc(DtcReport {
                    kind,
                    codes,
                    observed_at,
                    session_id: session_id.clone(),
                }))
            }
            service::NEGATIVE_RESPONSE => {
                if first.len() < 3 {
                    return Err(malformed("negative response too short"));
                }
                Err(DecodeError::NegativeResponse {
                    service: first[1],
                    nrc: first[2],
                })
            }
            other => Err(malformed(format!("unsupported service 0x{:02X}", other))),
        }
    }
}

fn decode_reading(
    session_id: &SessionId,
    payload: &[u8],
    observed_at: Timestamp,
) -> Result<Frame, DecodeError> {
    if payload.len() < 3 {
        return Err(malformed(format!(
            "PID response too short: {} bytes",
            payload.len()
        )));
    }
    let pid = Pid(payload[1]);
    let data = &payload[2..];

    let Some(def) = pid::lookup(pid) else {
        if data.len() > 8 {
            return Err(malformed(format!(
                "unrecognized PID {} payload too long: {} bytes",
                pid,
                data.len()
            )));
        }
        let value = data.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64) as f64;
        return Err(DecodeError::UnknownPid(Box::new(Reading {
            pid,
            value,
            unit: Unit::Raw,
            observed_at,
            session_id: session_id.clone(),
            quality: ReadingQuality::Unrecognized,
        })));
    };

    if data.len() != def.bytes {
        return Err(malformed(format!(
            "PID {} expects {} data bytes, got {}",
            pid,
            def.bytes,
            data.len()
        )));
    }

    let value = def.decode(data);
    let quality = if def.is_plausible(value) {
        ReadingQuality::Valid
    } else {
        ReadingQuality::Suspect
    };

    Ok(Frame::Reading(Reading {
        pid,
        value,
        unit: def.unit,
        observed_at,
        session_id: session_id.clone(),
        quality,
    }))
}

fn decode_dtc_payload(payload: &[u8], has_count_byte: bool) -> Result<Vec<DtcCode>, DecodeError> {
    let (count, pairs) = if has_count_byte {
        if payload.len() < 2 {
            return Err(malformed("DTC response missing count byte"));
        }
        (Some(payload[1] as usize), &payload[2..])
    } else {
        (None, &payload[1..])
    };

    if pairs.len() % 2 != 0 {
        return Err(malformed(format!(
            "DTC response has odd byte count {}",
            pairs.len()
        )));
    }

    let codes: Vec<DtcCode> = pairs
        .chunks_exact(2)
        .filter(|pair| **pair != [0x00, 0x00])
        .map(|pair| DtcCode::from_obd_bytes(pair[0], pair[1]))
        .collect();

    if let Some(count) = count {
        if count != codes.len() {
            return Err(malformed(format!(
                "DTC count byte says {} but frame carries {}",
                count,
                codes.len()
            )));
        }
    }

    Ok(codes)
}
