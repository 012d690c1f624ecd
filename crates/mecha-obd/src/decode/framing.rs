//! Adapter line framing: status lines, CAN/ISO-TP headers, ISO 9141 checksums
//!
//! Turns one raw adapter response (everything up to the `>` prompt) into the
//! OBD service payloads it carries, one per responding ECU.

use serde::{Deserialize, Serialize};

use super::error::{malformed, DecodeError};

/// How the adapter frames response lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// CAN when lines carry an 11-bit header, plain otherwise
    #[default]
    Auto,
    /// Headers off: service payload only (`41 0C 1A F8`)
    Plain,
    /// Headers on, ISO 15765 CAN: `7E8 04 41 0C 1A F8`
    Can,
    /// Headers on, ISO 9141-2 / KWP: `48 6B 10 41 0C 1A F8 CS`
    Iso9141,
}

/// Payloads extracted from one raw response
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Payloads {
    /// Framing actually applied (never `Auto`)
    pub framing: Framing,
    /// One service payload per responding ECU, in arrival order
    pub payloads: Vec<Vec<u8>>,
}

enum LineClass {
    Data,
    NoData,
    Adapter,
    LinkError,
}

fn classify(line: &str) -> LineClass {
    let upper = line.to_ascii_uppercase();
    match upper.as_str() {
        "NO DATA" => LineClass::NoData,
        "OK" | "STOPPED" => LineClass::Adapter,
        "?" | "CAN ERROR" | "BUS ERROR" | "BUS BUSY" | "DATA ERROR" | "BUFFER FULL"
        | "FB ERROR" | "LV RESET" | "UNABLE TO CONNECT" => LineClass::LinkError,
        s if s.starts_with("SEARCHING") || s.starts_with("ELM327") || s.starts_with("BUS INIT") => {
            LineClass::Adapter
        }
        s if s.starts_with("<RX ERROR") || s.starts_with("ERR") => LineClass::LinkError,
        // Echoed AT commands
        s if s.starts_with("AT") => LineClass::Adapter,
        _ => LineClass::Data,
    }
}

/// Split a raw frame into trimmed, non-empty lines
fn split_lines(text: &str) -> Vec<&str> {
    text.split(['\r', '\n'])
        .map(|l| l.trim().trim_matches('>').trim())
        .filter(|l| !l.is_empty())
        .collect()
}

fn compact(line: &str) -> String {
    line.split_whitespace().collect()
}

fn decode_hex(s: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(s).map_err(|e| malformed(format!("invalid hex '{}': {}", s, e)))
}

/// Extract service payloads from a raw adapter response
pub(crate) fn extract_payloads(raw: &[u8], framing: Framing) -> Result<Payloads, DecodeError> {
    let text = std::str::from_utf8(raw)
        .ok()
        .filter(|t| t.is_ascii())
        .ok_or_else(|| malformed("frame is not ASCII"))?;

    let mut data_lines = Vec::new();
    let mut saw_no_data = false;
    let mut adapter_msg: Option<&str> = None;
    let mut link_error: Option<&str> = None;

    for line in split_lines(text) {
        match classify(line) {
            LineClass::Data => data_lines.push(line),
            LineClass::NoData => saw_no_data = true,
            LineClass::Adapter => {
                adapter_msg.get_or_insert(line);
            }
            LineClass::LinkError => {
                link_error.get_or_insert(line);
            }
        }
    }

    if let Some(err) = link_error {
        return Err(malformed(format!("adapter reported '{}'", err)));
    }
    if data_lines.is_empty() {
        if saw_no_data {
            return Err(DecodeError::NoData);
        }
        return match adapter_msg {
            Some(msg) => Err(DecodeError::AdapterMessage(msg.to_string())),
            None => Err(malformed("empty frame")),
        };
    }

    let framing = match framing {
        Framing::Auto => detect_framing(&data_lines),
        other => other,
    };

    let payloads = match framing {
        Framing::Can => can_payloads(&data_lines)?,
        Framing::Iso9141 => iso9141_payloads(&data_lines)?,
        _ => plain_payloads(&data_lines)?,
    };

    Ok(Payloads { framing, payloads })
}

/// An 11-bit CAN header makes the compacted line odd-length
fn detect_framing(lines: &[&str]) -> Framing {
    let first = compact(lines[0]);
    if first.len() > 3 && first.len() % 2 == 1 {
        Framing::Can
    } else {
        Framing::Plain
    }
}

/// Split an indexed multi-frame segment ("1: 71 01 04") into (index, rest)
fn indexed_segment(line: &str) -> Option<(u8, &str)> {
    let (idx, rest) = line.split_once(':')?;
    let idx = u8::from_str_radix(idx.trim(), 16).ok()?;
    Some((idx, rest))
}

/// Headers-off payloads, including the adapter's indexed multi-frame format:
///
/// ```text
/// 00A
/// 0: 43 04 01 03 02
/// 1: 71 01 04 00 00 00 00
/// ```
fn plain_payloads(lines: &[&str]) -> Result<Vec<Vec<u8>>, DecodeError> {
    let first = compact(lines[0]);
    let is_multi_frame = first.len() == 3 && lines.len() > 1 && indexed_segment(lines[1]).is_some();

    if !is_multi_frame {
        return lines.iter().map(|l| decode_hex(&compact(l))).collect();
    }

    let total = usize::from_str_radix(&first, 16)
        .map_err(|_| malformed(format!("invalid multi-frame length '{}'", first)))?;
    let mut buf = Vec::with_capacity(total);
    for (expected, line) in lines[1..].iter().enumerate() {
        let (idx, rest) = indexed_segment(line)
            .ok_or_else(|| malformed(format!("expected indexed segment, got '{}'", line)))?;
        if idx as usize != expected % 16 {
            return Err(malformed(format!(
                "multi-frame segment {} out of sequence (expected {})",
                idx,
                expected % 16
            )));
        }
        buf.extend(decode_hex(&compact(rest))?);
    }

    if buf.len() < total {
        return Err(malformed(format!(
            "multi-frame response truncated: {} of {} bytes",
            buf.len(),
            total
        )));
    }
    buf.truncate(total);
    Ok(vec![buf])
}

/// ISO-TP reassembly state for one responding CAN id
struct IsoTpAssembly {
    header: String,
    total: usize,
    next_seq: u8,
    buf: Vec<u8>,
}

fn can_payloads(lines: &[&str]) -> Result<Vec<Vec<u8>>, DecodeError> {
    let mut complete: Vec<Vec<u8>> = Vec::new();
    let mut pending: Vec<IsoTpAssembly> = Vec::new();

    for line in lines {
        let line = compact(line);
        if line.len() < 5 || line.len() % 2 == 0 {
            return Err(malformed(format!("missing 11-bit CAN header in '{}'", line)));
        }
        let (header, body) = line.split_at(3);
        let bytes = decode_hex(body)?;
        let pci = bytes[0];

        match pci >> 4 {
            0x0 => {
                let len = (pci & 0x0F) as usize;
                if len == 0 || bytes.len() < 1 + len {
                    return Err(malformed(format!(
                        "single frame length {} does not match {} data bytes",
                        len,
                        bytes.len() - 1
                    )));
                }
                complete.push(bytes[1..1 + len].to_vec());
            }
            0x1 => {
                if bytes.len() < 2 {
                    return Err(malformed("first frame too short"));
                }
                let total = (((pci & 0x0F) as usize) << 8) | bytes[1] as usize;
                pending.retain(|p| p.header != header);
                pending.push(IsoTpAssembly {
                    header: header.to_string(),
                    total,
                    next_seq: 1,
                    buf: bytes[2..].to_vec(),
                });
            }
            0x2 => {
                let seq = pci & 0x0F;
                let assembly = pending
                    .iter_mut()
                    .find(|p| p.header == header)
                    .ok_or_else(|| malformed(format!("consecutive frame from {} without first frame", header)))?;
                if seq != assembly.next_seq {
                    return Err(malformed(format!(
                        "consecutive frame {} out of sequence (expected {})",
                        seq, assembly.next_seq
                    )));
                }
                assembly.next_seq = (assembly.next_seq + 1) & 0x0F;
                assembly.buf.extend_from_slice(&bytes[1..]);
            }
            // Flow control frames carry no payload
            0x3 => {}
            _ => return Err(malformed(format!("invalid ISO-TP PCI 0x{:02X}", pci))),
        }

        if let Some(pos) = pending.iter().position(|p| p.buf.len() >= p.total) {
            let mut done = pending.remove(pos);
            done.buf.truncate(done.total);
            complete.push(done.buf);
        }
    }

    if let Some(p) = pending.first() {
        return Err(malformed(format!(
            "multi-frame response from {} truncated: {} of {} bytes",
            p.header,
            p.buf.len(),
            p.total
        )));
    }
    if complete.is_empty() {
        return Err(malformed("no payload in CAN response"));
    }
    Ok(complete)
}

fn iso9141_payloads(lines: &[&str]) -> Result<Vec<Vec<u8>>, DecodeError> {
    lines
        .iter()
        .map(|line| {
            let bytes = decode_hex(&compact(line))?;
            if bytes.len() < 5 {
                return Err(malformed(format!("ISO 9141 frame too short: {} bytes", bytes.len())));
            }
            let (body, checksum) = bytes.split_at(bytes.len() - 1);
            let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
            if sum != checksum[0] {
                return Err(malformed(format!(
                    "checksum mismatch: computed 0x{:02X}, frame has 0x{:02X}",
                    sum, checksum[0]
                )));
            }
            Ok(body[3..].to_vec())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_single_line() {
        let p = extract_payloads(b"41 0C 1A F8\r\r>", Framing::Auto).unwrap();
        assert_eq!(p.framing, Framing::Plain);
        assert_eq!(p.payloads, vec![vec![0x41, 0x0C, 0x1A, 0xF8]]);
    }

    #[test]
    fn test_spaces_off() {
        let p = extract_payloads(b"410C1AF8", Framing::Auto).unwrap();
        assert_eq!(p.payloads, vec![vec![0x41, 0x0C, 0x1A, 0xF8]]);
    }

    #[test]
    fn test_can_header_autodetect() {
        let p = extract_payloads(b"7E8 04 41 0C 1A F8 55 55 55", Framing::Auto).unwrap();
        assert_eq!(p.framing, Framing::Can);
        assert_eq!(p.payloads, vec![vec![0x41, 0x0C, 0x1A, 0xF8]]);
    }

    #[test]
    fn test_can_single_frame_length_mismatch() {
        let err = extract_payloads(b"7E8 06 41 0C 1A F8", Framing::Can).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_can_multi_frame() {
        let raw = b"7E8 10 0A 43 04 01 03 02 71\r7E8 21 01 04 00 00 00 00\r\r>";
        let p = extract_payloads(raw, Framing::Auto).unwrap();
        assert_eq!(
            p.payloads,
            vec![vec![0x43, 0x04, 0x01, 0x03, 0x02, 0x71, 0x01, 0x04, 0x00, 0x00]]
        );
    }

    #[test]
    fn test_can_multi_frame_truncated() {
        let raw = b"7E8 10 14 43 04 01 03 02 71\r7E8 21 01 04 00 00 00 00";
        assert!(extract_payloads(raw, Framing::Can).unwrap_err().is_malformed());
    }

    #[test]
    fn test_can_consecutive_out_of_sequence() {
        let raw = b"7E8 10 0A 43 04 01 03 02 71\r7E8 22 01 04 00 00 00 00";
        assert!(extract_payloads(raw, Framing::Can).unwrap_err().is_malformed());
    }

    #[test]
    fn test_plain_indexed_multi_frame() {
        let raw = b"00A\r0: 43 04 01 03 02\r1: 71 01 04 00 00 00 00\r\r>";
        let p = extract_payloads(raw, Framing::Auto).unwrap();
        assert_eq!(
            p.payloads,
            vec![vec![0x43, 0x04, 0x01, 0x03, 0x02, 0x71, 0x01, 0x04, 0x00, 0x00]]
        );
    }

    #[test]
    fn test_iso9141_checksum() {
        // 48+6B+10+41+05+7B = 0x184 -> 0x84
        let p = extract_payloads(b"48 6B 10 41 05 7B 84", Framing::Iso9141).unwrap();
        assert_eq!(p.payloads, vec![vec![0x41, 0x05, 0x7B]]);

        let err = extract_payloads(b"48 6B 10 41 05 7B 85", Framing::Iso9141).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(
            extract_payloads(b"NO DATA\r\r>", Framing::Auto).unwrap_err(),
            DecodeError::NoData
        );
        assert!(matches!(
            extract_payloads(b"OK\r>", Framing::Auto).unwrap_err(),
            DecodeError::AdapterMessage(_)
        ));
        assert!(extract_payloads(b"CAN ERROR", Framing::Auto)
            .unwrap_err()
            .is_malformed());
        assert!(extract_payloads(b"?", Framing::Auto).unwrap_err().is_malformed());
    }

    #[test]
    fn test_searching_prefix_dropped() {
        let p = extract_payloads(b"SEARCHING...\r41 05 7B\r\r>", Framing::Auto).unwrap();
        assert_eq!(p.payloads, vec![vec![0x41, 0x05, 0x7B]]);
    }

    #[test]
    fn test_odd_hex_is_malformed() {
        assert!(extract_payloads(b"41 0C 1", Framing::Plain)
            .unwrap_err()
            .is_malformed());
        assert!(extract_payloads(b"41 ZZ", Framing::Plain)
            .unwrap_err()
            .is_malformed());
    }
}
