//! The packet decoder (spec.md §4.1).
//!
//! Purely computational: no I/O, no suspension points (spec.md §5
//! "Pure parsing ... is non-suspending"). `decode()` never panics and
//! never returns an `Err` to its caller — malformed input becomes
//! `None`, with the reason logged by the caller at `warn` if it wants.

use crate::error::Error;
use crate::hash::packet_hash;
use crate::types::{PacketHash, PathInfo, PathKind, Packet, PayloadType, PayloadVersion, RouteType};

/// 4-byte tag + 4-byte auth + 1-byte flags precede the routing path
/// hashes inside a TRACE payload (spec.md §4.1 "TRACE special case").
const TRACE_PREAMBLE_LEN: usize = 9;

/// Decode a raw (or RF-stripped) hex frame into a [`Packet`].
///
/// If `payload_hex` is `Some` and non-empty, it is used as the packet
/// body in preference to `raw_hex` (the RF driver sometimes delivers a
/// stripped inner frame alongside the full raw capture).
pub fn decode(raw_hex: &str, payload_hex: Option<&str>) -> Option<Packet> {
    match try_decode(raw_hex, payload_hex) {
        Ok(packet) => Some(packet),
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed packet");
            None
        }
    }
}

/// Same as [`decode`] but surfaces the reason for a rejection, for
/// callers (tests, the CLI) that want it instead of a bare `None`.
pub fn try_decode(raw_hex: &str, payload_hex: Option<&str>) -> Result<Packet, Error> {
    let canonical_hex = match payload_hex {
        Some(p) if !p.is_empty() => p,
        _ => raw_hex,
    };
    let bytes = parse_hex(canonical_hex)?;

    if bytes.len() < 2 {
        return Err(Error::FrameTooShort { len: bytes.len(), min: 2 });
    }

    let header_byte = bytes[0];
    let route_type = RouteType::from_bits(header_byte & 0b11);
    let payload_type = PayloadType::from_bits((header_byte >> 2) & 0b1111);
    let payload_version = PayloadVersion::from_bits((header_byte >> 6) & 0b11)
        .ok_or(Error::UnsupportedPayloadVersion((header_byte >> 6) & 0b11))?;

    let has_transport_codes = route_type.has_transport_codes();
    let mut offset = 1usize;
    let transport_codes = if has_transport_codes {
        if bytes.len() < offset + 4 {
            return Err(Error::PathOverrun {
                path_len: 0,
                buf_len: bytes.len(),
                offset,
            });
        }
        let mut codes = [0u8; 4];
        codes.copy_from_slice(&bytes[offset..offset + 4]);
        offset += 4;
        Some(codes)
    } else {
        None
    };

    if offset >= bytes.len() {
        return Err(Error::PathOverrun { path_len: 0, buf_len: bytes.len(), offset });
    }
    let path_len = bytes[offset];
    offset += 1;

    let path_len_usize = path_len as usize;
    if offset + path_len_usize > bytes.len() {
        return Err(Error::PathOverrun {
            path_len: path_len_usize,
            buf_len: bytes.len(),
            offset,
        });
    }
    let path_bytes = bytes[offset..offset + path_len_usize].to_vec();
    offset += path_len_usize;
    let payload_bytes = bytes[offset..].to_vec();

    let kind = match route_type {
        RouteType::Direct | RouteType::TransportDirect => Some(PathKind::RoutingInstructions),
        RouteType::Flood | RouteType::TransportFlood => Some(PathKind::HistoricalRoute),
    };
    let nodes = path_bytes.iter().map(|b| format!("{b:02x}")).collect();
    let path = PathInfo { kind, bytes: path_bytes, nodes };

    let (snr_readings, path_hashes) = if matches!(payload_type, PayloadType::Trace) {
        (trace_snr_readings(&path.bytes), trace_path_hashes(&payload_bytes))
    } else {
        (Vec::new(), Vec::new())
    };

    let packet = Packet {
        header_byte,
        route_type,
        payload_type,
        payload_version,
        has_transport_codes,
        transport_codes,
        path_len,
        path,
        payload_bytes,
        snr_readings,
        path_hashes,
    };

    debug_assert_eq!(packet.decoded_size(), bytes.len());
    Ok(packet)
}

/// Canonical bytes used for hashing are whichever buffer `decode` used
/// as the packet body — recomputed here so callers don't have to pass
/// them separately (spec.md §4.1 "Packet hash").
pub fn canonical_bytes(raw_hex: &str, payload_hex: Option<&str>) -> Result<Vec<u8>, Error> {
    let canonical_hex = match payload_hex {
        Some(p) if !p.is_empty() => p,
        _ => raw_hex,
    };
    parse_hex(canonical_hex)
}

/// Compute the echo-detection hash for a packet from the same inputs
/// given to [`decode`].
pub fn hash_for(payload_type: PayloadType, raw_hex: &str, payload_hex: Option<&str>) -> PacketHash {
    match canonical_bytes(raw_hex, payload_hex) {
        Ok(bytes) => packet_hash(payload_type, &bytes),
        Err(_) => PacketHash::UNKNOWN,
    }
}

fn parse_hex(s: &str) -> Result<Vec<u8>, Error> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if s.len() % 2 != 0 {
        return Err(Error::OddLengthHex { len: s.len() });
    }
    hex::decode(s).map_err(|_| Error::InvalidHex)
}

/// TRACE path bytes are per-hop SNR in signed quarter-dB units
/// (spec.md §3.2, §4.1): `(b - 256) / 4` if `b > 127`, else `b / 4`.
fn trace_snr_readings(path_bytes: &[u8]) -> Vec<f32> {
    path_bytes
        .iter()
        .map(|&b| {
            if b > 127 {
                (b as i32 - 256) as f32 / 4.0
            } else {
                b as f32 / 4.0
            }
        })
        .collect()
}

/// The real routing path for a TRACE packet lives inside the payload,
/// after a 9-byte tag/auth/flags preamble (spec.md §4.1, §9 "TRACE
/// parsing"). Bounds are validated before slicing; a short payload
/// yields an empty (not panicking) list.
fn trace_path_hashes(payload: &[u8]) -> Vec<String> {
    if payload.len() <= TRACE_PREAMBLE_LEN {
        if !payload.is_empty() {
            tracing::warn!(
                len = payload.len(),
                "TRACE payload shorter than the 9-byte tag/auth/flags preamble"
            );
        }
        return Vec::new();
    }
    payload[TRACE_PREAMBLE_LEN..].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(version: u8, payload_type: u8, route: u8) -> u8 {
        (version << 6) | ((payload_type & 0b1111) << 2) | (route & 0b11)
    }

    #[test]
    fn decodes_direct_text_message_with_no_path() {
        // header(ver=0, type=TXT_MSG=2, route=DIRECT=2), path_len=0, payload="ab"
        let h = header(0, 2, 2);
        let hex = format!("{h:02x}00ab");
        let p = try_decode(&hex, None).unwrap();
        assert_eq!(p.route_type, RouteType::Direct);
        assert_eq!(p.payload_type, PayloadType::TxtMsg);
        assert!(!p.has_transport_codes);
        assert_eq!(p.path_len, 0);
        assert!(p.path.nodes.is_empty());
        assert_eq!(p.payload_bytes, vec![0xab]);
        assert_eq!(p.decoded_size(), 3);
    }

    #[test]
    fn path_nodes_len_matches_path_len_invariant() {
        // route=FLOOD=1, path of 3 bytes
        let h = header(0, 2, 1);
        let hex = format!("{h:02x}03112233cafe");
        let p = try_decode(&hex, None).unwrap();
        assert_eq!(p.path.nodes.len(), p.path_len as usize);
        assert_eq!(p.path.nodes, vec!["11", "22", "33"]);
        assert_eq!(p.path.kind, Some(PathKind::HistoricalRoute));
    }

    #[test]
    fn transport_codes_present_for_transport_routes() {
        // route=TRANSPORT_DIRECT=3
        let h = header(0, 0, 3);
        let hex = format!("{h:02x}deadbeef00");
        let p = try_decode(&hex, None).unwrap();
        assert!(p.has_transport_codes);
        assert_eq!(p.transport_codes, Some([0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(p.path_len, 0);
    }

    #[test]
    fn rejects_unsupported_payload_version() {
        let h = header(1, 2, 2); // version bits = 1, unsupported
        let hex = format!("{h:02x}00");
        assert!(matches!(
            try_decode(&hex, None),
            Err(Error::UnsupportedPayloadVersion(1))
        ));
        assert!(decode(&hex, None).is_none());
    }

    #[test]
    fn rejects_path_len_overrunning_buffer() {
        let h = header(0, 2, 2);
        let hex = format!("{h:02x}05aa"); // claims 5 path bytes, only 1 byte left
        assert!(matches!(try_decode(&hex, None), Err(Error::PathOverrun { .. })));
    }

    #[test]
    fn rejects_too_short_frame() {
        assert!(matches!(try_decode("ab", None), Err(Error::FrameTooShort { .. })));
    }

    #[test]
    fn prefers_payload_hex_over_raw_hex() {
        let h = header(0, 2, 2);
        let raw = format!("{h:02x}00aa");
        let stripped = format!("{h:02x}00bb");
        let p = try_decode(&raw, Some(&stripped)).unwrap();
        assert_eq!(p.payload_bytes, vec![0xbb]);
    }

    #[test]
    fn strips_0x_prefix() {
        let h = header(0, 2, 2);
        let hex = format!("0x{h:02x}00aa");
        let p = try_decode(&hex, None).unwrap();
        assert_eq!(p.payload_bytes, vec![0xaa]);
    }

    #[test]
    fn trace_splits_snr_and_path_hashes() {
        // route=FLOOD, payload_type=TRACE=9, path of 2 bytes (SNR quarter-dB)
        let h = header(0, 9, 1);
        // path bytes: 0x04 -> 1.0 dB, 0xfc (252) -> (252-256)/4 = -1.0 dB
        // payload: 4-byte tag + 4-byte auth + 1-byte flags + 2 hash bytes
        let hex = format!("{h:02x}0204fc0000000000000000000a0b");
        let p = try_decode(&hex, None).unwrap();
        assert_eq!(p.snr_readings, vec![1.0, -1.0]);
        assert_eq!(p.path_hashes, vec!["0a".to_string(), "0b".to_string()]);
        // path.nodes is still populated (len == path_len), even though for
        // TRACE those bytes are SNR readings, not node prefixes.
        assert_eq!(p.path.nodes.len(), 2);
    }

    #[test]
    fn trace_with_short_payload_yields_empty_path_hashes() {
        let h = header(0, 9, 1);
        let hex = format!("{h:02x}0104" ); // 1 path byte, zero-length payload
        let p = try_decode(&hex, None).unwrap();
        assert_eq!(p.snr_readings, vec![1.0]);
        assert!(p.path_hashes.is_empty());
    }

    #[test]
    fn every_route_payload_type_combination_decodes_without_panicking() {
        for route in 0u8..4 {
            for ptype in 0u8..16 {
                let h = header(0, ptype, route);
                let hex = format!("{h:02x}00");
                let _ = try_decode(&hex, None);
            }
        }
    }
}
