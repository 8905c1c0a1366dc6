//! Outbound MeshCore v1 frame encoding (spec.md §6.2).
//!
//! The decode side lives in `meshgw_core::decode`; this module is its
//! mirror for packets the gateway itself originates (adverts, ACKs,
//! channel/DM sends handed to the radio driver's `send_*` commands).
//! Wire shape: `header(1) | [transport(4) if transport route] |
//! path_len(1) | path(path_len) | payload(variable)`, header bits
//! `[ver:2][type:4][route:2]`.

use meshgw_core::{PayloadType, PayloadVersion, RouteType};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("path too long: {0} bytes (max 255)")]
    PathTooLong(usize),
    #[error("transport codes required for route type {0:?} but none given")]
    MissingTransportCodes(RouteType),
    #[error("transport codes given for route type {0:?} which doesn't carry them")]
    UnexpectedTransportCodes(RouteType),
}

/// A packet ready to hand to the radio driver's raw-send primitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundFrame {
    pub route_type: RouteType,
    pub payload_type: PayloadType,
    pub transport_codes: Option<[u8; 4]>,
    pub path: Vec<u8>,
    pub payload: Vec<u8>,
}

impl OutboundFrame {
    pub fn new(route_type: RouteType, payload_type: PayloadType, path: Vec<u8>, payload: Vec<u8>) -> Self {
        Self { route_type, payload_type, transport_codes: None, path, payload }
    }

    pub fn with_transport_codes(mut self, codes: [u8; 4]) -> Self {
        self.transport_codes = Some(codes);
        self
    }

    /// Encode to a raw byte buffer. Does not hex-encode — callers pass
    /// the result through `hex::encode` for driver APIs that take hex
    /// strings, or send the bytes directly for APIs that take bytes.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        if self.path.len() > u8::MAX as usize {
            return Err(FrameError::PathTooLong(self.path.len()));
        }
        let wants_transport = self.route_type.has_transport_codes();
        match (wants_transport, self.transport_codes) {
            (true, None) => return Err(FrameError::MissingTransportCodes(self.route_type)),
            (false, Some(_)) => return Err(FrameError::UnexpectedTransportCodes(self.route_type)),
            _ => {}
        }

        let header = ((PayloadVersion::Ver1.bits()) << 6)
            | ((self.payload_type.numeric() & 0b1111) << 2)
            | (self.route_type.bits() & 0b11);

        let mut out = Vec::with_capacity(
            1 + self.transport_codes.map_or(0, |_| 4) + 1 + self.path.len() + self.payload.len(),
        );
        out.push(header);
        if let Some(codes) = self.transport_codes {
            out.extend_from_slice(&codes);
        }
        out.push(self.path.len() as u8);
        out.extend_from_slice(&self.path);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn encode_hex(&self) -> Result<String, FrameError> {
        self.encode().map(|bytes| hex::encode(bytes))
    }
}
