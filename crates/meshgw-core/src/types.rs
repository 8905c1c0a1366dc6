//! Wire-format enumerations and decoded record types for the MeshCore v1
//! frame (spec.md §3, §6.2).

use serde::{Deserialize, Serialize};

/// Header low 2 bits (spec.md §3.1).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RouteType {
    TransportFlood = 0,
    Flood = 1,
    Direct = 2,
    TransportDirect = 3,
}

impl RouteType {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => RouteType::TransportFlood,
            1 => RouteType::Flood,
            2 => RouteType::Direct,
            3 => RouteType::TransportDirect,
            _ => unreachable!("bits & 0b11 is always in 0..=3"),
        }
    }

    /// Transport codes (four extra bytes after the header) are present
    /// iff the route type is one of the transport-carrying variants.
    pub fn has_transport_codes(self) -> bool {
        matches!(self, RouteType::TransportFlood | RouteType::TransportDirect)
    }

    /// Header low-2-bits encoding, the inverse of [`Self::from_bits`].
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Header bits 6-7. Only `Ver1` is accepted; anything else causes the
/// packet to be dropped (spec.md §3.1, §4.1).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadVersion {
    Ver1 = 0,
}

impl PayloadVersion {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0b11 {
            0 => Some(PayloadVersion::Ver1),
            _ => None,
        }
    }

    /// Header bits 6-7 encoding, the inverse of [`Self::from_bits`].
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Header bits 2-5 (spec.md §3.1).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PayloadType {
    Req,
    Response,
    TxtMsg,
    Ack,
    Advert,
    GrpTxt,
    GrpData,
    AnonReq,
    Path,
    Trace,
    Multipart,
    RawCustom,
    /// Reserved / unknown code, kept verbatim so callers can log it.
    Reserved(u8),
}

impl PayloadType {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b1111 {
            0 => PayloadType::Req,
            1 => PayloadType::Response,
            2 => PayloadType::TxtMsg,
            3 => PayloadType::Ack,
            4 => PayloadType::Advert,
            5 => PayloadType::GrpTxt,
            6 => PayloadType::GrpData,
            7 => PayloadType::AnonReq,
            8 => PayloadType::Path,
            9 => PayloadType::Trace,
            10 => PayloadType::Multipart,
            15 => PayloadType::RawCustom,
            other => PayloadType::Reserved(other),
        }
    }

    pub fn numeric(self) -> u8 {
        match self {
            PayloadType::Req => 0,
            PayloadType::Response => 1,
            PayloadType::TxtMsg => 2,
            PayloadType::Ack => 3,
            PayloadType::Advert => 4,
            PayloadType::GrpTxt => 5,
            PayloadType::GrpData => 6,
            PayloadType::AnonReq => 7,
            PayloadType::Path => 8,
            PayloadType::Trace => 9,
            PayloadType::Multipart => 10,
            PayloadType::RawCustom => 15,
            PayloadType::Reserved(b) => b,
        }
    }
}

/// Low 4 bits of an advert's first app-data byte (spec.md §3.1).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AdvertKind {
    Chat,
    Repeater,
    Room,
    Sensor,
    Unknown(u8),
}

impl AdvertKind {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b1111 {
            1 => AdvertKind::Chat,
            2 => AdvertKind::Repeater,
            3 => AdvertKind::Room,
            4 => AdvertKind::Sensor,
            other => AdvertKind::Unknown(other),
        }
    }
}

bitflags::bitflags! {
    /// High 4 bits of an advert's flags byte.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AdvertFeatureFlags: u8 {
        const LATLON = 0b0001_0000;
        const FEAT1  = 0b0010_0000;
        const FEAT2  = 0b0100_0000;
        const NAME   = 0b1000_0000;
    }
}

/// Whether a decoded path is a forward routing instruction (consumed
/// hop-by-hop) or a historical record of hops already taken
/// (spec.md §4.1 "Direct vs. flood semantics").
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PathKind {
    RoutingInstructions,
    HistoricalRoute,
}

/// A decoded path: the raw bytes plus the derived node-prefix strings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PathInfo {
    pub kind: Option<PathKind>,
    pub bytes: Vec<u8>,
    /// Two-hex-char node prefixes, one per path byte.
    pub nodes: Vec<String>,
}

impl PathInfo {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Comma-joined node prefixes, or an empty string for a bare/direct path.
    pub fn joined(&self) -> String {
        self.nodes.join(",")
    }
}

/// A fully decoded MeshCore v1 packet (spec.md §3.2).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Packet {
    pub header_byte: u8,
    pub route_type: RouteType,
    pub payload_type: PayloadType,
    pub payload_version: PayloadVersion,
    pub has_transport_codes: bool,
    pub transport_codes: Option<[u8; 4]>,
    pub path_len: u8,
    pub path: PathInfo,
    pub payload_bytes: Vec<u8>,
    /// TRACE only: per-hop SNR, one reading per path byte.
    pub snr_readings: Vec<f32>,
    /// TRACE only: the routing path recovered from inside the payload.
    pub path_hashes: Vec<String>,
}

impl Packet {
    /// `decoded_size` invariant from spec.md §3.2.
    pub fn decoded_size(&self) -> usize {
        1 + if self.has_transport_codes { 4 } else { 0 } + 1 + self.path.len() + self.payload_bytes.len()
    }
}

/// A decoded ADVERT payload (spec.md §3.3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Advert {
    pub public_key: [u8; 32],
    pub advert_time: u32,
    pub signature: [u8; 64],
    pub kind: AdvertKind,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub feat1: Option<u16>,
    pub feat2: Option<u16>,
    pub name: Option<String>,
    /// True iff `signature` verifies over `public_key || advert_time || app_data`.
    pub signature_valid: bool,
}

/// A stable echo-detection fingerprint. The all-zero hash means
/// "unknown / not applicable" (spec.md §4.1 "Packet hash").
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketHash(pub [u8; 8]);

impl PacketHash {
    pub const UNKNOWN: PacketHash = PacketHash([0u8; 8]);

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for PacketHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
