//! Packet hashing (spec.md §4.1 "Packet hash", §9 "Packet hashing
//! portability").
//!
//! The hash must be stable across observations of the same logical
//! packet on different paths, and a 64-bit hash is deemed safe by the
//! spec ("16 bits would not be; 64 bits is safe"). BLAKE3 is used
//! throughout this workspace for content hashing, so it is reused here
//! rather than introducing a second hash primitive.

use crate::types::{PacketHash, PayloadType};

/// `first 8 bytes, hex-encoded, of BLAKE3(payload_type_numeric ||
/// canonical_packet_bytes)`.
pub fn packet_hash(payload_type: PayloadType, canonical_bytes: &[u8]) -> PacketHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[payload_type.numeric()]);
    hasher.update(canonical_bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest.as_bytes()[..8]);
    PacketHash(out)
}
