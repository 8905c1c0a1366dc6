//! Advert payload parsing and Ed25519 signature verification
//! (spec.md §3.3, §4.1 "Advert parse").

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::error::Error;
use crate::types::{Advert, AdvertFeatureFlags, AdvertKind};

const FIXED_HEADER_LEN: usize = 32 + 4 + 64; // pubkey + timestamp + signature
const MIN_ADVERT_LEN: usize = 101;

/// Parse an ADVERT packet's app-data payload.
///
/// Requires `payload.len() >= 101` (spec.md §3.3 "Validation"). Beyond
/// the fixed header, the optional app-data fields are walked in a
/// fixed order (lat/lon, feat1, feat2, name); parsing stops the moment
/// the buffer is exhausted rather than panicking, per spec.md §4.1
/// "Parsing must be strictly bounded".
pub fn parse(payload: &[u8]) -> Result<Advert, Error> {
    if payload.len() < MIN_ADVERT_LEN {
        return Err(Error::AdvertTooShort { len: payload.len() });
    }

    let mut public_key = [0u8; 32];
    public_key.copy_from_slice(&payload[0..32]);
    let advert_time = u32::from_le_bytes(payload[32..36].try_into().unwrap());
    let mut signature = [0u8; 64];
    signature.copy_from_slice(&payload[36..100]);
    let app_data = &payload[FIXED_HEADER_LEN..];

    let flags_byte = app_data[0];
    let kind = AdvertKind::from_bits(flags_byte);
    let features = AdvertFeatureFlags::from_bits_truncate(flags_byte);

    let mut cursor = 1usize;
    let mut lat = None;
    let mut lon = None;
    let mut feat1 = None;
    let mut feat2 = None;
    let mut name = None;

    if features.contains(AdvertFeatureFlags::LATLON) {
        if cursor + 8 <= app_data.len() {
            let lat_raw = i32::from_le_bytes(app_data[cursor..cursor + 4].try_into().unwrap());
            let lon_raw =
                i32::from_le_bytes(app_data[cursor + 4..cursor + 8].try_into().unwrap());
            lat = Some(lat_raw as f64 * 1e-6);
            lon = Some(lon_raw as f64 * 1e-6);
            cursor += 8;
        } else {
            tracing::warn!("advert app-data truncated before lat/lon field");
        }
    }
    if features.contains(AdvertFeatureFlags::FEAT1) {
        if cursor + 2 <= app_data.len() {
            feat1 = Some(u16::from_le_bytes(app_data[cursor..cursor + 2].try_into().unwrap()));
            cursor += 2;
        } else {
            tracing::warn!("advert app-data truncated before feat1 field");
        }
    }
    if features.contains(AdvertFeatureFlags::FEAT2) {
        if cursor + 2 <= app_data.len() {
            feat2 = Some(u16::from_le_bytes(app_data[cursor..cursor + 2].try_into().unwrap()));
            cursor += 2;
        } else {
            tracing::warn!("advert app-data truncated before feat2 field");
        }
    }
    if features.contains(AdvertFeatureFlags::NAME) {
        if cursor < app_data.len() {
            let raw = &app_data[cursor..];
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            name = Some(String::from_utf8_lossy(&raw[..end]).into_owned());
        } else {
            tracing::warn!("advert app-data truncated before name field");
        }
    }

    let signature_valid = verify(&public_key, advert_time, app_data, &signature);

    Ok(Advert {
        public_key,
        advert_time,
        signature,
        kind,
        lat,
        lon,
        feat1,
        feat2,
        name,
        signature_valid,
    })
}

/// Verify `signature` is a valid Ed25519 signature by `public_key` over
/// `public_key || advert_time (LE) || app_data` (spec.md §3.3).
pub fn verify(public_key: &[u8; 32], advert_time: u32, app_data: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let sig = Signature::from_bytes(signature);
    let mut message = Vec::with_capacity(32 + 4 + app_data.len());
    message.extend_from_slice(public_key);
    message.extend_from_slice(&advert_time.to_le_bytes());
    message.extend_from_slice(app_data);
    verifying_key.verify(&message, &sig).is_ok()
}
