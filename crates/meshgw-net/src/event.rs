//! The radio driver's typed event bus (spec.md §1 "Radio driver").
//!
//! The driver itself is an external collaborator (firmware command
//! codec, serial/BLE/TCP transport) whose internals are out of scope;
//! this module only names the shape of the events it publishes so the
//! gateway daemon's message handler and RF correlator can subscribe to
//! them.

use serde::{Deserialize, Serialize};

use crate::contact::PublicKey;

/// One entry from the device's RX log: raw bytes plus RF metadata, with
/// no higher-level decoding performed by the driver (spec.md §3.9,
/// §4.2).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RxLogEntry {
    pub raw_hex: String,
    /// Present when the driver was able to strip an inner frame (e.g.
    /// decrypted channel payload) from the raw capture.
    pub payload_hex: Option<String>,
    pub snr: f32,
    pub rssi: i32,
    pub pubkey_prefix: Option<String>,
}

/// A direct-message event from a known contact.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContactMsgRecv {
    pub sender_name: String,
    pub sender_pubkey: Option<PublicKey>,
    pub content: String,
    pub sender_timestamp: i64,
    pub raw_hex: Option<String>,
}

/// A channel (group) message event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChannelMsgRecv {
    pub channel: String,
    /// Raw text, often still in `"SENDER: message"` form (spec.md §4.3
    /// "Sender normalization").
    pub content: String,
    pub sender_timestamp: i64,
    pub raw_hex: String,
    pub payload_hex: Option<String>,
}

/// A freshly-discovered contact, surfaced by the device firmware
/// (spec.md §4.8 "On every advert and every NEW_CONTACT event").
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NewContactEvent {
    pub public_key: PublicKey,
    pub name: String,
}

/// The typed events published by the radio driver's event bus
/// (spec.md §1).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum RadioEvent {
    ContactMsgRecv(ContactMsgRecv),
    ChannelMsgRecv(ChannelMsgRecv),
    RxLogData(RxLogEntry),
    /// An undecoded raw frame, offered to the decoder directly.
    RawData { raw_hex: String },
    NewContact(NewContactEvent),
}
