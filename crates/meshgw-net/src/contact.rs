//! The device's mutable contact table (spec.md §1, §4.3 "DM path").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A node's full 32-byte public key, hex-encoded for use as a map key
/// and log field.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub String);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        PublicKey(hex::encode(bytes))
    }

    /// The 2-hex-char node prefix used on the wire (spec.md glossary
    /// "Prefix").
    pub fn prefix(&self) -> String {
        self.0.get(0..2).unwrap_or(&self.0).to_string()
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device-side contact entry. `out_path`/`out_path_len` describe the
/// routing path the device currently uses to reach this contact
/// (spec.md §4.3 "DM path"): `out_path_len == 0` means direct,
/// `255` means unknown, otherwise it is a hop count with an explicit
/// path.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub public_key: PublicKey,
    pub name: String,
    pub out_path: Vec<u8>,
    pub out_path_len: u8,
}

impl Contact {
    /// Human-readable path label per spec.md §4.3.
    pub fn path_label(&self) -> String {
        match self.out_path_len {
            0 => "Direct".to_string(),
            255 => "unknown".to_string(),
            n => {
                let nodes: Vec<String> =
                    self.out_path.iter().take(n as usize).map(|b| format!("{b:02x}")).collect();
                format!("{} ({} hops)", nodes.join(","), n)
            }
        }
    }
}

/// The device's contact table, keyed by public key.
#[derive(Clone, Debug, Default)]
pub struct ContactTable {
    by_pubkey: HashMap<PublicKey, Contact>,
}

impl ContactTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, contact: Contact) {
        self.by_pubkey.insert(contact.public_key.clone(), contact);
    }

    pub fn get(&self, public_key: &PublicKey) -> Option<&Contact> {
        self.by_pubkey.get(public_key)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Contact> {
        self.by_pubkey.values().find(|c| c.name == name)
    }

    pub fn remove(&mut self, public_key: &PublicKey) -> Option<Contact> {
        self.by_pubkey.remove(public_key)
    }

    pub fn len(&self) -> usize {
        self.by_pubkey.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pubkey.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.by_pubkey.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_label_direct_when_zero() {
        let c = Contact {
            public_key: PublicKey("aa".repeat(32)),
            name: "Bob".into(),
            out_path: vec![],
            out_path_len: 0,
        };
        assert_eq!(c.path_label(), "Direct");
    }

    #[test]
    fn path_label_unknown_when_255() {
        let c = Contact {
            public_key: PublicKey("aa".repeat(32)),
            name: "Bob".into(),
            out_path: vec![],
            out_path_len: 255,
        };
        assert_eq!(c.path_label(), "unknown");
    }

    #[test]
    fn path_label_hop_count_with_nodes() {
        let c = Contact {
            public_key: PublicKey("aa".repeat(32)),
            name: "Bob".into(),
            out_path: vec![0x11, 0x22],
            out_path_len: 2,
        };
        assert_eq!(c.path_label(), "11,22 (2 hops)");
    }

    #[test]
    fn prefix_is_first_two_hex_chars() {
        let pk = PublicKey("deadbeef".to_string());
        assert_eq!(pk.prefix(), "de");
    }
}
