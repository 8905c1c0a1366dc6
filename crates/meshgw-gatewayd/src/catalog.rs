//! The repeater/contact catalog (spec.md §3.6): one row per public key
//! ever heard, derived from adverts and promoted to the bot's device
//! contact list according to the configured auto-manage policy.

use meshgw_core::types::AdvertKind;

use crate::config::AutoManageContacts;
use crate::store::{ContactRow, Store, StoreError};

/// Canonical role string for a decoded advert kind (spec.md §3.6). A
/// role once recorded as repeater-class (`repeater`/`roomserver`)
/// never downgrades to `companion` — enforced in [`Store::upsert_contact`].
pub fn role_for_advert_kind(kind: AdvertKind) -> &'static str {
    match kind {
        AdvertKind::Repeater => "repeater",
        AdvertKind::Room => "roomserver",
        AdvertKind::Sensor => "sensor",
        AdvertKind::Chat | AdvertKind::Unknown(_) => "companion",
    }
}

/// A single heard advert, normalized for catalog ingestion.
pub struct AdvertObservation<'a> {
    pub public_key: &'a str,
    pub name: &'a str,
    pub kind: AdvertKind,
    pub timestamp: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Thin wrapper over [`Store`]'s contact table giving the catalog's
/// domain verbs (spec.md §3.6, §4.8 "Auto-manage contacts").
pub struct Catalog<'a> {
    store: &'a Store,
}

impl<'a> Catalog<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn observe_advert(&self, obs: &AdvertObservation) -> Result<(), StoreError> {
        let existing = self.store.get_contact(obs.public_key)?;
        let first_heard = existing.as_ref().map(|c| c.first_heard).unwrap_or(obs.timestamp);
        self.store.upsert_contact(&ContactRow {
            public_key: obs.public_key.to_string(),
            name: obs.name.to_string(),
            role: role_for_advert_kind(obs.kind).to_string(),
            first_heard,
            last_heard: obs.timestamp,
            last_advert_timestamp: Some(obs.timestamp),
            latitude: obs.latitude,
            longitude: obs.longitude,
            city: existing.as_ref().and_then(|c| c.city.clone()),
            state: existing.as_ref().and_then(|c| c.state.clone()),
            country: existing.as_ref().and_then(|c| c.country.clone()),
            is_starred: existing.map(|c| c.is_starred).unwrap_or(false),
        })
    }

    pub fn lookup(&self, public_key: &str) -> Result<Option<ContactRow>, StoreError> {
        self.store.get_contact(public_key)
    }

    pub fn counts(&self, now: i64) -> Result<crate::store::ContactCounts, StoreError> {
        self.store.contact_counts(now)
    }

    /// Whether this bot instance should push newly-heard contacts onto
    /// the radio device's own contact list itself, versus relying on
    /// the device's firmware (`Device`) or requiring an operator to add
    /// them by hand (`Manual`) (spec.md §4.8).
    pub fn should_auto_add_to_device(&self, policy: AutoManageContacts) -> bool {
        matches!(policy, AutoManageContacts::Bot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeater_and_room_are_repeater_class() {
        assert_eq!(role_for_advert_kind(AdvertKind::Repeater), "repeater");
        assert_eq!(role_for_advert_kind(AdvertKind::Room), "roomserver");
    }

    #[test]
    fn chat_and_unknown_are_companion() {
        assert_eq!(role_for_advert_kind(AdvertKind::Chat), "companion");
        assert_eq!(role_for_advert_kind(AdvertKind::Unknown(9)), "companion");
    }

    #[test]
    fn observe_advert_preserves_first_heard_across_updates() {
        let store = Store::open_in_memory().unwrap();
        let catalog = Catalog::new(&store);
        catalog
            .observe_advert(&AdvertObservation {
                public_key: "aa11",
                name: "Node A",
                kind: AdvertKind::Repeater,
                timestamp: 100,
                latitude: None,
                longitude: None,
            })
            .unwrap();
        catalog
            .observe_advert(&AdvertObservation {
                public_key: "aa11",
                name: "Node A",
                kind: AdvertKind::Repeater,
                timestamp: 200,
                latitude: Some(1.0),
                longitude: Some(2.0),
            })
            .unwrap();
        let row = catalog.lookup("aa11").unwrap().unwrap();
        assert_eq!(row.first_heard, 100);
        assert_eq!(row.last_heard, 200);
        assert_eq!(row.latitude, Some(1.0));
    }

    #[test]
    fn auto_add_only_true_under_bot_policy() {
        let store = Store::open_in_memory().unwrap();
        let catalog = Catalog::new(&store);
        assert!(!catalog.should_auto_add_to_device(AutoManageContacts::Device));
        assert!(catalog.should_auto_add_to_device(AutoManageContacts::Bot));
        assert!(!catalog.should_auto_add_to_device(AutoManageContacts::Manual));
    }
}
