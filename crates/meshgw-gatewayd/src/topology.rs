//! The topology learner (spec.md §3.8, §4.7): builds the mesh graph
//! from observed hop paths, attributing a public key to a hop prefix
//! only when that attribution is unambiguous.

use crate::store::{MeshEdge, ObservedPath, Store, StoreError};

const DEFAULT_RECENCY_WINDOW_SECS: i64 = 7 * 86_400;

/// Learns directed, weighted edges between hop prefixes (spec.md §3.8)
/// and resolves prefixes to public keys only within a recency window,
/// and only when the prefix is unique among recently-heard contacts
/// (spec.md §4.7 "never resolve collisions into wrong attribution").
pub struct Topology<'a> {
    store: &'a Store,
    recency_window_secs: i64,
}

impl<'a> Topology<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self::with_recency_window(store, DEFAULT_RECENCY_WINDOW_SECS)
    }

    pub fn with_recency_window(store: &'a Store, recency_window_secs: i64) -> Self {
        Self { store, recency_window_secs }
    }

    /// Resolve a two-hex-char hop prefix to a public key, or `None` if
    /// zero or more than one contact sharing that prefix was heard
    /// within the recency window.
    pub fn resolve_prefix(&self, prefix: &str, now: i64) -> Result<Option<String>, StoreError> {
        let candidates = self.store.contacts_by_prefix(prefix)?;
        let mut recent = candidates.into_iter().filter(|c| now - c.last_heard <= self.recency_window_secs);
        let first = recent.next();
        match (first, recent.next()) {
            (Some(only), None) => Ok(Some(only.public_key)),
            _ => Ok(None),
        }
    }

    /// Record every edge implied by an ordered hop path (spec.md §3.8):
    /// one edge per adjacent pair, attributed where unambiguous.
    pub fn observe_path(&self, path_prefixes: &[String], now: i64) -> Result<(), StoreError> {
        for (position, pair) in path_prefixes.windows(2).enumerate() {
            let (from_prefix, to_prefix) = (&pair[0], &pair[1]);
            let from_public_key = self.resolve_prefix(from_prefix, now)?;
            let to_public_key = self.resolve_prefix(to_prefix, now)?;
            self.store.upsert_edge(&MeshEdge {
                from_prefix: from_prefix.clone(),
                to_prefix: to_prefix.clone(),
                hop_position: position as i64,
                geographic_distance_km: None,
                from_public_key,
                to_public_key,
                last_seen: now,
            })?;
        }
        Ok(())
    }

    /// Drop edges not refreshed within the recency window (spec.md §3.8
    /// "Mesh graph pruning").
    pub fn prune_stale(&self, now: i64) -> Result<usize, StoreError> {
        self.store.prune_edges_older_than(now - self.recency_window_secs)
    }

    /// Record one `observed_paths` row for an entire ingested path
    /// (spec.md §3.7), deduplicated by `(public_key, path_hex,
    /// packet_type)` for adverts (`public_key = Some`) or by
    /// `(from_prefix, to_prefix, path_hex, packet_type, NULL)` for
    /// messages/traces (`public_key = None`).
    pub fn record_observed_path(
        &self,
        public_key: Option<&str>,
        path_prefixes: &[String],
        packet_type: &str,
        now: i64,
    ) -> Result<(), StoreError> {
        let path_hex: String = path_prefixes.concat();
        let (from_prefix, to_prefix) = match public_key {
            Some(_) => (None, None),
            None => (path_prefixes.first().cloned(), path_prefixes.last().cloned()),
        };
        self.store.record_observed_path(&ObservedPath {
            public_key: public_key.map(str::to_string),
            packet_hash: None,
            from_prefix,
            to_prefix,
            path_hex,
            path_length: path_prefixes.len() as i64,
            packet_type: packet_type.to_string(),
            last_seen: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ContactRow;

    fn contact(public_key: &str, last_heard: i64) -> ContactRow {
        ContactRow {
            public_key: public_key.to_string(),
            name: "Node".to_string(),
            role: "repeater".to_string(),
            first_heard: last_heard,
            last_heard,
            last_advert_timestamp: Some(last_heard),
            latitude: None,
            longitude: None,
            city: None,
            state: None,
            country: None,
            is_starred: false,
        }
    }

    #[test]
    fn resolves_unique_prefix_to_public_key() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_contact(&contact("aa1122334455", 1000)).unwrap();
        let topo = Topology::new(&store);
        assert_eq!(topo.resolve_prefix("aa11", 1000).unwrap(), Some("aa1122334455".to_string()));
    }

    #[test]
    fn refuses_to_resolve_ambiguous_prefix() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_contact(&contact("aa1111111111", 1000)).unwrap();
        store.upsert_contact(&contact("aa1199999999", 1000)).unwrap();
        let topo = Topology::new(&store);
        assert_eq!(topo.resolve_prefix("aa11", 1000).unwrap(), None);
    }

    #[test]
    fn refuses_stale_contact_outside_recency_window() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_contact(&contact("aa1122334455", 0)).unwrap();
        let topo = Topology::with_recency_window(&store, 100);
        assert_eq!(topo.resolve_prefix("aa11", 1000).unwrap(), None);
    }

    #[test]
    fn observe_path_writes_one_edge_per_adjacent_hop() {
        let store = Store::open_in_memory().unwrap();
        let topo = Topology::new(&store);
        let path = vec!["aa".to_string(), "bb".to_string(), "cc".to_string()];
        topo.observe_path(&path, 1000).unwrap();
        assert!(store.get_edge("aa", "bb").unwrap().is_some());
        assert!(store.get_edge("bb", "cc").unwrap().is_some());
        assert!(store.get_edge("aa", "cc").unwrap().is_none());
    }

    #[test]
    fn prune_stale_removes_edges_outside_window() {
        let store = Store::open_in_memory().unwrap();
        let topo = Topology::with_recency_window(&store, 100);
        topo.observe_path(&["aa".to_string(), "bb".to_string()], 0).unwrap();
        assert_eq!(topo.prune_stale(1000).unwrap(), 1);
    }

    #[test]
    fn re_observing_the_same_advert_path_increments_observation_count() {
        let store = Store::open_in_memory().unwrap();
        let topo = Topology::new(&store);
        let path = vec!["aa".to_string(), "bb".to_string()];
        for t in [100, 200, 300] {
            topo.record_observed_path(Some("pubkey1"), &path, "advert", t).unwrap();
        }
        assert_eq!(store.observed_path_count("pubkey1", "aabb", "advert").unwrap(), 3);
    }

    #[test]
    fn message_paths_are_keyed_without_a_public_key() {
        let store = Store::open_in_memory().unwrap();
        let topo = Topology::new(&store);
        let path = vec!["aa".to_string(), "bb".to_string(), "cc".to_string()];
        topo.record_observed_path(None, &path, "message", 100).unwrap();
        topo.record_observed_path(None, &path, "message", 200).unwrap();
        assert_eq!(store.observed_message_path_count("aa", "cc", "aabbcc", "message").unwrap(), 2);
    }
}
