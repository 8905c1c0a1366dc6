//! The persistent relational store (spec.md §1 "Persistent store",
//! §6.4 "Persisted state"). A single SQLite database by default,
//! behind one connection guarded by a mutex — the DB manager is the
//! single writer of record (spec.md §5 "Shared-resource policy");
//! callers hold it only for the duration of one call, with an implicit
//! 30 s busy timeout (spec.md §5 "Timeouts").
//!
//! Table semantics are named here; nothing about SQLite itself is part
//! of the contract (spec.md §1 names it only as "relational,
//! SQLite-class").

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// The single-writer SQLite-backed store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Run a closure with exclusive access to the connection
    /// (spec.md §1 "execute_query"/"execute_update" DB-manager surface).
    pub fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R>,
    {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    // ---- complete_contact_tracking (spec.md §3.6) ----

    pub fn upsert_contact(&self, row: &ContactRow) -> Result<()> {
        self.with_conn(|conn| {
            let existing_role: Option<String> = conn
                .query_row(
                    "SELECT role FROM complete_contact_tracking WHERE public_key = ?1",
                    params![row.public_key],
                    |r| r.get(0),
                )
                .optional()?;

            let role = match existing_role {
                // role never downgrades from repeater-class to companion (spec.md §3.6).
                Some(existing) if existing != "companion" && row.role == "companion" => existing,
                _ => row.role.clone(),
            };

            conn.execute(
                "INSERT INTO complete_contact_tracking
                    (public_key, name, role, first_heard, last_heard, last_advert_timestamp,
                     latitude, longitude, city, state, country, is_starred)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)
                 ON CONFLICT(public_key) DO UPDATE SET
                    name = excluded.name,
                    role = ?3,
                    last_heard = MAX(last_heard, excluded.last_heard),
                    last_advert_timestamp = COALESCE(MAX(last_advert_timestamp, excluded.last_advert_timestamp), last_advert_timestamp, excluded.last_advert_timestamp),
                    latitude = COALESCE(excluded.latitude, latitude),
                    longitude = COALESCE(excluded.longitude, longitude),
                    city = COALESCE(excluded.city, city),
                    state = COALESCE(excluded.state, state),
                    country = COALESCE(excluded.country, country)",
                params![
                    row.public_key,
                    row.name,
                    role,
                    row.last_heard,
                    row.last_advert_timestamp,
                    row.latitude,
                    row.longitude,
                    row.city,
                    row.state,
                    row.country,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_contact(&self, public_key: &str) -> Result<Option<ContactRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT public_key, name, role, first_heard, last_heard, last_advert_timestamp,
                        latitude, longitude, city, state, country, is_starred
                 FROM complete_contact_tracking WHERE public_key = ?1",
                params![public_key],
                ContactRow::from_row,
            )
            .optional()
        })
    }

    pub fn contacts_by_prefix(&self, prefix: &str) -> Result<Vec<ContactRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT public_key, name, role, first_heard, last_heard, last_advert_timestamp,
                        latitude, longitude, city, state, country, is_starred
                 FROM complete_contact_tracking WHERE public_key LIKE ?1 || '%'",
            )?;
            let rows = stmt.query_map(params![prefix], ContactRow::from_row)?;
            rows.collect()
        })
    }

    pub fn contact_counts(&self, now: i64) -> Result<ContactCounts> {
        self.with_conn(|conn| {
            let total_contacts: i64 = conn.query_row("SELECT COUNT(*) FROM complete_contact_tracking", [], |r| r.get(0))?;
            let total_repeaters: i64 = conn.query_row(
                "SELECT COUNT(*) FROM complete_contact_tracking WHERE role IN ('repeater','roomserver')",
                [],
                |r| r.get(0),
            )?;
            let total_companions: i64 = conn.query_row(
                "SELECT COUNT(*) FROM complete_contact_tracking WHERE role = 'companion'",
                [],
                |r| r.get(0),
            )?;
            let active_24h: i64 = conn.query_row(
                "SELECT COUNT(*) FROM complete_contact_tracking WHERE last_heard >= ?1",
                params![now - 86_400],
                |r| r.get(0),
            )?;
            let new_companions_7d: i64 = conn.query_row(
                "SELECT COUNT(*) FROM complete_contact_tracking WHERE role = 'companion' AND first_heard >= ?1",
                params![now - 7 * 86_400],
                |r| r.get(0),
            )?;
            let active_30d: i64 = conn.query_row(
                "SELECT COUNT(*) FROM complete_contact_tracking WHERE last_heard >= ?1",
                params![now - 30 * 86_400],
                |r| r.get(0),
            )?;
            Ok(ContactCounts {
                total_contacts,
                total_repeaters,
                total_companions,
                active_24h,
                new_companions_7d,
                active_30d,
            })
        })
    }

    // ---- observed_paths (spec.md §3.7) ----

    pub fn record_observed_path(&self, p: &ObservedPath) -> Result<()> {
        self.with_conn(|conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM observed_paths
                     WHERE public_key IS ?1 AND from_prefix IS ?2 AND to_prefix IS ?3
                       AND path_hex = ?4 AND packet_type = ?5",
                    params![p.public_key, p.from_prefix, p.to_prefix, p.path_hex, p.packet_type],
                    |r| r.get(0),
                )
                .optional()?;
            match existing {
                Some(id) => {
                    conn.execute(
                        "UPDATE observed_paths SET last_seen = ?1, observation_count = observation_count + 1 WHERE id = ?2",
                        params![p.last_seen, id],
                    )?;
                }
                None => {
                    conn.execute(
                        "INSERT INTO observed_paths
                            (public_key, packet_hash, from_prefix, to_prefix, path_hex, path_length,
                             packet_type, first_seen, last_seen, observation_count)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 1)",
                        params![
                            p.public_key,
                            p.packet_hash,
                            p.from_prefix,
                            p.to_prefix,
                            p.path_hex,
                            p.path_length,
                            p.packet_type,
                            p.last_seen,
                        ],
                    )?;
                }
            }
            Ok(())
        })
    }

    pub fn observed_path_count(&self, public_key: &str, path_hex: &str, packet_type: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT observation_count FROM observed_paths
                 WHERE public_key IS ?1 AND path_hex = ?2 AND packet_type = ?3",
                params![public_key, path_hex, packet_type],
                |r| r.get(0),
            )
            .optional()
            .map(|v| v.unwrap_or(0))
        })
    }

    /// Same as [`Self::observed_path_count`] but for the
    /// `public_key IS NULL` rows messages/traces are keyed by (spec.md
    /// §3.7).
    pub fn observed_message_path_count(&self, from_prefix: &str, to_prefix: &str, path_hex: &str, packet_type: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT observation_count FROM observed_paths
                 WHERE public_key IS NULL AND from_prefix IS ?1 AND to_prefix IS ?2
                   AND path_hex = ?3 AND packet_type = ?4",
                params![from_prefix, to_prefix, path_hex, packet_type],
                |r| r.get(0),
            )
            .optional()
            .map(|v| v.unwrap_or(0))
        })
    }

    // ---- mesh_edges (spec.md §3.8 mesh graph) ----

    pub fn upsert_edge(&self, e: &MeshEdge) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mesh_edges
                    (from_prefix, to_prefix, hop_position, geographic_distance_km,
                     from_public_key, to_public_key, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(from_prefix, to_prefix) DO UPDATE SET
                    hop_position = excluded.hop_position,
                    geographic_distance_km = COALESCE(excluded.geographic_distance_km, geographic_distance_km),
                    from_public_key = COALESCE(excluded.from_public_key, from_public_key),
                    to_public_key = COALESCE(excluded.to_public_key, to_public_key),
                    last_seen = excluded.last_seen",
                params![
                    e.from_prefix,
                    e.to_prefix,
                    e.hop_position,
                    e.geographic_distance_km,
                    e.from_public_key,
                    e.to_public_key,
                    e.last_seen,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_edge(&self, from_prefix: &str, to_prefix: &str) -> Result<Option<MeshEdge>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT from_prefix, to_prefix, hop_position, geographic_distance_km,
                        from_public_key, to_public_key, last_seen
                 FROM mesh_edges WHERE from_prefix = ?1 AND to_prefix = ?2",
                params![from_prefix, to_prefix],
                MeshEdge::from_row,
            )
            .optional()
        })
    }

    pub fn prune_edges_older_than(&self, cutoff: i64) -> Result<usize> {
        self.with_conn(|conn| conn.execute("DELETE FROM mesh_edges WHERE last_seen < ?1", params![cutoff]))
    }

    pub fn all_edges(&self) -> Result<Vec<MeshEdge>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT from_prefix, to_prefix, hop_position, geographic_distance_km,
                        from_public_key, to_public_key, last_seen FROM mesh_edges",
            )?;
            let rows = stmt.query_map([], MeshEdge::from_row)?;
            rows.collect()
        })
    }

    // ---- command_stats / message_stats (spec.md §6.4) ----

    pub fn record_command_stat(&self, command_name: &str, sender_id: &str, timestamp: i64, is_dm: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO command_stats (command_name, sender_id, timestamp, is_dm) VALUES (?1, ?2, ?3, ?4)",
                params![command_name, sender_id, timestamp, is_dm],
            )?;
            Ok(())
        })
    }

    pub fn record_message_stat(&self, sender_id: &str, timestamp: i64, is_dm: bool, channel: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message_stats (timestamp, sender_id, is_dm, channel) VALUES (?1, ?2, ?3, ?4)",
                params![timestamp, sender_id, is_dm, channel],
            )?;
            Ok(())
        })
    }

    /// Command names ordered by historical popularity, for the `help`
    /// command's general listing (SPEC_FULL.md §A.6).
    pub fn command_popularity(&self) -> Result<Vec<(String, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT command_name, COUNT(*) as n FROM command_stats GROUP BY command_name ORDER BY n DESC",
            )?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
            rows.collect()
        })
    }

    // ---- packet_stream (spec.md §6.4, §6.5 capture hooks) ----

    pub fn append_packet_stream(&self, timestamp: i64, data_json: &str, kind: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO packet_stream (timestamp, data_json, type) VALUES (?1, ?2, ?3)",
                params![timestamp, data_json, kind],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn find_packet_stream_row_by_command_id(&self, command_id: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id FROM packet_stream WHERE type = 'command'
                   AND json_extract(data_json, '$.command_id') = ?1
                 ORDER BY id DESC LIMIT 1",
                params![command_id],
                |r| r.get(0),
            )
            .optional()
        })
    }

    pub fn update_packet_stream_row(&self, id: i64, data_json: &str, timestamp: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE packet_stream SET data_json = ?1, timestamp = ?2 WHERE id = ?3",
                params![data_json, timestamp, id],
            )?;
            Ok(())
        })
    }

    // ---- channel_operations (spec.md §4.9) ----

    pub fn enqueue_channel_operation(&self, op: &ChannelOperation) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channel_operations (type, channel_idx, channel_name, channel_key_hex, status)
                 VALUES (?1, ?2, ?3, ?4, 'pending')",
                params![op.kind, op.channel_idx, op.channel_name, op.channel_key_hex],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn pending_channel_operations(&self) -> Result<Vec<(i64, ChannelOperation)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, type, channel_idx, channel_name, channel_key_hex FROM channel_operations
                 WHERE status = 'pending'",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    ChannelOperation {
                        kind: r.get(1)?,
                        channel_idx: r.get(2)?,
                        channel_name: r.get(3)?,
                        channel_key_hex: r.get(4)?,
                    },
                ))
            })?;
            rows.collect()
        })
    }

    pub fn complete_channel_operation(&self, id: i64, success: bool, result: &str) -> Result<()> {
        self.with_conn(|conn| {
            let status = if success { "completed" } else { "failed" };
            conn.execute(
                "UPDATE channel_operations SET status = ?1, result = ?2 WHERE id = ?3",
                params![status, result, id],
            )?;
            Ok(())
        })
    }

    // ---- purging_log (spec.md §6.4) ----

    pub fn log_purge(&self, action: &str, details: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO purging_log (action, details, timestamp) VALUES (?1, ?2, ?3)", params![action, details, now_unix()])?;
            Ok(())
        })
    }

    // ---- key/value health table (spec.md §6.4) ----

    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
    }

    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |r| r.get(0))
                .optional()
        })
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContactRow {
    pub public_key: String,
    pub name: String,
    pub role: String,
    pub first_heard: i64,
    pub last_heard: i64,
    pub last_advert_timestamp: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub is_starred: bool,
}

impl ContactRow {
    fn from_row(r: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            public_key: r.get(0)?,
            name: r.get(1)?,
            role: r.get(2)?,
            first_heard: r.get(3)?,
            last_heard: r.get(4)?,
            last_advert_timestamp: r.get(5)?,
            latitude: r.get(6)?,
            longitude: r.get(7)?,
            city: r.get(8)?,
            state: r.get(9)?,
            country: r.get(10)?,
            is_starred: r.get(11)?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContactCounts {
    pub total_contacts: i64,
    pub total_repeaters: i64,
    pub total_companions: i64,
    pub active_24h: i64,
    pub new_companions_7d: i64,
    pub active_30d: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObservedPath {
    pub public_key: Option<String>,
    pub packet_hash: Option<String>,
    pub from_prefix: Option<String>,
    pub to_prefix: Option<String>,
    pub path_hex: String,
    pub path_length: i64,
    /// `advert` | `message` | `trace`.
    pub packet_type: String,
    pub last_seen: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeshEdge {
    pub from_prefix: String,
    pub to_prefix: String,
    pub hop_position: i64,
    pub geographic_distance_km: Option<f64>,
    pub from_public_key: Option<String>,
    pub to_public_key: Option<String>,
    pub last_seen: i64,
}

impl MeshEdge {
    fn from_row(r: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            from_prefix: r.get(0)?,
            to_prefix: r.get(1)?,
            hop_position: r.get(2)?,
            geographic_distance_km: r.get(3)?,
            from_public_key: r.get(4)?,
            to_public_key: r.get(5)?,
            last_seen: r.get(6)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelOperation {
    /// `add` | `remove`.
    pub kind: String,
    pub channel_idx: Option<i64>,
    pub channel_name: String,
    pub channel_key_hex: Option<String>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS complete_contact_tracking (
    public_key TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    role TEXT NOT NULL,
    first_heard INTEGER NOT NULL,
    last_heard INTEGER NOT NULL,
    last_advert_timestamp INTEGER,
    latitude REAL,
    longitude REAL,
    city TEXT,
    state TEXT,
    country TEXT,
    is_starred INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS observed_paths (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    public_key TEXT,
    packet_hash TEXT,
    from_prefix TEXT,
    to_prefix TEXT,
    path_hex TEXT NOT NULL,
    path_length INTEGER NOT NULL,
    packet_type TEXT NOT NULL,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    observation_count INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS mesh_edges (
    from_prefix TEXT NOT NULL,
    to_prefix TEXT NOT NULL,
    hop_position INTEGER NOT NULL,
    geographic_distance_km REAL,
    from_public_key TEXT,
    to_public_key TEXT,
    last_seen INTEGER NOT NULL,
    PRIMARY KEY (from_prefix, to_prefix)
);

CREATE TABLE IF NOT EXISTS command_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    command_name TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    is_dm INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS message_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    sender_id TEXT NOT NULL,
    is_dm INTEGER NOT NULL,
    channel TEXT
);

CREATE TABLE IF NOT EXISTS packet_stream (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    data_json TEXT NOT NULL,
    type TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_packet_stream_timestamp ON packet_stream(timestamp);
CREATE INDEX IF NOT EXISTS idx_packet_stream_type ON packet_stream(type);

CREATE TABLE IF NOT EXISTS channel_operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    channel_idx INTEGER,
    channel_name TEXT NOT NULL,
    channel_key_hex TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    result TEXT
);

CREATE TABLE IF NOT EXISTS purging_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    action TEXT NOT NULL,
    details TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(public_key: &str, role: &str, t: i64) -> ContactRow {
        ContactRow {
            public_key: public_key.to_string(),
            name: "Node".to_string(),
            role: role.to_string(),
            first_heard: t,
            last_heard: t,
            last_advert_timestamp: Some(t),
            latitude: None,
            longitude: None,
            city: None,
            state: None,
            country: None,
            is_starred: false,
        }
    }

    #[test]
    fn upsert_contact_is_idempotent_per_public_key() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_contact(&contact("aa11", "repeater", 100)).unwrap();
        store.upsert_contact(&contact("aa11", "repeater", 200)).unwrap();
        let counts = store.contact_counts(1_000_000).unwrap();
        assert_eq!(counts.total_contacts, 1);
    }

    #[test]
    fn role_never_downgrades_from_repeater_to_companion() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_contact(&contact("bb22", "repeater", 100)).unwrap();
        store.upsert_contact(&contact("bb22", "companion", 200)).unwrap();
        let row = store.get_contact("bb22").unwrap().unwrap();
        assert_eq!(row.role, "repeater");
    }

    #[test]
    fn observed_path_reobservation_increments_count() {
        let store = Store::open_in_memory().unwrap();
        let p = ObservedPath {
            public_key: Some("aa11".to_string()),
            packet_hash: None,
            from_prefix: None,
            to_prefix: None,
            path_hex: "1122".to_string(),
            path_length: 2,
            packet_type: "advert".to_string(),
            last_seen: 100,
        };
        for t in [100, 200, 300] {
            store.record_observed_path(&ObservedPath { last_seen: t, ..p.clone() }).unwrap();
        }
        assert_eq!(store.observed_path_count("aa11", "1122", "advert").unwrap(), 3);
    }

    #[test]
    fn edges_prune_by_age() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_edge(&MeshEdge {
                from_prefix: "11".into(),
                to_prefix: "22".into(),
                hop_position: 1,
                geographic_distance_km: None,
                from_public_key: None,
                to_public_key: None,
                last_seen: 100,
            })
            .unwrap();
        assert_eq!(store.prune_edges_older_than(50).unwrap(), 0);
        assert_eq!(store.prune_edges_older_than(150).unwrap(), 1);
        assert!(store.get_edge("11", "22").unwrap().is_none());
    }

    #[test]
    fn packet_stream_row_found_by_command_id() {
        let store = Store::open_in_memory().unwrap();
        store
            .append_packet_stream(100, r#"{"command_id":"abc","repeat_count":0}"#, "command")
            .unwrap();
        let id = store.find_packet_stream_row_by_command_id("abc").unwrap();
        assert!(id.is_some());
    }
}
