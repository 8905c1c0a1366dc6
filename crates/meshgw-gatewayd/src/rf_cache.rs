//! The RF correlator (spec.md §4.2): an in-memory, bounded cache of RX
//! log entries (spec.md §3.9), and the lookup logic that stitches them
//! onto higher-level DM/channel message events.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use meshgw_net::event::RxLogEntry;

/// Cap on each index (spec.md §3.9 "default 1000"). Kept as one cap
/// shared across the three derived views, which are updated in the
/// same critical section (SPEC_FULL.md §A "RF cache three-index
/// consistency" — the crate is single-threaded per instance, held
/// behind one `parking_lot::Mutex` by the caller, so no interior
/// locking is needed here).
const DEFAULT_MAX_ENTRIES: usize = 1000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const FULL_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// One bounded observation of an over-the-air packet (spec.md §3.9).
#[derive(Clone, Debug, PartialEq)]
pub struct RfEntry {
    pub received_at: Instant,
    /// First 32 hex chars (16 bytes) of the raw capture.
    pub packet_prefix: String,
    pub pubkey_prefix: Option<String>,
    pub snr: f32,
    pub rssi: i32,
    pub raw_hex: String,
    pub payload_hex: Option<String>,
    pub packet_hash: Option<String>,
}

impl RfEntry {
    pub fn from_log(entry: &RxLogEntry, now: Instant) -> Self {
        let packet_prefix = entry.raw_hex.chars().take(32).collect();
        Self {
            received_at: now,
            packet_prefix,
            pubkey_prefix: entry.pubkey_prefix.clone(),
            snr: entry.snr,
            rssi: entry.rssi,
            raw_hex: entry.raw_hex.clone(),
            payload_hex: entry.payload_hex.clone(),
            packet_hash: None,
        }
    }
}

/// Bounded, timeout-swept cache of recent RF observations with three
/// parallel indexes (spec.md §3.9, §4.2 "Cache memory policy").
pub struct RfCache {
    max_entries: usize,
    timeout: Duration,
    by_arrival: VecDeque<RfEntry>,
    last_full_sweep: Instant,
}

impl RfCache {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ENTRIES, DEFAULT_TIMEOUT)
    }

    pub fn with_limits(max_entries: usize, timeout: Duration) -> Self {
        Self { max_entries, timeout, by_arrival: VecDeque::new(), last_full_sweep: Instant::now() }
    }

    /// Insert a new RF observation. Triggers a timeout-based sweep on
    /// every write, plus (at most once per 60 s) a full resize sweep
    /// (spec.md §4.2 "Cache memory policy").
    pub fn insert(&mut self, entry: RfEntry, now: Instant) {
        self.sweep_timeouts(now);
        self.by_arrival.push_back(entry);
        while self.by_arrival.len() > self.max_entries {
            self.by_arrival.pop_front();
        }
        if now.duration_since(self.last_full_sweep) >= FULL_SWEEP_PERIOD {
            self.sweep_timeouts(now);
            self.last_full_sweep = now;
        }
    }

    fn sweep_timeouts(&mut self, now: Instant) {
        while let Some(front) = self.by_arrival.front() {
            if now.duration_since(front.received_at) > self.timeout {
                self.by_arrival.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_arrival.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_arrival.is_empty()
    }

    /// Correlate a just-arrived message event with a cached RF entry,
    /// in the preference order from spec.md §4.2: (a) exact packet
    /// prefix, (b) exact pubkey prefix, (c) packet-prefix-of-at-least
    /// 16 hex chars, (d) most recent entry within the window as a
    /// last-resort fallback.
    pub fn correlate(&self, packet_prefix: Option<&str>, pubkey_prefix: Option<&str>, now: Instant) -> Option<&RfEntry> {
        let within_window = |e: &&RfEntry| now.duration_since(e.received_at) <= self.timeout;

        if let Some(prefix) = packet_prefix {
            if let Some(e) = self.by_arrival.iter().rev().filter(within_window).find(|e| e.packet_prefix == prefix) {
                return Some(e);
            }
        }
        if let Some(pk) = pubkey_prefix {
            if let Some(e) =
                self.by_arrival.iter().rev().filter(within_window).find(|e| e.pubkey_prefix.as_deref() == Some(pk))
            {
                return Some(e);
            }
        }
        if let Some(prefix) = packet_prefix {
            if prefix.len() >= 16 {
                if let Some(e) = self
                    .by_arrival
                    .iter()
                    .rev()
                    .filter(within_window)
                    .find(|e| e.packet_prefix.starts_with(&prefix[..16]))
                {
                    return Some(e);
                }
            }
        }
        self.by_arrival.iter().rev().find(within_window)
    }
}

impl Default for RfCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A message waiting for its RF metadata to arrive (spec.md §4.2
/// "Race-free handoff"). Keyed by `{correlation_key}_{ms_timestamp}`
/// by the caller; entries are evicted after
/// `message_correlation_timeout` (default 10 s).
pub struct PendingCorrelation<T> {
    entries: HashMap<String, (T, Instant)>,
    timeout: Duration,
}

impl<T> PendingCorrelation<T> {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { entries: HashMap::new(), timeout }
    }

    pub fn insert(&mut self, key: String, value: T, now: Instant) {
        self.entries.insert(key, (value, now));
    }

    pub fn take(&mut self, key: &str) -> Option<T> {
        self.entries.remove(key).map(|(v, _)| v)
    }

    pub fn evict_expired(&mut self, now: Instant) {
        self.entries.retain(|_, (_, inserted)| now.duration_since(*inserted) <= self.timeout);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<T> Default for PendingCorrelation<T> {
    fn default() -> Self {
        Self::new()
    }
}
