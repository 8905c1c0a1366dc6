//! The transmission tracker (spec.md §4.6): fingerprints every
//! outbound send, correlates it against the RF-observed repeat of its
//! own packet, and drives the channel-message echo-check retry loop.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const DEFAULT_GC_AFTER: Duration = Duration::from_secs(300);

/// A pending send may only be confirmed by an inbound packet observed
/// within this window of the send (spec.md §3.5/§4.6 "30-second
/// matching window"); GC's 5-minute sweep is a separate, looser bound.
const PENDING_MATCH_WINDOW: Duration = Duration::from_secs(30);

/// One outbound send awaiting RF confirmation (spec.md §4.6
/// "pending -> confirmed").
#[derive(Clone, Debug)]
pub struct PendingTransmission {
    pub fingerprint: String,
    pub channel: Option<String>,
    pub content: String,
    pub sent_at: Instant,
    /// `floor(unix timestamp)` at send time — the correlation key
    /// before a packet hash is known.
    pub sent_timestamp: i64,
    pub packet_hash: Option<String>,
    pub confirmed: bool,
    pub repeat_hops: HashSet<String>,
}

/// Tracks our own sends so a later RF observation of the same packet
/// can be attributed back to the send that produced it, and repeats of
/// it by other repeaters counted (spec.md §4.6).
pub struct TxTracker {
    entries: Mutex<Vec<PendingTransmission>>,
    gc_after: Duration,
}

impl TxTracker {
    pub fn new() -> Self {
        Self::with_gc_after(DEFAULT_GC_AFTER)
    }

    pub fn with_gc_after(gc_after: Duration) -> Self {
        Self { entries: Mutex::new(Vec::new()), gc_after }
    }

    pub fn record_sent(&self, fingerprint: String, channel: Option<String>, content: String, sent_timestamp: i64, now: Instant) {
        self.entries.lock().push(PendingTransmission {
            fingerprint,
            channel,
            content,
            sent_at: now,
            sent_timestamp,
            packet_hash: None,
            confirmed: false,
            repeat_hops: HashSet::new(),
        });
    }

    /// Correlate an RF-observed packet hash against the most recent
    /// unconfirmed send in the same `floor(timestamp)` bucket sent
    /// within the last [`PENDING_MATCH_WINDOW`], or accumulate a repeat
    /// hop onto an already-confirmed one.
    pub fn confirm(&self, packet_hash: &str, sent_timestamp: i64, last_hop_prefix: Option<&str>, now: Instant) -> bool {
        let mut entries = self.entries.lock();
        if let Some(e) = entries.iter_mut().find(|e| e.packet_hash.as_deref() == Some(packet_hash)) {
            if let Some(prefix) = last_hop_prefix {
                e.repeat_hops.insert(prefix.to_string());
            }
            return true;
        }
        if let Some(e) = entries
            .iter_mut()
            .rev()
            .find(|e| !e.confirmed && e.sent_timestamp == sent_timestamp && now.duration_since(e.sent_at) <= PENDING_MATCH_WINDOW)
        {
            e.confirmed = true;
            e.packet_hash = Some(packet_hash.to_string());
            if let Some(prefix) = last_hop_prefix {
                e.repeat_hops.insert(prefix.to_string());
            }
            return true;
        }
        false
    }

    pub fn repeat_count(&self, packet_hash: &str) -> u32 {
        self.entries
            .lock()
            .iter()
            .find(|e| e.packet_hash.as_deref() == Some(packet_hash))
            .map(|e| e.repeat_hops.len() as u32)
            .unwrap_or(0)
    }

    pub fn is_confirmed(&self, packet_hash: &str) -> bool {
        self.entries.lock().iter().any(|e| e.packet_hash.as_deref() == Some(packet_hash) && e.confirmed)
    }

    /// Repeat count for a send identified by its own `fingerprint`
    /// (assigned at send time) rather than the RF-observed hash that
    /// later confirms it — used by the channel-message echo-check,
    /// which only knows the fingerprint it sent with (spec.md §4.6
    /// "Channel-message retry").
    pub fn repeat_count_by_fingerprint(&self, fingerprint: &str) -> u32 {
        self.entries.lock().iter().find(|e| e.fingerprint == fingerprint).map(|e| e.repeat_hops.len() as u32).unwrap_or(0)
    }

    pub fn is_confirmed_by_fingerprint(&self, fingerprint: &str) -> bool {
        self.entries.lock().iter().any(|e| e.fingerprint == fingerprint && e.confirmed)
    }

    /// Drop pending records past `gc_after` unconditionally, and
    /// confirmed records past `gc_after` only once they've stopped
    /// accumulating repeats (spec.md §3.5 "a confirmed record is
    /// retained while it still accumulates repeats").
    pub fn gc(&self, now: Instant) {
        self.entries.lock().retain(|e| {
            if now.duration_since(e.sent_at) < self.gc_after {
                return true;
            }
            e.confirmed && !e.repeat_hops.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TxTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
struct ChannelRetryEntry {
    sent_at: Instant,
    attempts: u32,
}

/// Channel-message echo-check retry loop (spec.md §4.6 "Channel
/// retry"): a channel send is expected to echo back to us over RF
/// within `echo_window`; if it doesn't, resend up to `max_attempts`
/// times before giving up.
pub struct ChannelRetryTracker {
    echo_window: Duration,
    max_attempts: u32,
    pending: Mutex<HashMap<String, ChannelRetryEntry>>,
}

impl ChannelRetryTracker {
    pub fn new(echo_window: Duration, max_attempts: u32) -> Self {
        Self { echo_window, max_attempts, pending: Mutex::new(HashMap::new()) }
    }

    pub fn record_send(&self, fingerprint: String, now: Instant) {
        self.pending.lock().insert(fingerprint, ChannelRetryEntry { sent_at: now, attempts: 1 });
    }

    /// Called when RF confirms our own channel message came back.
    /// Returns `true` if a pending send was cleared.
    pub fn observe_echo(&self, fingerprint: &str) -> bool {
        self.pending.lock().remove(fingerprint).is_some()
    }

    /// Fingerprints whose echo window has lapsed without a confirmed
    /// echo: returned entries have already had their attempt counter
    /// incremented and should be resent by the caller. Entries that
    /// have exhausted `max_attempts` are dropped silently.
    pub fn due_for_retry(&self, now: Instant) -> Vec<String> {
        let mut pending = self.pending.lock();
        let mut retry = Vec::new();
        let mut drop_keys = Vec::new();
        for (key, entry) in pending.iter_mut() {
            if now.duration_since(entry.sent_at) < self.echo_window {
                continue;
            }
            if entry.attempts >= self.max_attempts {
                drop_keys.push(key.clone());
            } else {
                entry.attempts += 1;
                entry.sent_at = now;
                retry.push(key.clone());
            }
        }
        for key in drop_keys {
            pending.remove(&key);
        }
        retry
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_attaches_hash_to_same_timestamp_bucket_send() {
        let tracker = TxTracker::new();
        let now = Instant::now();
        tracker.record_sent("fp1".into(), None, "hello".into(), 1000, now);
        assert!(tracker.confirm("hash-abc", 1000, Some("aa"), now));
        assert!(tracker.is_confirmed("hash-abc"));
    }

    #[test]
    fn confirm_refuses_a_match_outside_the_30s_window() {
        let tracker = TxTracker::new();
        let t0 = Instant::now();
        tracker.record_sent("fp1".into(), None, "hello".into(), 1000, t0);
        // same `floor(timestamp)` bucket, but the RF observation arrives
        // well past the 30s correlation window (spec.md §3.5/§4.6).
        assert!(!tracker.confirm("hash-abc", 1000, Some("aa"), t0 + Duration::from_secs(31)));
        assert!(!tracker.is_confirmed("hash-abc"));
    }

    #[test]
    fn repeat_count_accumulates_distinct_last_hop_prefixes() {
        let tracker = TxTracker::new();
        let now = Instant::now();
        tracker.record_sent("fp1".into(), None, "hello".into(), 1000, now);
        tracker.confirm("hash-abc", 1000, Some("aa"), now);
        tracker.confirm("hash-abc", 1000, Some("bb"), now);
        tracker.confirm("hash-abc", 1000, Some("aa"), now);
        assert_eq!(tracker.repeat_count("hash-abc"), 2);
    }

    #[test]
    fn gc_drops_entries_older_than_window() {
        let tracker = TxTracker::with_gc_after(Duration::from_millis(10));
        let t0 = Instant::now();
        tracker.record_sent("fp1".into(), None, "hello".into(), 1000, t0);
        tracker.gc(t0 + Duration::from_millis(50));
        assert!(tracker.is_empty());
    }

    #[test]
    fn gc_retains_confirmed_entries_still_accumulating_repeats() {
        let tracker = TxTracker::with_gc_after(Duration::from_millis(10));
        let t0 = Instant::now();
        tracker.record_sent("fp1".into(), None, "hello".into(), 1000, t0);
        tracker.confirm("hash-abc", 1000, Some("aa"), t0);
        tracker.gc(t0 + Duration::from_millis(50));
        assert!(!tracker.is_empty());
        assert_eq!(tracker.repeat_count("hash-abc"), 1);
    }

    #[test]
    fn channel_retry_clears_on_echo() {
        let tracker = ChannelRetryTracker::new(Duration::from_millis(10), 3);
        let t0 = Instant::now();
        tracker.record_send("chan:hello".into(), t0);
        assert!(tracker.observe_echo("chan:hello"));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn channel_retry_retries_then_gives_up() {
        let tracker = ChannelRetryTracker::new(Duration::from_millis(10), 2);
        let t0 = Instant::now();
        tracker.record_send("chan:hello".into(), t0);
        let retry_at = t0 + Duration::from_millis(20);
        assert_eq!(tracker.due_for_retry(retry_at), vec!["chan:hello".to_string()]);
        let give_up_at = retry_at + Duration::from_millis(20);
        assert_eq!(tracker.due_for_retry(give_up_at), Vec::<String>::new());
        assert_eq!(tracker.pending_count(), 0);
    }
}
