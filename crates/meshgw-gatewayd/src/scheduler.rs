//! The scheduler and service supervisor (spec.md §4.9): scheduled
//! `HHMM` broadcast messages, interval adverts, health-polled service
//! restarts, and the cadence constants the channel-ops/feed pollers run
//! at (spec.md §5 "Suspension points"/"Timeouts").

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

/// §5 "Scheduled-message run" timeout.
pub const SCHEDULED_MESSAGE_RUN_TIMEOUT: Duration = Duration::from_secs(60);
/// §4.9 "Channel ops queue ... polled every 5s".
pub const CHANNEL_OPS_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// §4.9 "Feed polling ... at most once per 60s".
pub const FEED_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// §4.9 "Every 30s the main loop polls health".
pub const SERVICE_HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// §4.9 "unless a restart was attempted within `service_restart_backoff_seconds` (default 300s)".
pub const DEFAULT_SERVICE_RESTART_BACKOFF: Duration = Duration::from_secs(300);
/// §5 "Cache sweep period: 60 s" — the tx tracker GC and mesh graph
/// pruning ride the same cadence as the RF cache's own resize sweep.
pub const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// How often the main loop checks whether a new minute has ticked over
/// for `[Scheduled_Messages]` firing. Finer than a minute so a slow
/// wake-up never skips a boundary.
pub const SCHEDULED_MESSAGE_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Exactly 4 ASCII digits, `HHMM` — no colons, no seconds (spec.md §9
/// "the scheduler's `is_valid_time_format` accepts exactly 4 digits").
pub fn is_valid_time_format(s: &str) -> bool {
    s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a validated `HHMM` string into `(hour, minute)`. Returns
/// `None` for an out-of-range hour/minute even if the shape is valid.
pub fn parse_hhmm(s: &str) -> Option<(u8, u8)> {
    if !is_valid_time_format(s) {
        return None;
    }
    let hour: u8 = s[0..2].parse().ok()?;
    let minute: u8 = s[2..4].parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// One `[Scheduled_Messages] HHMM = channel:text` entry, already split
/// into its channel/text halves (spec.md §4.9).
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledMessage {
    pub hour: u8,
    pub minute: u8,
    pub channel: String,
    pub text: String,
}

impl ScheduledMessage {
    /// Parse a raw `(HHMM, "channel:text")` config pair. Entries with a
    /// malformed time or missing `channel:` separator are skipped by
    /// the caller rather than aborting startup.
    pub fn parse(hhmm: &str, value: &str) -> Option<Self> {
        let (hour, minute) = parse_hhmm(hhmm)?;
        let (channel, text) = value.split_once(':')?;
        Some(Self { hour, minute, channel: channel.trim().to_string(), text: text.trim().to_string() })
    }
}

/// Builds the set of `ScheduledMessage`s due for a given `(hour,
/// minute)`, and tracks which minutes have already fired this run so a
/// slow tick doesn't double-send (spec.md §4.9).
pub struct ScheduledMessageTable {
    entries: Vec<ScheduledMessage>,
    last_fired_minute: Mutex<Option<(u8, u8)>>,
}

impl ScheduledMessageTable {
    pub fn from_config(raw: &HashMap<String, String>) -> Self {
        let entries = raw.iter().filter_map(|(k, v)| ScheduledMessage::parse(k, v)).collect();
        Self { entries, last_fired_minute: Mutex::new(None) }
    }

    /// Entries due at `(hour, minute)`, or empty if that exact minute
    /// already fired.
    pub fn due_at(&self, hour: u8, minute: u8) -> Vec<&ScheduledMessage> {
        let mut last = self.last_fired_minute.lock();
        if *last == Some((hour, minute)) {
            return Vec::new();
        }
        *last = Some((hour, minute));
        self.entries.iter().filter(|e| e.hour == hour && e.minute == minute).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One loaded service plugin's lifecycle (spec.md §4.9 "Service
/// health"; §9 "Service{start, stop, is_healthy, enabled?}").
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&self) -> Result<(), anyhow::Error>;
    async fn stop(&self) -> Result<(), anyhow::Error>;
    fn is_healthy(&self) -> bool;
    fn enabled(&self) -> bool {
        true
    }
}

/// Polls registered services' health and decides which ones are due
/// for a restart, respecting `service_restart_backoff_seconds` per
/// service (spec.md §4.9). Restart execution (async `stop` then
/// `start`) is the caller's responsibility so restarts can run
/// concurrently without blocking the poll.
pub struct ServiceSupervisor {
    backoff: Duration,
    last_restart_attempt: Mutex<HashMap<String, Instant>>,
}

impl ServiceSupervisor {
    pub fn new() -> Self {
        Self::with_backoff(DEFAULT_SERVICE_RESTART_BACKOFF)
    }

    pub fn with_backoff(backoff: Duration) -> Self {
        Self { backoff, last_restart_attempt: Mutex::new(HashMap::new()) }
    }

    /// Names of services that are unhealthy and not within their
    /// restart backoff window. Marks each returned name as
    /// restart-attempted at `now`.
    pub fn due_for_restart<'a>(&self, services: &'a [std::sync::Arc<dyn Service>], now: Instant) -> Vec<std::sync::Arc<dyn Service>> {
        let mut attempts = self.last_restart_attempt.lock();
        let mut due = Vec::new();
        for service in services {
            if !service.enabled() || service.is_healthy() {
                continue;
            }
            let within_backoff = attempts.get(service.name()).is_some_and(|last| now.duration_since(*last) < self.backoff);
            if within_backoff {
                continue;
            }
            attempts.insert(service.name().to_string(), now);
            due.push(service.clone());
        }
        due
    }
}

impl Default for ServiceSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// A polled feed subscription. "each feed decides internally whether
/// it is due" (spec.md §4.9) — the supervisor only enforces the outer
/// at-most-once-per-`FEED_POLL_INTERVAL` cadence; feed content is a
/// non-goal.
pub trait Feed: Send + Sync {
    fn name(&self) -> &str;
    fn poll_if_due(&self, now: Instant);
}
