//! Rate limiters (spec.md §4.5): a global send floor, an async
//! bot-initiated-TX floor, a per-user cooldown capped at 1000 tracked
//! senders, and a Nominatim (reverse-geocoding) request floor.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time::sleep;

/// A minimum-interval floor between events, checked synchronously
/// (spec.md §4.5 "Global send limiter"). `try_acquire` never blocks —
/// callers that need to wait use [`AsyncFloor`] instead.
pub struct Floor {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Floor {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last: Mutex::new(None) }
    }

    /// Returns `true` and records `now` as the new high-water mark if
    /// at least `min_interval` has elapsed since the last acquisition.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        let ok = match *last {
            Some(prev) => now.duration_since(prev) >= self.min_interval,
            None => true,
        };
        if ok {
            *last = Some(now);
        }
        ok
    }

    /// How much longer the caller must wait before `try_acquire` would
    /// succeed, or `Duration::ZERO` if it would succeed now.
    pub fn remaining(&self, now: Instant) -> Duration {
        match *self.last.lock() {
            Some(prev) => {
                let elapsed = now.duration_since(prev);
                self.min_interval.checked_sub(elapsed).unwrap_or(Duration::ZERO)
            }
            None => Duration::ZERO,
        }
    }
}

/// The bot-initiated-TX limiter (spec.md §4.5 "Bot-TX limiter"): an
/// async-friendly floor that sleeps out the remainder instead of
/// refusing, since scheduled sends have nowhere else to go.
pub struct AsyncFloor {
    floor: Floor,
}

impl AsyncFloor {
    pub fn new(min_interval: Duration) -> Self {
        Self { floor: Floor::new(min_interval) }
    }

    pub async fn wait_turn(&self) {
        loop {
            let now = Instant::now();
            if self.floor.try_acquire(now) {
                return;
            }
            sleep(self.floor.remaining(now)).await;
        }
    }
}

/// A per-user cooldown limiter bounded to the `max_tracked` most
/// recently seen senders, evicting the least-recently-touched entry
/// when full (spec.md §4.5 "Per-user limiter", default cap 1000).
pub struct PerUserLimiter {
    min_interval: Duration,
    max_tracked: usize,
    last_seen: Mutex<HashMap<String, Instant>>,
    order: Mutex<VecDeque<String>>,
}

impl PerUserLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_capacity(min_interval, 1000)
    }

    pub fn with_capacity(min_interval: Duration, max_tracked: usize) -> Self {
        Self { min_interval, max_tracked, last_seen: Mutex::new(HashMap::new()), order: Mutex::new(VecDeque::new()) }
    }

    /// Returns `true` (and touches the sender's recency) if `sender` is
    /// allowed to act now.
    pub fn try_acquire(&self, sender: &str, now: Instant) -> bool {
        let mut last_seen = self.last_seen.lock();
        let allowed = match last_seen.get(sender) {
            Some(prev) => now.duration_since(*prev) >= self.min_interval,
            None => true,
        };
        if allowed {
            last_seen.insert(sender.to_string(), now);
            let mut order = self.order.lock();
            order.retain(|s| s != sender);
            order.push_back(sender.to_string());
            while order.len() > self.max_tracked {
                if let Some(evicted) = order.pop_front() {
                    last_seen.remove(&evicted);
                }
            }
        }
        allowed
    }

    pub fn tracked_count(&self) -> usize {
        self.last_seen.lock().len()
    }
}

/// Reverse-geocoding request floor (spec.md §4.5 "Nominatim limiter"):
/// never less than 1.1 s between requests, per Nominatim's usage
/// policy.
pub struct NominatimLimiter {
    floor: AsyncFloor,
}

impl NominatimLimiter {
    pub fn new() -> Self {
        Self { floor: AsyncFloor::new(Duration::from_millis(1100)) }
    }

    pub async fn wait_turn(&self) {
        self.floor.wait_turn().await;
    }
}

impl Default for NominatimLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_blocks_until_interval_elapses() {
        let floor = Floor::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(floor.try_acquire(t0));
        assert!(!floor.try_acquire(t0 + Duration::from_millis(50)));
        assert!(floor.try_acquire(t0 + Duration::from_millis(150)));
    }

    #[test]
    fn floor_remaining_counts_down_to_zero() {
        let floor = Floor::new(Duration::from_millis(100));
        let t0 = Instant::now();
        floor.try_acquire(t0);
        assert!(floor.remaining(t0 + Duration::from_millis(40)) > Duration::ZERO);
        assert_eq!(floor.remaining(t0 + Duration::from_millis(150)), Duration::ZERO);
    }

    #[test]
    fn per_user_limiter_is_independent_per_sender() {
        let limiter = PerUserLimiter::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(limiter.try_acquire("alice", t0));
        assert!(!limiter.try_acquire("alice", t0 + Duration::from_millis(10)));
        assert!(limiter.try_acquire("bob", t0 + Duration::from_millis(10)));
    }

    #[test]
    fn per_user_limiter_evicts_lru_past_capacity() {
        let limiter = PerUserLimiter::with_capacity(Duration::from_millis(1), 2);
        let t0 = Instant::now();
        assert!(limiter.try_acquire("a", t0));
        assert!(limiter.try_acquire("b", t0));
        assert!(limiter.try_acquire("c", t0));
        assert_eq!(limiter.tracked_count(), 2);
        // "a" was evicted, so it is treated as never-seen again.
        assert!(limiter.try_acquire("a", t0));
    }

    #[tokio::test]
    async fn async_floor_sleeps_out_the_remainder() {
        let floor = AsyncFloor::new(Duration::from_millis(20));
        let start = Instant::now();
        floor.wait_turn().await;
        floor.wait_turn().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
