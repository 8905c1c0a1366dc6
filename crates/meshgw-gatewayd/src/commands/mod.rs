//! The plugin registration protocol (spec.md §4.4.1): the `Command`
//! trait every dispatchable plugin implements, plus the shared
//! `Cooldown` bookkeeping helper plugins compose into their state.

pub mod help;
pub mod ping;
pub mod registry;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::message::MeshMessage;

/// Per-command cooldown state: a global floor plus an optional
/// per-user floor (spec.md §4.4 "Cooldown").
pub struct Cooldown {
    global_interval: Duration,
    per_user_interval: Option<Duration>,
    last_global: Mutex<Option<Instant>>,
    last_per_user: Mutex<HashMap<String, Instant>>,
    last_trigger: Mutex<Option<(Option<String>, Instant)>>,
}

impl Cooldown {
    pub fn new(global_interval: Duration, per_user_interval: Option<Duration>) -> Self {
        Self {
            global_interval,
            per_user_interval,
            last_global: Mutex::new(None),
            last_per_user: Mutex::new(HashMap::new()),
            last_trigger: Mutex::new(None),
        }
    }

    /// No cooldown at all — used by system-only commands like `ping`.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, None)
    }

    /// `(ok, remaining_seconds)`: `ok` is true only if neither the
    /// global nor (when present) the per-user floor is still pending.
    pub fn check(&self, user_id: Option<&str>, now: Instant) -> (bool, f64) {
        let mut remaining = 0.0_f64;
        if let Some(prev) = *self.last_global.lock() {
            let elapsed = now.duration_since(prev);
            if elapsed < self.global_interval {
                remaining = remaining.max((self.global_interval - elapsed).as_secs_f64());
            }
        }
        if let (Some(interval), Some(uid)) = (self.per_user_interval, user_id) {
            if let Some(prev) = self.last_per_user.lock().get(uid) {
                let elapsed = now.duration_since(*prev);
                if elapsed < interval {
                    remaining = remaining.max((interval - elapsed).as_secs_f64());
                }
            }
        }
        (remaining <= 0.0, remaining)
    }

    pub fn record(&self, user_id: Option<&str>, now: Instant) {
        *self.last_global.lock() = Some(now);
        *self.last_trigger.lock() = Some((user_id.map(str::to_string), now));
        if let Some(uid) = user_id {
            self.last_per_user.lock().insert(uid.to_string(), now);
        }
    }

    /// Whether the same `user_id` was the one that most recently fired
    /// this command's global cooldown, within `window` (spec.md §4.4.2
    /// "the asker did not themselves fire it in the last 3 s").
    pub fn triggered_by_same_user_within(&self, user_id: Option<&str>, window: Duration, now: Instant) -> bool {
        match (&*self.last_trigger.lock(), user_id) {
            (Some((Some(last_uid), at)), Some(uid)) => last_uid == uid && now.duration_since(*at) <= window,
            _ => false,
        }
    }
}

/// One dispatchable unit of behavior (spec.md §4.4.1).
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;
    fn keywords(&self) -> &[&str] {
        &[]
    }
    fn category(&self) -> &str {
        "general"
    }
    fn description(&self) -> &str;
    fn short_description(&self) -> Option<&str> {
        None
    }
    fn usage(&self) -> Option<&str> {
        None
    }
    fn requires_admin_access(&self) -> bool {
        false
    }
    fn requires_dm(&self) -> bool {
        false
    }
    fn requires_internet(&self) -> bool {
        false
    }
    fn is_channel_allowed(&self, _channel: &str) -> bool {
        true
    }
    /// Default: a case-insensitive match against `keywords()`, exact or
    /// prefix-then-space (spec.md §4.4 "Matching order").
    fn should_execute(&self, message: &MeshMessage) -> bool {
        let lower = message.content.trim().to_ascii_lowercase();
        self.keywords().iter().any(|k| lower == *k || lower.starts_with(&format!("{k} ")))
    }
    fn can_execute(&self, _message: &MeshMessage) -> bool {
        true
    }
    fn cooldown(&self) -> &Cooldown;
    fn get_queue_threshold_seconds(&self) -> f64 {
        2.0
    }
    async fn execute(&self, message: &MeshMessage) -> bool;
    /// A synchronous reply template; `None` means the plugin already
    /// sent its own response(s) from within `execute`.
    fn get_response_format(&self, _message: &MeshMessage) -> Option<String> {
        None
    }
    fn get_help_text(&self) -> String {
        self.description().to_string()
    }
}
