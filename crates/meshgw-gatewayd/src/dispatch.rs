//! The command dispatcher (spec.md §4.4): decides which plugin (or
//! plain keyword) answers a [`MeshMessage`], runs the per-command gate
//! chain, and owns the cooldown queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::commands::Command;
use crate::message::MeshMessage;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("channel message referenced unknown channel index for command {command}")]
    UnknownChannel { command: String },
}

/// The legacy prefix accepted even when `[Bot] command_prefix` is empty
/// (spec.md §4.4 "backward compatibility").
const LEGACY_PREFIX: char = '!';

/// How the dispatcher resolved a trigger, before gates are evaluated.
pub enum Matched {
    /// `None` = general help, `Some(name)` = targeted help.
    Help(Option<String>),
    Plugin(Arc<dyn Command>),
    /// A plain `[Keywords]` entry; payload is its unformatted template.
    Keyword(String),
}

/// Outcome of running a matched plugin through the per-command gate
/// chain (spec.md §4.4 "Per-command gates"). Each variant corresponds
/// to the gate that decided the message's fate.
#[derive(Debug, PartialEq)]
pub enum GateOutcome {
    Proceed,
    Queued,
    CooldownReply { remaining_seconds: f64 },
    DmOnlyReply,
    Ignored,
    AccessDenied,
    NoInternet,
}

struct QueuedEntry {
    message: MeshMessage,
    #[allow(dead_code)]
    queued_at: Instant,
    expires_at: Instant,
}

/// The dispatcher: owns the registered plugins, the `[Keywords]`
/// table, and the cooldown queue (spec.md §4.4.2).
pub struct Dispatcher {
    commands: Vec<Arc<dyn Command>>,
    keywords: HashMap<String, String>,
    queue: Mutex<HashMap<(String, String), QueuedEntry>>,
}

impl Dispatcher {
    pub fn new(commands: Vec<Arc<dyn Command>>, keywords: HashMap<String, String>) -> Self {
        Self { commands, keywords, queue: Mutex::new(HashMap::new()) }
    }

    pub fn commands(&self) -> &[Arc<dyn Command>] {
        &self.commands
    }

    fn strip_prefix<'a>(&self, content: &'a str, command_prefix: &str) -> Option<&'a str> {
        if !command_prefix.is_empty() {
            content.strip_prefix(command_prefix)
        } else {
            content.strip_prefix(LEGACY_PREFIX)
        }
    }

    /// Match a message against help, plugins, then plain keywords, in
    /// that order (spec.md §4.4 "Matching order"). `channel_keywords`,
    /// when non-empty, restricts which triggers are honored on
    /// channels; DMs are always unaffected.
    pub fn match_message(
        &self,
        message: &MeshMessage,
        command_prefix: &str,
        channel_keywords: &[String],
    ) -> Option<Matched> {
        let body = self.strip_prefix(&message.content, command_prefix)?;
        let trimmed = body.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower == "help" || lower.starts_with("help ") {
            let target = lower.strip_prefix("help").unwrap().trim();
            return Some(Matched::Help(if target.is_empty() { None } else { Some(target.to_string()) }));
        }

        let channel_restricted = message.channel.is_some() && !channel_keywords.is_empty();

        for cmd in &self.commands {
            if !cmd.should_execute(message) {
                continue;
            }
            if channel_restricted && !channel_keywords.iter().any(|k| k.eq_ignore_ascii_case(cmd.name())) {
                continue;
            }
            return Some(Matched::Plugin(cmd.clone()));
        }

        for (keyword, template) in &self.keywords {
            let kw_lower = keyword.to_ascii_lowercase();
            if channel_restricted && !channel_keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
                continue;
            }
            if lower == kw_lower || lower.starts_with(&format!("{kw_lower} ")) {
                return Some(Matched::Keyword(template.clone()));
            }
        }

        None
    }

    /// Run the per-command gate chain (spec.md §4.4 "Per-command
    /// gates"), evaluated in order — the first failing gate decides the
    /// outcome.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_gates(
        &self,
        cmd: &dyn Command,
        message: &MeshMessage,
        admin_pubkeys: &[String],
        is_internet_reachable: bool,
        now: Instant,
    ) -> GateOutcome {
        if !cmd.should_execute(message) || !cmd.can_execute(message) {
            return GateOutcome::Ignored;
        }

        let user_id = if message.is_dm { Some(message.sender_id.as_str()) } else { None };
        let (cooldown_ok, remaining) = cmd.cooldown().check(user_id, now);
        if !cooldown_ok {
            let queue_threshold = cmd.get_queue_threshold_seconds();
            let same_user_recently = cmd.cooldown().triggered_by_same_user_within(user_id, Duration::from_secs(3), now);
            if remaining <= queue_threshold && !same_user_recently {
                return GateOutcome::Queued;
            }
            return GateOutcome::CooldownReply { remaining_seconds: remaining };
        }

        if cmd.requires_dm() && !message.is_dm {
            return match &message.channel {
                Some(channel) if cmd.is_channel_allowed(channel) => GateOutcome::DmOnlyReply,
                _ => GateOutcome::Ignored,
            };
        }

        if cmd.requires_admin_access() {
            let is_admin = message
                .sender_pubkey
                .as_ref()
                .is_some_and(|pk| admin_pubkeys.iter().any(|a| a == &pk.0));
            if !is_admin {
                return GateOutcome::AccessDenied;
            }
        }

        if cmd.requires_internet() && !is_internet_reachable {
            return GateOutcome::NoInternet;
        }

        GateOutcome::Proceed
    }

    /// Enqueue a command execution deferred past its global cooldown
    /// (spec.md §4.4.2): at most one queued entry per `(command,
    /// user_key)` pair. Returns `false` if one is already queued.
    pub fn try_enqueue(
        &self,
        command_name: &str,
        user_key: &str,
        message: MeshMessage,
        now: Instant,
        expires_in: Duration,
    ) -> bool {
        let mut queue = self.queue.lock();
        let key = (command_name.to_string(), user_key.to_string());
        if queue.contains_key(&key) {
            return false;
        }
        queue.insert(key, QueuedEntry { message, queued_at: now, expires_at: now + expires_in });
        true
    }

    /// Drain every queued entry whose `expires_at` has passed, for the
    /// background worker to execute exactly as a fresh request
    /// (spec.md §4.4.2 "bypassing further cooldown checks").
    pub fn drain_ready(&self, now: Instant) -> Vec<(String, MeshMessage)> {
        let mut queue = self.queue.lock();
        let ready: Vec<(String, String)> =
            queue.iter().filter(|(_, e)| now >= e.expires_at).map(|(k, _)| k.clone()).collect();
        ready
            .into_iter()
            .filter_map(|key| queue.remove(&key).map(|entry| (key.0, entry.message)))
            .collect()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ping::PingCommand;
    use std::time::Duration;

    fn message(content: &str, is_dm: bool, channel: Option<&str>) -> MeshMessage {
        MeshMessage {
            content: content.to_string(),
            sender_id: "alice".to_string(),
            sender_pubkey: None,
            channel: channel.map(str::to_string),
            is_dm,
            timestamp: 0,
            snr: None,
            rssi: None,
            hops: None,
            path: String::new(),
            elapsed: String::new(),
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(vec![Arc::new(PingCommand::new())], HashMap::new())
    }

    #[test]
    fn help_short_circuits_before_plugin_matching() {
        let d = dispatcher();
        let matched = d.match_message(&message("help", true, None), "", &[]);
        assert!(matches!(matched, Some(Matched::Help(None))));
    }

    #[test]
    fn targeted_help_captures_command_name() {
        let d = dispatcher();
        let matched = d.match_message(&message("help ping", true, None), "", &[]);
        assert!(matches!(matched, Some(Matched::Help(Some(ref s))) if s == "ping"));
    }

    #[test]
    fn legacy_bang_prefix_accepted_when_prefix_empty() {
        let d = dispatcher();
        let matched = d.match_message(&message("!ping", true, None), "", &[]);
        assert!(matches!(matched, Some(Matched::Plugin(_))));
    }

    #[test]
    fn configured_prefix_required_when_set() {
        let d = dispatcher();
        assert!(d.match_message(&message("ping", true, None), ".", &[]).is_none());
        assert!(d.match_message(&message(".ping", true, None), ".", &[]).is_some());
    }

    #[test]
    fn channel_keyword_restriction_blocks_unlisted_commands_on_channels() {
        let d = dispatcher();
        let restriction = vec!["weather".to_string()];
        assert!(d.match_message(&message("ping", false, Some("general")), "", &restriction).is_none());
        assert!(d.match_message(&message("ping", true, None), "", &restriction).is_some());
    }

    #[test]
    fn gate_chain_proceeds_for_fresh_command() {
        let d = dispatcher();
        let cmd = PingCommand::new();
        let now = Instant::now();
        let outcome = d.evaluate_gates(&cmd, &message("ping", true, None), &[], true, now);
        assert_eq!(outcome, GateOutcome::Proceed);
    }

    #[test]
    fn dm_only_command_replies_on_allowed_channel_but_ignores_elsewhere() {
        struct DmOnly(crate::commands::Cooldown);
        #[async_trait::async_trait]
        impl Command for DmOnly {
            fn name(&self) -> &str {
                "secret"
            }
            fn keywords(&self) -> &[&str] {
                &["secret"]
            }
            fn description(&self) -> &str {
                "dm only"
            }
            fn requires_dm(&self) -> bool {
                true
            }
            fn is_channel_allowed(&self, channel: &str) -> bool {
                channel == "general"
            }
            fn cooldown(&self) -> &crate::commands::Cooldown {
                &self.0
            }
            async fn execute(&self, _message: &MeshMessage) -> bool {
                true
            }
        }
        let cmd = DmOnly(crate::commands::Cooldown::none());
        let now = Instant::now();
        let d = Dispatcher::new(vec![], HashMap::new());
        let allowed = d.evaluate_gates(&cmd, &message("secret", false, Some("general")), &[], true, now);
        assert_eq!(allowed, GateOutcome::DmOnlyReply);
        let elsewhere = d.evaluate_gates(&cmd, &message("secret", false, Some("offtopic")), &[], true, now);
        assert_eq!(elsewhere, GateOutcome::Ignored);
    }

    #[test]
    fn queue_allows_only_one_entry_per_user_per_command() {
        let d = dispatcher();
        let now = Instant::now();
        let m = message("ping", true, None);
        assert!(d.try_enqueue("ping", "alice", m.clone(), now, Duration::from_secs(1)));
        assert!(!d.try_enqueue("ping", "alice", m, now, Duration::from_secs(1)));
        assert_eq!(d.queued_count(), 1);
    }

    #[test]
    fn drain_ready_returns_only_expired_entries() {
        let d = dispatcher();
        let now = Instant::now();
        d.try_enqueue("ping", "alice", message("ping", true, None), now, Duration::from_millis(10));
        assert!(d.drain_ready(now).is_empty());
        let ready = d.drain_ready(now + Duration::from_millis(20));
        assert_eq!(ready.len(), 1);
        assert_eq!(d.queued_count(), 0);
    }
}
