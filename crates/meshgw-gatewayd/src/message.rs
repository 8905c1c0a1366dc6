//! `MeshMessage` normalization and the message handler (spec.md §3.4,
//! §4.3).

use meshgw_net::contact::{Contact, PublicKey};

/// The dispatch-facing normalized event (spec.md §3.4).
#[derive(Clone, Debug, PartialEq)]
pub struct MeshMessage {
    pub content: String,
    pub sender_id: String,
    pub sender_pubkey: Option<PublicKey>,
    /// `None` for DMs.
    pub channel: Option<String>,
    pub is_dm: bool,
    /// Sender-claimed timestamp; may be bogus (spec.md §3.4).
    pub timestamp: i64,
    pub snr: Option<f32>,
    pub rssi: Option<i32>,
    pub hops: Option<u8>,
    pub path: String,
    pub elapsed: String,
}

/// `Nms` where N is `now - timestamp` in ms, or a localized
/// "Sync device clock" string when the timestamp is implausible
/// (spec.md §3.4).
pub fn elapsed_label(timestamp: i64, now: i64, translate: impl Fn(&str) -> String) -> String {
    if timestamp <= 0 || timestamp > now + 3600 {
        translate("sync_device_clock")
    } else {
        format!("{}ms", (now - timestamp).max(0) * 1000)
    }
}

/// Banned-user prefix match (spec.md §4.3 "Banned-user filter",
/// SPEC_FULL.md §A.6 `security_utils`): case-sensitive prefix match
/// after trimming trailing whitespace/emoji-ish punctuation from the
/// observed name.
pub fn is_banned(observed_name: &str, banned: &[String]) -> bool {
    let trimmed = observed_name.trim_end_matches(|c: char| c.is_whitespace() || !c.is_ascii_graphic());
    let trimmed = trimmed.trim();
    banned.iter().any(|b| {
        let b = b.as_str();
        trimmed == b
            || observed_name == b
            || trimmed
                .strip_prefix(b)
                .is_some_and(|rest| !rest.chars().next().is_some_and(|c| c.is_alphanumeric()))
    })
}

/// Splits `"SENDER: message"` channel text into `(sender, content)`
/// (spec.md §4.3 "Sender normalization"). If there's no colon, the
/// whole string is the content and the sender is `None`.
pub fn split_channel_sender(raw: &str) -> (Option<String>, String) {
    match raw.split_once(':') {
        Some((sender, rest)) if !sender.trim().is_empty() && sender.len() < 64 => {
            (Some(sender.trim().to_string()), rest.trim_end().to_string())
        }
        _ => (None, raw.trim_end().to_string()),
    }
}

/// Path label for a DM, derived from the device contact's `out_path`
/// (spec.md §4.3 "DM path"): `0 => Direct`, `255 => unknown`, else a
/// comma-joined hop list.
pub fn dm_path_label(contact: Option<&Contact>) -> String {
    contact.map(|c| c.path_label()).unwrap_or_else(|| "unknown".to_string())
}

/// The message handler: owns `connection_time` and decides whether an
/// event is stale device-buffer noise or should reach the dispatcher
/// (spec.md §4.3 "Stale-cache filter").
pub struct MessageHandler {
    pub connection_time: i64,
}

impl MessageHandler {
    pub fn new(connection_time: i64) -> Self {
        Self { connection_time }
    }

    /// True when the event should be read to clear the device buffer
    /// but *not* processed: its timestamp is more than 5 s earlier
    /// than `connection_time`, and the timestamp is itself plausible
    /// (> 0 and < now + 1h). Implausible timestamps are processed —
    /// "safer to act than to lose" (spec.md §4.3).
    pub fn is_stale(&self, sender_timestamp: i64, now: i64) -> bool {
        let plausible = sender_timestamp > 0 && sender_timestamp < now + 3600;
        plausible && sender_timestamp < self.connection_time - 5
    }

    /// Channel-scope gate (spec.md §4.3 "Channel filter"): a channel
    /// message is processed if its channel is in the global monitor
    /// list or named by any command's per-channel override.
    pub fn channel_allowed(&self, channel: &str, monitor_channels: &[String], command_overrides: &[&str]) -> bool {
        monitor_channels.iter().any(|c| c == channel) || command_overrides.contains(&channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_filter_drops_message_well_before_connection() {
        let handler = MessageHandler::new(1_000_000);
        assert!(handler.is_stale(999_000, 1_000_100));
    }

    #[test]
    fn stale_filter_keeps_message_within_five_seconds() {
        let handler = MessageHandler::new(1_000_000);
        assert!(!handler.is_stale(999_996, 1_000_100));
    }

    #[test]
    fn implausible_timestamp_is_processed_not_dropped() {
        let handler = MessageHandler::new(1_000_000);
        assert!(!handler.is_stale(0, 1_000_100));
        assert!(!handler.is_stale(-5, 1_000_100));
        assert!(!handler.is_stale(i64::MAX, 1_000_100));
    }

    #[test]
    fn elapsed_label_reports_ms_for_plausible_timestamp() {
        let label = elapsed_label(100, 105, |k| k.to_string());
        assert_eq!(label, "5000ms");
    }

    #[test]
    fn elapsed_label_degrades_for_implausible_timestamp() {
        let label = elapsed_label(0, 105, |k| k.to_string());
        assert_eq!(label, "sync_device_clock");
        let label = elapsed_label(105 + 3601, 105, |k| k.to_string());
        assert_eq!(label, "sync_device_clock");
    }

    #[test]
    fn banned_user_prefix_match_ignores_trailing_emoji() {
        let banned = vec!["Bad User".to_string()];
        assert!(is_banned("Bad User", &banned));
        assert!(is_banned("Bad User 🛑", &banned));
        assert!(!is_banned("Bad Userson", &banned));
    }

    #[test]
    fn splits_sender_prefix_on_first_colon() {
        let (sender, content) = split_channel_sender("Alice: hello there");
        assert_eq!(sender.as_deref(), Some("Alice"));
        assert_eq!(content, "hello there");
    }

    #[test]
    fn no_colon_means_no_sender() {
        let (sender, content) = split_channel_sender("just text");
        assert_eq!(sender, None);
        assert_eq!(content, "just text");
    }

    #[test]
    fn channel_allowed_via_global_or_command_override() {
        let handler = MessageHandler::new(0);
        let monitor = vec!["general".to_string()];
        assert!(handler.channel_allowed("general", &monitor, &[]));
        assert!(handler.channel_allowed("weather", &monitor, &["weather"]));
        assert!(!handler.channel_allowed("other", &monitor, &["weather"]));
    }
}
