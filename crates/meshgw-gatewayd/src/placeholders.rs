//! Keyword formatting placeholders (spec.md §4.4 "Keyword formatting
//! placeholders"): substitutes `{sender}`, `{snr}`, mesh-info counts,
//! etc. into a `[Keywords]` or scheduled-message template. A missing
//! value is filled with a sensible default rather than failing the
//! send — "formatter errors must never block send" (spec.md §4.4).

use crate::message::MeshMessage;
use crate::store::ContactCounts;

const UNKNOWN: &str = "unknown";

/// Everything a template substitution might need, gathered once per
/// send so callers don't have to thread individual fields through.
pub struct PlaceholderContext<'a> {
    pub message: Option<&'a MeshMessage>,
    pub counts: Option<&'a ContactCounts>,
    /// The free-text argument to a `t <phrase>` style command.
    pub phrase: Option<&'a str>,
    pub path_distance_km: Option<f64>,
    pub firstlast_distance_km: Option<f64>,
}

impl<'a> PlaceholderContext<'a> {
    pub fn for_message(message: &'a MeshMessage) -> Self {
        Self { message: Some(message), counts: None, phrase: None, path_distance_km: None, firstlast_distance_km: None }
    }

    pub fn for_scheduled(counts: &'a ContactCounts) -> Self {
        Self { message: None, counts: Some(counts), phrase: None, path_distance_km: None, firstlast_distance_km: None }
    }
}

fn fmt_opt<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| UNKNOWN.to_string())
}

fn fmt_km(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.1}km")).unwrap_or_else(|| UNKNOWN.to_string())
}

/// Substitute every recognized `{placeholder}` in `template`. Unknown
/// placeholders are left untouched so an operator-authored typo is
/// visible rather than silently swallowed.
pub fn format_template(template: &str, ctx: &PlaceholderContext) -> String {
    let mut out = template.to_string();

    let (sender, connection_info, snr, rssi, timestamp, path) = match ctx.message {
        Some(m) => (
            m.sender_id.clone(),
            m.channel.clone().unwrap_or_else(|| "DM".to_string()),
            fmt_opt(m.snr),
            fmt_opt(m.rssi),
            m.timestamp.to_string(),
            if m.path.is_empty() { UNKNOWN.to_string() } else { m.path.clone() },
        ),
        None => (UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string()),
    };

    out = out.replace("{sender}", &sender);
    out = out.replace("{connection_info}", &connection_info);
    out = out.replace("{snr}", &snr);
    out = out.replace("{rssi}", &rssi);
    out = out.replace("{timestamp}", &timestamp);
    out = out.replace("{path}", &path);
    out = out.replace("{path_distance}", &fmt_km(ctx.path_distance_km));
    out = out.replace("{firstlast_distance}", &fmt_km(ctx.firstlast_distance_km));
    out = out.replace("{phrase}", ctx.phrase.unwrap_or(""));

    if let Some(c) = ctx.counts {
        out = out.replace("{total_contacts}", &c.total_contacts.to_string());
        out = out.replace("{total_repeaters}", &c.total_repeaters.to_string());
        out = out.replace("{total_companions}", &c.total_companions.to_string());
        out = out.replace("{active_24h}", &c.active_24h.to_string());
        out = out.replace("{new_companions_7d}", &c.new_companions_7d.to_string());
        out = out.replace("{active_30d}", &c.active_30d.to_string());
        // legacy aliases kept from the Python source (SPEC_FULL.md §A.6).
        out = out.replace("{total_contacts_30d}", &c.active_30d.to_string());
        out = out.replace("{repeaters}", &c.total_repeaters.to_string());
        out = out.replace("{companions}", &c.total_companions.to_string());
    } else {
        for key in [
            "{total_contacts}",
            "{total_repeaters}",
            "{total_companions}",
            "{active_24h}",
            "{new_companions_7d}",
            "{active_30d}",
            "{total_contacts_30d}",
            "{repeaters}",
            "{companions}",
        ] {
            out = out.replace(key, UNKNOWN);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str, channel: Option<&str>) -> MeshMessage {
        MeshMessage {
            content: content.to_string(),
            sender_id: "Alice".to_string(),
            sender_pubkey: None,
            channel: channel.map(str::to_string),
            is_dm: channel.is_none(),
            timestamp: 1000,
            snr: Some(5.5),
            rssi: Some(-90),
            hops: None,
            path: "aa,bb".to_string(),
            elapsed: String::new(),
        }
    }

    #[test]
    fn substitutes_sender_and_rf_fields() {
        let m = message("hi", Some("general"));
        let ctx = PlaceholderContext::for_message(&m);
        let out = format_template("{sender} on {connection_info}: snr={snr} path={path}", &ctx);
        assert_eq!(out, "Alice on general: snr=5.5 path=aa,bb");
    }

    #[test]
    fn missing_fields_default_to_unknown() {
        let m = message("hi", None);
        let ctx = PlaceholderContext { message: Some(&m), counts: None, phrase: None, path_distance_km: None, firstlast_distance_km: None };
        let out = format_template("distance: {path_distance}, mesh total: {total_contacts}", &ctx);
        assert_eq!(out, "distance: unknown, mesh total: unknown");
    }

    #[test]
    fn mesh_info_counts_fill_scheduled_placeholders() {
        let counts = ContactCounts {
            total_contacts: 10,
            total_repeaters: 4,
            total_companions: 6,
            active_24h: 3,
            new_companions_7d: 1,
            active_30d: 8,
        };
        let ctx = PlaceholderContext::for_scheduled(&counts);
        let out = format_template("{total_contacts} nodes, {repeaters} repeaters, {total_contacts_30d} active/30d", &ctx);
        assert_eq!(out, "10 nodes, 4 repeaters, 8 active/30d");
    }

    #[test]
    fn unrecognized_placeholder_is_left_untouched() {
        let m = message("hi", None);
        let ctx = PlaceholderContext::for_message(&m);
        assert_eq!(format_template("{nonsense}", &ctx), "{nonsense}");
    }
}
