//! Help text generation (spec.md §4.4 "Help keywords short-circuit
//! further dispatch"; SPEC_FULL.md §A.6 "popularity sort"). Help is not
//! a plugin: the dispatcher answers it directly before any plugin gets
//! a chance to match.

/// Enough of a command's metadata to list or describe it.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandSummary {
    pub name: String,
    pub short_description: String,
    pub category: String,
    pub usage: Option<String>,
}

/// The general listing, commands ordered by historical popularity
/// (spec.md `command_stats`), least-used and never-used commands
/// trailing alphabetically.
pub fn general_help(commands: &[CommandSummary], popularity: &[(String, i64)]) -> String {
    let mut ordered: Vec<&CommandSummary> = commands.iter().collect();
    ordered.sort_by_key(|c| {
        let rank = popularity.iter().position(|(name, _)| name == &c.name).unwrap_or(usize::MAX);
        (rank, c.name.clone())
    });
    let mut lines = vec!["Available commands:".to_string()];
    for c in ordered {
        lines.push(format!("  {} — {}", c.name, c.short_description));
    }
    lines.join("\n")
}

/// A single command's full help text, or a not-found message.
pub fn targeted_help(commands: &[CommandSummary], target: &str, full_text: impl Fn(&str) -> Option<String>) -> String {
    match commands.iter().find(|c| c.name.eq_ignore_ascii_case(target)) {
        Some(c) => full_text(&c.name).unwrap_or_else(|| {
            let usage = c.usage.as_deref().map(|u| format!(" — usage: {u}")).unwrap_or_default();
            format!("{}: {}{}", c.name, c.short_description, usage)
        }),
        None => format!("No such command: {target}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str) -> CommandSummary {
        CommandSummary { name: name.to_string(), short_description: format!("does {name}"), category: "general".to_string(), usage: None }
    }

    #[test]
    fn general_help_orders_by_popularity_then_alphabetically() {
        let commands = vec![summary("ping"), summary("weather"), summary("help")];
        let popularity = vec![("weather".to_string(), 50), ("ping".to_string(), 10)];
        let text = general_help(&commands, &popularity);
        let ping_idx = text.find("ping").unwrap();
        let weather_idx = text.find("weather").unwrap();
        let help_idx = text.find("help").unwrap();
        assert!(weather_idx < ping_idx);
        assert!(ping_idx < help_idx);
    }

    #[test]
    fn targeted_help_reports_unknown_command() {
        let commands = vec![summary("ping")];
        let text = targeted_help(&commands, "nope", |_| None);
        assert_eq!(text, "No such command: nope");
    }

    #[test]
    fn targeted_help_falls_back_to_summary_without_full_text() {
        let commands = vec![summary("ping")];
        let text = targeted_help(&commands, "ping", |_| None);
        assert_eq!(text, "ping: does ping");
    }
}
