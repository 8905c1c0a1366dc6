//! The plugin loader, reworked for a statically-typed target (spec.md
//! §4.10; §9 "Dynamic plugin discovery → static or runtime registry").
//!
//! There is no source tree to scan here, so "discovery" is simply the
//! list of built-in commands and alternatives a binary links in; what
//! this module keeps from spec.md §4.10 is the override mechanism,
//! the standalone-alternative auto-fill rule, and keyword-conflict
//! detection.

use std::collections::HashMap;
use std::sync::Arc;

use super::Command;

/// A plugin that can stand in for a canonical command name it doesn't
/// share — the "wx_international substitutes wx" case generalized
/// (spec.md §4.10, §9). `canonical_name` is the slot this alternative
/// is eligible to fill; `command.name()` is its own declared name,
/// used as the key `[Plugin_Overrides]` references.
pub struct AlternativePlugin {
    pub canonical_name: String,
    pub command: Arc<dyn Command>,
}

/// The resolved set of commands after defaults, overrides, and
/// standalone auto-fill have been applied (spec.md §4.10).
pub struct PluginRegistry {
    entries: HashMap<String, Arc<dyn Command>>,
}

impl PluginRegistry {
    /// Build the registry from the built-in defaults, the available
    /// alternatives, and the `[Plugin_Overrides]` map (canonical name
    /// -> alternative's own declared name). Returns the registry plus
    /// any keyword-conflict warnings (spec.md §4.10 "Keyword conflict
    /// detection").
    pub fn build(
        defaults: Vec<Arc<dyn Command>>,
        alternatives: Vec<AlternativePlugin>,
        overrides: &HashMap<String, String>,
    ) -> (Self, Vec<String>) {
        let mut entries: HashMap<String, Arc<dyn Command>> =
            defaults.into_iter().map(|c| (c.name().to_string(), c)).collect();

        let alt_by_own_name: HashMap<&str, &AlternativePlugin> =
            alternatives.iter().map(|a| (a.command.name(), a)).collect();

        for (canonical, alt_name) in overrides {
            if let Some(alt) = alt_by_own_name.get(alt_name.as_str()) {
                entries.insert(canonical.clone(), alt.command.clone());
            }
        }

        // A standalone alternative takes over its canonical slot only
        // if that slot is still empty (spec.md §4.10 "automatically
        // takes the canonical slot").
        for alt in &alternatives {
            entries.entry(alt.canonical_name.clone()).or_insert_with(|| alt.command.clone());
        }

        let mut warnings = Vec::new();
        let mut keyword_owners: HashMap<String, String> = HashMap::new();
        let mut names: Vec<&String> = entries.keys().collect();
        names.sort();
        for name in names {
            let cmd = &entries[name];
            for kw in cmd.keywords() {
                let kw_lower = kw.to_ascii_lowercase();
                match keyword_owners.get(&kw_lower) {
                    Some(owner) if owner != name => {
                        warnings.push(format!("keyword '{kw}' already mapped to '{owner}'; '{name}' also claims it"));
                    }
                    Some(_) => {}
                    None => {
                        keyword_owners.insert(kw_lower, name.clone());
                    }
                }
            }
        }

        (Self { entries }, warnings)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.entries.get(name).cloned()
    }

    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hot reload (spec.md §4.10): drop the cached instance for `name`
    /// and install `replacement` in its place, respecting whatever
    /// override previously pointed here.
    pub fn reload_plugin(&mut self, name: &str, replacement: Arc<dyn Command>) {
        self.entries.insert(name.to_string(), replacement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cooldown, Command};
    use crate::message::MeshMessage;
    use async_trait::async_trait;

    struct Stub {
        name: &'static str,
        keywords: Vec<&'static str>,
        cooldown: Cooldown,
    }

    impl Stub {
        fn new(name: &'static str, keywords: Vec<&'static str>) -> Arc<dyn Command> {
            Arc::new(Self { name, keywords, cooldown: Cooldown::none() })
        }
    }

    #[async_trait]
    impl Command for Stub {
        fn name(&self) -> &str {
            self.name
        }
        fn keywords(&self) -> &[&str] {
            &self.keywords
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn cooldown(&self) -> &Cooldown {
            &self.cooldown
        }
        async fn execute(&self, _message: &MeshMessage) -> bool {
            true
        }
    }

    #[test]
    fn standalone_alternative_fills_missing_canonical_slot() {
        let alt = AlternativePlugin { canonical_name: "wx".to_string(), command: Stub::new("wx_international", vec!["wx"]) };
        let (registry, warnings) = PluginRegistry::build(vec![], vec![alt], &HashMap::new());
        assert!(warnings.is_empty());
        assert_eq!(registry.get("wx").unwrap().name(), "wx_international");
    }

    #[test]
    fn standalone_alternative_does_not_override_an_existing_default() {
        let default = Stub::new("wx", vec!["weather"]);
        let alt = AlternativePlugin { canonical_name: "wx".to_string(), command: Stub::new("wx_international", vec!["wx"]) };
        let (registry, _) = PluginRegistry::build(vec![default], vec![alt], &HashMap::new());
        assert_eq!(registry.get("wx").unwrap().name(), "wx");
    }

    #[test]
    fn explicit_override_replaces_canonical_with_named_alternative() {
        let default = Stub::new("wx", vec!["weather"]);
        let alt = AlternativePlugin { canonical_name: "wx".to_string(), command: Stub::new("wx_beta", vec!["weather"]) };
        let mut overrides = HashMap::new();
        overrides.insert("wx".to_string(), "wx_beta".to_string());
        let (registry, _) = PluginRegistry::build(vec![default], vec![alt], &overrides);
        assert_eq!(registry.get("wx").unwrap().name(), "wx_beta");
    }

    #[test]
    fn conflicting_keyword_across_two_plugins_warns() {
        let a = Stub::new("ping", vec!["ping"]);
        let b = Stub::new("echo", vec!["ping"]);
        let (_, warnings) = PluginRegistry::build(vec![a, b], vec![], &HashMap::new());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("ping"));
    }

    #[test]
    fn reload_plugin_replaces_the_cached_instance() {
        let (mut registry, _) = PluginRegistry::build(vec![Stub::new("ping", vec!["ping"])], vec![], &HashMap::new());
        registry.reload_plugin("ping", Stub::new("ping", vec!["ping", "p"]));
        assert_eq!(registry.get("ping").unwrap().keywords(), &["ping", "p"]);
    }
}
