//! INI config loading and startup/reload validation (spec.md §6.1).
//!
//! The source format is an INI file read through the `ini` crate; the
//! shape and section semantics are specified here, not the crate's
//! internals. Required sections (`Connection`, `Bot`, `Channels`)
//! missing at startup are fatal; everything else degrades to a typed
//! default and is reported at `Info` by [`Config::validate`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Canonical section names this daemon understands directly. Anything
/// else is either a `*_Command` plugin-override section (passed through
/// verbatim), a recognized typo, or truly unknown.
const CANONICAL_SECTIONS: &[&str] = &[
    "Connection",
    "Bot",
    "Channels",
    "Admin_ACL",
    "Banned_Users",
    "Localization",
    "Keywords",
    "Custom_Syntax",
    "Scheduled_Messages",
    "Logging",
    "External_Data",
    "Weather",
    "Solar_Config",
    "Channels_List",
    "Web_Viewer",
    "Feed_Manager",
    "PacketCapture",
    "MapUploader",
    "Weather_Service",
    "DiscordBridge",
    "Plugin_Overrides",
    "Companion_Purge",
];

const REQUIRED_SECTIONS: &[&str] = &["Connection", "Bot", "Channels"];

/// Common misspellings seen in the field (SPEC_FULL.md §A.6
/// "known-typo table"), mapped to the canonical name a warning should
/// suggest.
const KNOWN_TYPOS: &[(&str, &str)] = &[
    ("Bots", "Bot"),
    ("Channel", "Channels"),
    ("Connections", "Connection"),
    ("Conn", "Connection"),
    ("Admin", "Admin_ACL"),
    ("AdminACL", "Admin_ACL"),
    ("Keyword", "Keywords"),
    ("Schedule", "Scheduled_Messages"),
    ("ScheduledMessages", "Scheduled_Messages"),
    ("BannedUsers", "Banned_Users"),
    ("Log", "Logging"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("could not parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("missing required section [{0}]")]
    MissingRequiredSection(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn prefix(self) -> &'static str {
        match self {
            Severity::Error => "[ERROR]",
            Severity::Warning => "[WARN]",
            Severity::Info => "[INFO]",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.severity.prefix(), self.message)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConnectionConfig {
    /// `serial` | `ble` | `tcp` — the transport kind; internals belong
    /// to the radio driver (spec.md §1 non-goal).
    pub radio_type: String,
    pub address: String,
    pub baud_rate: Option<u32>,
    pub timeout_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub command_prefix: String,
    pub respond_to_dms: bool,
    pub auto_manage_contacts: AutoManageContacts,
    pub channel_retry_enabled: bool,
    pub channel_retry_echo_window_seconds: f64,
    pub channel_retry_max_attempts: u32,
    pub bot_tx_rate_limit_seconds: f64,
    pub tx_delay_ms: u64,
    pub rate_limit_seconds: f64,
    pub per_user_rate_limit_seconds: f64,
    pub advert_interval_hours: f64,
    pub max_send_attempts: u32,
    pub max_flood_attempts: u32,
    pub flood_after_attempts: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: String::new(),
            respond_to_dms: true,
            auto_manage_contacts: AutoManageContacts::Device,
            channel_retry_enabled: false,
            channel_retry_echo_window_seconds: 10.0,
            channel_retry_max_attempts: 1,
            bot_tx_rate_limit_seconds: 2.0,
            tx_delay_ms: 0,
            rate_limit_seconds: 3.0,
            per_user_rate_limit_seconds: 10.0,
            advert_interval_hours: 0.0,
            max_send_attempts: 3,
            max_flood_attempts: 1,
            flood_after_attempts: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoManageContacts {
    Device,
    Bot,
    Manual,
}

impl AutoManageContacts {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "bot" => AutoManageContacts::Bot,
            "false" | "manual" | "none" => AutoManageContacts::Manual,
            _ => AutoManageContacts::Device,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChannelsConfig {
    pub monitor_channels: Vec<String>,
    /// Per spec.md §4.4: when set, only these triggers are honored on
    /// channels (DMs unaffected).
    pub channel_keywords: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct AdminAclConfig {
    pub admin_pubkeys: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LocalizationConfig {
    pub language: String,
    pub translation_path: String,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self { language: "en".to_string(), translation_path: "translations/".to_string() }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoggingConfig {
    /// `pretty` | `json` (SPEC_FULL.md §A.2).
    pub format: String,
    pub level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct CompanionPurgeConfig {
    pub enabled: bool,
    pub max_contacts: Option<u32>,
}

/// A fully parsed, typed configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub path: PathBuf,
    pub connection: ConnectionConfig,
    pub bot: BotConfig,
    pub channels: ChannelsConfig,
    pub admin_acl: AdminAclConfig,
    pub banned_users: Vec<String>,
    pub localization: LocalizationConfig,
    pub keywords: HashMap<String, String>,
    /// `HHMM` -> `"channel:text"` (spec.md §4.9).
    pub scheduled_messages: HashMap<String, String>,
    pub logging: LoggingConfig,
    pub plugin_overrides: HashMap<String, String>,
    pub companion_purge: CompanionPurgeConfig,
    /// Every other section verbatim, for ambient/pluggable consumers
    /// (web viewer, map uploader, feed manager, weather, …) whose
    /// business logic this core does not implement (spec.md §1).
    pub raw_sections: HashMap<String, HashMap<String, String>>,
}

fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn load_ini(path: &Path) -> Result<ini::Ini, ConfigError> {
    ini::Ini::load_from_file(path).map_err(|e| ConfigError::Parse { path: path.to_path_buf(), reason: e.to_string() })
}

impl Config {
    /// Parse and build a typed config from an INI file. Missing
    /// required sections abort with `ConfigError` (spec.md §7 "Config
    /// error: startup errors abort").
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::Io {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        let ini = load_ini(&path)?;

        for required in REQUIRED_SECTIONS {
            if ini.section(Some(*required)).is_none() {
                return Err(ConfigError::MissingRequiredSection(required.to_string()));
            }
        }

        let mut raw_sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (section, props) in ini.iter() {
            let Some(section) = section else { continue };
            let mut map = HashMap::new();
            for (k, v) in props.iter() {
                map.insert(k.to_string(), strip_quotes(v));
            }
            raw_sections.insert(section.to_string(), map);
        }

        let get = |section: &str, key: &str| -> Option<String> {
            raw_sections.get(section).and_then(|m| m.get(key)).cloned()
        };
        let get_list = |section: &str, key: &str| -> Vec<String> {
            get(section, key)
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default()
        };
        let get_bool = |section: &str, key: &str, default: bool| -> bool {
            get(section, key)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
                .unwrap_or(default)
        };
        let get_num = |section: &str, key: &str, default: f64| -> f64 {
            get(section, key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        };
        let get_u = |section: &str, key: &str, default: u64| -> u64 {
            get(section, key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        };

        let connection = ConnectionConfig {
            radio_type: get("Connection", "type").unwrap_or_default(),
            address: get("Connection", "address").or_else(|| get("Connection", "port")).unwrap_or_default(),
            baud_rate: get("Connection", "baud_rate").and_then(|v| v.parse().ok()),
            timeout_seconds: get_u("Connection", "timeout_seconds", 30),
        };

        let defaults = BotConfig::default();
        let bot = BotConfig {
            command_prefix: get("Bot", "command_prefix").unwrap_or(defaults.command_prefix),
            respond_to_dms: get_bool("Bot", "respond_to_dms", defaults.respond_to_dms),
            auto_manage_contacts: get("Bot", "auto_manage_contacts")
                .map(|v| AutoManageContacts::parse(&v))
                .unwrap_or(defaults.auto_manage_contacts),
            channel_retry_enabled: get_bool("Bot", "channel_retry_enabled", defaults.channel_retry_enabled),
            channel_retry_echo_window_seconds: get_num(
                "Bot",
                "channel_retry_echo_window",
                defaults.channel_retry_echo_window_seconds,
            ),
            channel_retry_max_attempts: get_u(
                "Bot",
                "channel_retry_max_attempts",
                defaults.channel_retry_max_attempts as u64,
            ) as u32,
            bot_tx_rate_limit_seconds: get_num("Bot", "bot_tx_rate_limit_seconds", defaults.bot_tx_rate_limit_seconds),
            tx_delay_ms: get_u("Bot", "tx_delay_ms", defaults.tx_delay_ms),
            rate_limit_seconds: get_num("Bot", "rate_limit_seconds", defaults.rate_limit_seconds),
            per_user_rate_limit_seconds: get_num(
                "Bot",
                "per_user_rate_limit_seconds",
                defaults.per_user_rate_limit_seconds,
            ),
            advert_interval_hours: get_num("Bot", "advert_interval_hours", defaults.advert_interval_hours),
            max_send_attempts: get_u("Bot", "max_attempts", defaults.max_send_attempts as u64) as u32,
            max_flood_attempts: get_u("Bot", "max_flood_attempts", defaults.max_flood_attempts as u64) as u32,
            flood_after_attempts: get_u("Bot", "flood_after", defaults.flood_after_attempts as u64) as u32,
        };

        let channels = ChannelsConfig {
            monitor_channels: get_list("Bot", "monitor_channels")
                .into_iter()
                .chain(get_list("Channels", "monitor_channels"))
                .collect(),
            channel_keywords: get_list("Channels", "channel_keywords"),
        };

        let admin_acl = AdminAclConfig { admin_pubkeys: get_list("Admin_ACL", "admin_pubkeys") };

        let banned_users = raw_sections
            .get("Banned_Users")
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();

        let localization_defaults = LocalizationConfig::default();
        let localization = LocalizationConfig {
            language: get("Localization", "language").unwrap_or(localization_defaults.language),
            translation_path: get("Localization", "translation_path")
                .unwrap_or(localization_defaults.translation_path),
        };

        let keywords = raw_sections.get("Keywords").cloned().unwrap_or_default();
        let scheduled_messages = raw_sections.get("Scheduled_Messages").cloned().unwrap_or_default();
        let logging = LoggingConfig {
            format: get("Logging", "format").unwrap_or_else(|| "pretty".to_string()),
            level: get("Logging", "level"),
        };
        let plugin_overrides = raw_sections.get("Plugin_Overrides").cloned().unwrap_or_default();
        let companion_purge = CompanionPurgeConfig {
            enabled: get_bool("Companion_Purge", "enabled", false),
            max_contacts: get("Companion_Purge", "max_contacts").and_then(|v| v.parse().ok()),
        };

        Ok(Config {
            path,
            connection,
            bot,
            channels,
            admin_acl,
            banned_users,
            localization,
            keywords,
            scheduled_messages,
            logging,
            plugin_overrides,
            companion_purge,
            raw_sections,
        })
    }

    /// Classify every section present (and every required section
    /// absent) into a severity-tagged issue list (spec.md §6.1
    /// "Validator").
    pub fn validate(path: impl AsRef<Path>) -> Result<Vec<ConfigIssue>, ConfigError> {
        let path = path.as_ref();
        let ini = load_ini(path)?;
        let mut issues = Vec::new();

        let present: Vec<&str> = ini.sections().flatten().collect();

        for required in REQUIRED_SECTIONS {
            if !present.contains(required) {
                issues.push(ConfigIssue {
                    severity: Severity::Error,
                    message: format!("missing required section [{required}]"),
                });
            }
        }

        for name in &present {
            if CANONICAL_SECTIONS.contains(name) || REQUIRED_SECTIONS.contains(name) {
                continue;
            }
            if name.ends_with("_Command") {
                continue;
            }
            if let Some((_, canonical)) = KNOWN_TYPOS.iter().find(|(typo, _)| typo == name) {
                issues.push(ConfigIssue {
                    severity: Severity::Warning,
                    message: format!("section [{name}] looks like a typo of [{canonical}]"),
                });
                continue;
            }
            issues.push(ConfigIssue {
                severity: Severity::Warning,
                message: format!("unknown section [{name}] — ignored"),
            });
        }

        for name in CANONICAL_SECTIONS.iter().filter(|s| !REQUIRED_SECTIONS.contains(s)) {
            if !present.contains(name) {
                issues.push(ConfigIssue {
                    severity: Severity::Info,
                    message: format!("optional section [{name}] absent, using defaults"),
                });
            }
        }

        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        Ok(issues)
    }

    /// Reload semantics (spec.md §8 "Reloading config with unchanged
    /// `[Connection]` fields must succeed; ... any `[Connection]`
    /// change must fail ... and leave runtime state unchanged").
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<Config, (bool, String)> {
        let new = Config::load(&path).map_err(|e| (false, e.to_string()))?;
        if new.connection.radio_type != self.connection.radio_type
            || new.connection.address != self.connection.address
            || new.connection.baud_rate != self.connection.baud_rate
        {
            return Err((false, "[Connection] section changed; reload rejected, prior config retained".to_string()));
        }
        Ok(new)
    }
}
