//! meshgw-gatewayd — the MeshCore mesh-network gateway bot daemon
//! binary (spec.md §6.3 "CLI surface").

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meshgw_gatewayd::capture::{CaptureTarget, HttpCaptureTarget, StoreCaptureTarget};
use meshgw_gatewayd::commands::ping::PingCommand;
use meshgw_gatewayd::commands::Command;
use meshgw_gatewayd::config::Config;
use meshgw_gatewayd::store::Store;
use meshgw_gatewayd::Bot;
use meshgw_net::transport::{RadioDriver, UnconfiguredDriver};

/// MeshCore mesh-network gateway bot daemon.
#[derive(Parser, Debug)]
#[command(name = "meshgw-gatewayd")]
#[command(about = "MeshCore mesh-network gateway bot daemon")]
struct Cli {
    /// Path to the `[Connection]`/`[Bot]`/`[Channels]` INI config file.
    #[arg(long, default_value = "config.ini")]
    config: PathBuf,

    /// Classify every section of the config file and exit: 1 if any
    /// issue is `Error` severity, 0 otherwise (spec.md §6.3).
    #[arg(long)]
    validate_config: bool,
}

fn init_logging(format: &str) {
    let filter = EnvFilter::from_default_env().add_directive("meshgw_gatewayd=info".parse().unwrap());
    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// `--validate-config` entry point (spec.md §6.3): prints each issue
/// with its severity prefix to stderr, exits 1 on any `Error`.
fn run_validate_config(path: &PathBuf) -> ExitCode {
    match Config::validate(path) {
        Ok(issues) => {
            let mut has_error = false;
            for issue in &issues {
                eprintln!("{issue}");
                has_error |= issue.severity == meshgw_gatewayd::config::Severity::Error;
            }
            if has_error {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("[ERROR] {e}");
            ExitCode::FAILURE
        }
    }
}

/// Builds the radio driver for `[Connection] type`. No transport or
/// firmware command codec is implemented in this repo (spec.md §1
/// "Radio driver" is a named external collaborator) — every type
/// currently resolves to [`UnconfiguredDriver`], whose `connect()`
/// fails cleanly rather than fabricating a wire protocol this spec
/// does not define.
fn build_radio_driver(radio_type: &str) -> Arc<dyn RadioDriver> {
    Arc::new(UnconfiguredDriver::new(radio_type))
}

fn build_capture_target(store: Arc<Store>, raw_sections: &std::collections::HashMap<String, std::collections::HashMap<String, String>>) -> Arc<dyn CaptureTarget> {
    let web_viewer_url = raw_sections.get("Web_Viewer").and_then(|m| m.get("base_url")).cloned();
    let map_uploader_url = raw_sections.get("MapUploader").and_then(|m| m.get("base_url")).cloned();
    match web_viewer_url.or(map_uploader_url) {
        Some(url) if !url.is_empty() => Arc::new(HttpCaptureTarget::new(url)),
        _ => Arc::new(StoreCaptureTarget::new(store)),
    }
}

fn store_path(raw_sections: &std::collections::HashMap<String, std::collections::HashMap<String, String>>) -> PathBuf {
    raw_sections
        .get("External_Data")
        .and_then(|m| m.get("db_path"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("meshgw.sqlite3"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.validate_config {
        return run_validate_config(&cli.config);
    }

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[ERROR] {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging.format);
    info!("meshgw-gatewayd v{} starting", env!("CARGO_PKG_VERSION"));

    let store = match Store::open(store_path(&config.raw_sections)) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "failed to open persistent store");
            return ExitCode::FAILURE;
        }
    };

    let capture = build_capture_target(store.clone(), &config.raw_sections);

    let radio = build_radio_driver(&config.connection.radio_type);
    if let Err(e) = radio.connect().await {
        error!(error = %e, "radio connect failed");
        return ExitCode::FAILURE;
    }

    // `connection_time` (spec.md §4.3 "Stale-cache filter") is the
    // wall-clock moment of *this* connect, not a value carried over from
    // a previous run — otherwise every restart after the first would
    // permanently disable the stale-buffer filter. `bot_start_time` in
    // the kv table is a separate health-snapshot fact (spec.md §6.4) and
    // is always overwritten with the current time on startup.
    let connection_time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let _ = store.kv_set("bot_start_time", &connection_time.to_string());

    let commands: Vec<Arc<dyn Command>> = vec![Arc::new(PingCommand::new())];
    let bot = Arc::new(Bot::new(config, store, radio.clone(), capture, commands, connection_time));

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    #[cfg(unix)]
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
            info!("received shutdown signal");
            let _ = shutdown_tx.send(());
        });
    }
    #[cfg(not(unix))]
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("received shutdown signal");
            let _ = shutdown_tx.send(());
        });
    }

    // `bot.run` owns the scheduler-side background tasks (cooldown
    // queue, scheduled messages, interval adverts, service health,
    // feed polling, channel-ops queue, cache sweeps) and stops them
    // and flushes the mesh graph before returning (spec.md §5 shutdown
    // sequence). No service/feed plugins are registered here — their
    // business logic is a named non-goal (spec.md §1) — so what
    // remains is disconnecting the radio.
    bot.run(shutdown_rx).await;

    if radio.is_connected() {
        warn!("shutting down with radio still reporting connected");
    }
    info!("meshgw-gatewayd stopped");
    ExitCode::SUCCESS
}
