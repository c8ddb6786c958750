//! chainrelay CLI — run the relay server and inspect its archive.
//!
//! # Commands
//! ```text
//! chainrelay run          --config <relay.yaml>
//! chainrelay check-config --config <relay.yaml>
//! chainrelay archive      --config <relay.yaml> [--type <EventName>] [--totals] [--json]
//! chainrelay info
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use chainrelay_core::{Archive, EventKind, RelayConfig};
use chainrelay_evm::ContractAbi;
use chainrelay_server::{init_tracing, ServerConfig, SOCKET_PATH};
use chainrelay_storage::SqliteArchive;

#[derive(Parser)]
#[command(
    name = "chainrelay",
    about = "Relay smart-contract events to WebSocket subscribers and archive per-window counts",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay loop and the WebSocket server
    Run {
        /// Path to the YAML config
        #[arg(short, long, default_value = "config/relay.yaml")]
        config: PathBuf,
    },

    /// Validate a config file and its contract ABI
    #[command(name = "check-config")]
    CheckConfig {
        #[arg(short, long, default_value = "config/relay.yaml")]
        config: PathBuf,
    },

    /// Print archived window counts
    Archive {
        #[arg(short, long, default_value = "config/relay.yaml")]
        config: PathBuf,
        /// Only records of this event kind
        #[arg(long = "type")]
        kind: Option<String>,
        /// Sum per kind instead of listing windows
        #[arg(long)]
        totals: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show defaults and endpoints
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => cmd_run(config).await,
        Commands::CheckConfig { config } => cmd_check_config(config),
        Commands::Archive {
            config,
            kind,
            totals,
            json,
        } => cmd_archive(config, kind, totals, json).await,
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

fn load_config(path: &PathBuf) -> Result<ServerConfig> {
    ServerConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

async fn cmd_run(path: PathBuf) -> Result<()> {
    let config = load_config(&path)?;
    init_tracing(&config.log);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, shutting down");
            }
            cancel.cancel();
        });
    }

    chainrelay_server::run(config, cancel)
        .await
        .context("relay server failed")
}

fn cmd_check_config(path: PathBuf) -> Result<()> {
    let config = load_config(&path)?;
    config.validate().context("invalid configuration")?;

    let abi = ContractAbi::from_file(&config.contract.abi_path)
        .with_context(|| format!("loading ABI {}", config.contract.abi_path.display()))?;

    println!("config OK: {}", path.display());
    println!("  listen:   ws://{}{}", config.listen_addr, SOCKET_PATH);
    println!("  rpc:      {}", config.rpc.url);
    println!("  contract: {}", config.contract.address);
    println!("  archive:  {}", config.archive.path);
    println!("  window:   {}s", config.relay.flush_window_seconds);
    println!("  tracked events:");
    for kind in &config.relay.tracked_event_kinds {
        let spec = abi
            .event(kind)
            .with_context(|| format!("event '{kind}' is not declared in the ABI"))?;
        println!("    {:<20} {}", kind, spec.topic0);
    }
    Ok(())
}

async fn cmd_archive(path: PathBuf, kind: Option<String>, totals: bool, json: bool) -> Result<()> {
    let config = load_config(&path)?;
    let archive = SqliteArchive::open(&config.archive.path)
        .await
        .with_context(|| format!("opening archive {}", config.archive.path))?;

    if totals {
        let totals = archive.totals().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&totals)?);
        } else {
            for (kind, total) in &totals {
                println!("{kind:<20} {total}");
            }
        }
        return Ok(());
    }

    let kind = kind.map(EventKind::new);
    let records = archive.records(kind.as_ref()).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("no archived windows");
    } else {
        println!("{:<25} {:<20} {}", "timestamp", "type", "times");
        for r in &records {
            println!(
                "{:<25} {:<20} {}",
                r.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                r.kind,
                r.times
            );
        }
    }
    Ok(())
}

fn cmd_info() {
    let defaults = RelayConfig::default();
    println!("ChainRelay v{}", env!("CARGO_PKG_VERSION"));
    println!("  WebSocket endpoint: {SOCKET_PATH}");
    println!("  HTTP endpoints: /health, /archive?type=<EventName>");
    println!("  Default flush window: {}s", defaults.flush_window_seconds);
    println!("  Default per-kind poll delay: {}s", defaults.per_kind_poll_delay_seconds);
    println!("  Default poll timeout: {}s", defaults.poll_timeout_seconds);
    println!(
        "  Default tracked events: {}",
        defaults
            .tracked_event_kinds
            .iter()
            .map(EventKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Archive backend: SQLite (feature: sqlite)");
}
