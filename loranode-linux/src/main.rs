// loranode Linux daemon: file-backed session store, command file, MAC bridge over TCP.

mod bridge;
mod config;
mod decrypt;
mod fsutil;
mod sink;
mod source;
mod store;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use loranode_core::wire::decode_event;
use loranode_core::{
    connection, DownlinkProcessor, NodeCore, NodeError, SessionStore, UplinkScheduler,
    ValidatedCommand,
};
use tracing_subscriber::EnvFilter;

use crate::bridge::{BridgeConnection, MacLink};
use crate::config::Config;
use crate::decrypt::{load_command_key, SubprocessDecryptor};
use crate::sink::FileCommandSink;
use crate::source::FileSource;
use crate::store::FileSessionStore;

#[derive(Debug, Parser)]
#[command(name = "loranode-linux", version, about = "LoRaWAN node daemon")]
struct Args {
    /// Config file (default: ~/.config/loranode/config.toml, then /etc/loranode/config.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Measurement file read every uplink cycle.
    #[arg(short = 'o', long)]
    measurement: Option<PathBuf>,
    /// Uplink interval in seconds.
    #[arg(short = 't', long)]
    interval: Option<u64>,
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Check a command string against the accepted grammar.
    Validate { command: String },
    /// Print the persisted frame counters.
    Session,
}

type Node = NodeCore<FileSessionStore, SubprocessDecryptor, FileCommandSink>;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Some(Cmd::Validate { command }) => return validate(&command),
        Some(Cmd::Session) => {
            let cfg = config::load(args.config.as_deref())?;
            return print_session(&cfg);
        }
        None => {}
    }

    let mut cfg = config::load(args.config.as_deref())?;
    if let Some(m) = args.measurement {
        cfg.measurement_file = m;
    }
    if let Some(t) = args.interval {
        if t == 0 {
            bail!("--interval must be a positive number of seconds");
        }
        cfg.send_interval_secs = t;
    }
    run(cfg)
}

fn validate(command: &str) -> anyhow::Result<()> {
    match ValidatedCommand::parse(command) {
        Ok(cmd) => {
            println!("valid: {:?}", cmd.verb());
            Ok(())
        }
        Err(e) => {
            eprintln!("{e}");
            eprintln!("accepted commands:");
            for usage in loranode_core::command::USAGE {
                eprintln!("  {usage}");
            }
            bail!("invalid command")
        }
    }
}

fn session_store(cfg: &Config) -> FileSessionStore {
    let store = FileSessionStore::new(&cfg.counters_file);
    match &cfg.keys_file {
        Some(k) => store.with_keys_file(k),
        None => store,
    }
}

fn read_connection(cfg: &Config) -> anyhow::Result<connection::ConnectionConfig> {
    let text = std::fs::read_to_string(&cfg.connection_file)
        .with_context(|| format!("reading {}", cfg.connection_file.display()))?;
    connection::parse(&text)
        .with_context(|| format!("parsing {}", cfg.connection_file.display()))
}

fn print_session(cfg: &Config) -> anyhow::Result<()> {
    let conn = read_connection(cfg)?;
    let store = session_store(cfg);
    let session = store
        .load(conn.session_keys())
        .with_context(|| format!("loading {}", store.counters_path().display()))?;
    println!("device_address {:08x}", session.device_address());
    println!("uplink_counter {}", session.uplink_counter);
    println!("downlink_counter {}", session.downlink_counter);
    Ok(())
}

fn run(cfg: Config) -> anyhow::Result<()> {
    let conn = read_connection(&cfg)?;
    tracing::info!(
        app_eui = %hex::encode(conn.app_eui),
        dev_eui = %hex::encode(conn.dev_eui),
        device_address = %format!("{:08x}", conn.device_address),
        "connection config loaded"
    );

    let mut decryptor = SubprocessDecryptor::new(
        &cfg.decrypt_program,
        cfg.decrypt_args.clone(),
        Duration::from_secs(cfg.decrypt_timeout_secs),
    );
    if let Some(path) = &cfg.command_key_file {
        let key = load_command_key(path)
            .with_context(|| format!("reading command key {}", path.display()))?;
        decryptor = decryptor.with_key_override(key);
    }
    let downlink = DownlinkProcessor::new(decryptor, FileCommandSink::new(&cfg.command_file));

    let mut scheduler = UplinkScheduler::new(cfg.uplink_port, cfg.payload_encoding);
    scheduler.set_reset_after_pending(cfg.reset_after_pending_cycles);

    let mut node = NodeCore::start(session_store(&cfg), conn.session_keys(), downlink, scheduler);
    node.set_net_id(cfg.net_id);
    let source = FileSource::new(&cfg.measurement_file);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run_loop(&cfg, &mut node, &source))
}

async fn run_loop(cfg: &Config, node: &mut Node, source: &FileSource) -> anyhow::Result<()> {
    let mut conn = BridgeConnection::connect(&cfg.mac_endpoint)
        .await
        .with_context(|| format!("connecting to mac at {}", cfg.mac_endpoint))?;
    tracing::info!(endpoint = %cfg.mac_endpoint, "connected to mac");

    let mut link = MacLink::new();
    node.establish(&mut link)?;
    conn.flush(&mut link).await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(cfg.send_interval_secs));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match node.on_timer(source, &mut link) {
                    Ok(outcome) => tracing::debug!(?outcome, "uplink cycle"),
                    Err(NodeError::Store(e)) => return Err(e).context("persisting session"),
                    Err(NodeError::Mac(e)) => tracing::warn!(error = %e, "mac reset failed"),
                }
            }
            line = conn.next_line() => {
                let Some(line) = line.context("reading from mac")? else {
                    bail!("mac closed the connection");
                };
                match decode_event(&line) {
                    Ok(event) => {
                        link.observe(&event);
                        if let Some(outcome) = node.on_event(event).context("persisting session")? {
                            tracing::debug!(?outcome, "downlink handled");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, line = %line, "unreadable mac event"),
                }
            }
            res = &mut shutdown => {
                res?;
                tracing::info!("shutting down");
                return Ok(());
            }
        }
        conn.flush(&mut link).await.context("writing to mac")?;
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
