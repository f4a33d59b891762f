//! crosschat-relay - multi-platform chat relay over a shared-memory ring
//!
//! `serve` owns the region and runs the pump plus one producer worker per
//! platform fed from stdin. `produce`, `inspect` and `reset-lock` attach to a
//! running server's region from a separate process.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing::{error, info, warn};

use crosschat_relay::config::RelayConfig;
use crosschat_relay::error::BroadcastError;
use crosschat_relay::Core::region::{init_global, RegionHandle, SharedRegion};
use crosschat_relay::Relay::{
    diagnostics, Broadcaster, Delivery, MemoryHistory, Producer, ProducerPool, Pump,
};
use crosschat_relay::Relay::Structs::{InboundPayload, Message, Platform};

/// Multi-platform chat relay over a lock-guarded shared-memory ring
#[derive(Parser)]
#[command(name = "crosschat-relay", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (overrides log_level with debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    region: RegionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct RegionArgs {
    /// Region name under /dev/shm
    #[arg(long, global = true)]
    region: Option<String>,

    /// Number of slots (serve only)
    #[arg(long, global = true)]
    capacity: Option<u32>,

    /// Bytes per slot (serve only)
    #[arg(long, global = true)]
    slot_size: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the region, run the pump, and relay JSON lines from stdin
    Serve,

    /// Submit one payload to a running server's region
    Produce {
        /// Platform route tag, e.g. twitch or youtube
        #[arg(short, long)]
        platform: Platform,

        /// Payload JSON; read from stdin when omitted
        payload: Option<String>,
    },

    /// Print lock state, cursors and queued messages
    Inspect,

    /// Force the region lock free after a holder died
    ResetLock,
}

/// One stdin line for `serve`: the inbound payload plus its route's platform.
#[derive(Deserialize)]
struct RoutedPayload {
    platform: String,
    #[serde(flatten)]
    payload: InboundPayload,
}

/// Writes every broadcast to stdout as `{"room": ..., "message": ...}`.
struct StdoutBroadcaster;

impl Broadcaster for StdoutBroadcaster {
    fn broadcast(&self, room: &str, message: &Message) -> Result<(), BroadcastError> {
        let line = serde_json::json!({ "room": room, "message": message });
        let mut out = io::stdout().lock();
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| BroadcastError {
                room: room.to_owned(),
                reason: e.to_string(),
            })
    }
}

fn setup_logging(config: &RelayConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RelayConfig::load(path.display().to_string())
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if let Some(name) = &cli.region.region {
        config.region.name = name.clone();
    }
    if let Some(capacity) = cli.region.capacity {
        config.region.capacity = capacity;
    }
    if let Some(slot_size) = cli.region.slot_size {
        config.region.slot_size = slot_size;
    }
    config.validate().context("Invalid configuration")?;

    setup_logging(&config, cli.verbose);

    match cli.command {
        Command::Serve => cmd_serve(&config),
        Command::Produce { platform, payload } => cmd_produce(&config, platform, payload),
        Command::Inspect => cmd_inspect(&config),
        Command::ResetLock => cmd_reset_lock(&config),
    }
}

fn attach(config: &RelayConfig) -> Result<SharedRegion> {
    if config.region.name.is_empty() {
        bail!("an anonymous region cannot be attached from another process, pass --region");
    }
    SharedRegion::attach(&RegionHandle::Named(config.region.name.clone()))
        .with_context(|| format!("Failed to attach region '{}'", config.region.name))
}

fn cmd_serve(config: &RelayConfig) -> Result<()> {
    let region = init_global(&config.region).context("Failed to create shared region")?;
    let (diag_tx, diag_rx) = diagnostics::channel();

    thread::Builder::new()
        .name("diagnostics".into())
        .spawn(move || {
            for diagnostic in diag_rx {
                match serde_json::to_string(&diagnostic) {
                    Ok(json) => warn!(target: "crosschat_relay::diagnostics", "{json}"),
                    Err(e) => error!(error = %e, "unprintable diagnostic"),
                }
            }
        })
        .context("Failed to spawn diagnostics thread")?;

    let history = Arc::new(MemoryHistory::new(config.history.limit));
    let pump = Pump::new(
        Arc::clone(&region),
        StdoutBroadcaster,
        Arc::clone(&history),
        config.pump.clone(),
        diag_tx.clone(),
    )
    .spawn()
    .context("Failed to start pump")?;

    let pool = Arc::new(ProducerPool::new(Arc::clone(&region), config.producer.clone(), diag_tx));

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")?;

    // The reader is not joined: it may be parked on a read that never returns
    let reader_pool = Arc::clone(&pool);
    thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || read_payloads(&reader_pool))
        .context("Failed to spawn stdin reader")?;

    info!(handle = ?region.handle(), "relay serving, press Ctrl+C to stop");
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    info!("shutting down");
    pool.shutdown();
    if pump.join().is_err() {
        error!("pump thread panicked");
    }
    region.unlink().context("Failed to unlink shared region")?;
    Ok(())
}

fn read_payloads(pool: &ProducerPool) {
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "stdin read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let routed: RoutedPayload = match serde_json::from_str(&line) {
            Ok(routed) => routed,
            Err(e) => {
                warn!(error = %e, "ignoring malformed payload line");
                continue;
            }
        };
        let platform = match routed.platform.parse::<Platform>() {
            Ok(platform) => platform,
            Err(e) => {
                warn!(error = %e, "ignoring payload");
                continue;
            }
        };
        if let Err(e) = pool.dispatch(platform, routed.payload) {
            error!(%platform, error = %e, "dispatch failed");
        }
    }
    info!("stdin closed, no more payloads");
}

fn cmd_produce(config: &RelayConfig, platform: Platform, payload: Option<String>) -> Result<()> {
    let json = match payload {
        Some(json) => json,
        None => io::read_to_string(io::stdin()).context("Failed to read payload from stdin")?,
    };
    let payload: InboundPayload = serde_json::from_str(&json).context("Payload is not valid JSON")?;

    let region = attach(config)?;
    let (diag_tx, diag_rx) = diagnostics::channel();
    let producer = Producer::new(Arc::new(region), config.producer.clone(), diag_tx);

    let delivery = producer.submit(platform, payload);
    drop(producer);
    for diagnostic in diag_rx {
        eprintln!("{}", serde_json::to_string(&diagnostic)?);
    }

    match delivery {
        Delivery::Enqueued { id } => {
            println!("enqueued {id}");
            Ok(())
        }
        Delivery::Rejected(reason) => bail!("rejected: {reason}"),
        Delivery::Dropped(reason) => bail!("dropped: {reason:?}"),
    }
}

fn cmd_inspect(config: &RelayConfig) -> Result<()> {
    let region = attach(config)?;
    let lock_held = region.lock().is_held();

    let (cursors, messages) = match region.lock_queue(config.producer.lock_timeout()) {
        Ok(queue) => (queue.cursors(), Some(queue.snapshot().context("Queue is corrupt")?)),
        Err(e) => {
            warn!(error = %e, "lock is busy, showing cursors without a snapshot");
            (region.queue().cursors(), None)
        }
    };

    let report = serde_json::json!({
        "region": config.region.name,
        "capacity": region.capacity(),
        "slot_size": region.slot_size(),
        "lock_held": lock_held,
        "cursors": cursors,
        "messages": messages,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_reset_lock(config: &RelayConfig) -> Result<()> {
    let region = attach(config)?;
    let lock = region.lock();
    if lock.is_held() {
        lock.release();
        warn!(region = %config.region.name, "forced lock release");
        println!("lock released");
    } else {
        println!("lock was already free");
    }
    Ok(())
}
