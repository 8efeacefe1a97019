//! HALremote authority daemon — entry point.
//!
//! Wires together the service event loop, the two TCP endpoints, and the
//! registry event pump, then blocks until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()               -- TOML + CLI/env overrides
//!  └─ HalService::new()           -- registry + publisher on one loop
//!  └─ start services
//!       ├─ command endpoint       (TCP, request/reply)
//!       ├─ update endpoint        (TCP, topic pub/sub)
//!       └─ registry event pump    (bound/unbound logging)
//! ```
//!
//! # Usage
//!
//! ```text
//! halremoted [OPTIONS]
//!
//! Options:
//!   --config <PATH>       Config file path [default: platform config dir]
//!   --cmd-port <PORT>     Command endpoint port override
//!   --update-port <PORT>  Update endpoint port override
//!   --bind <ADDR>         Bind address override
//!   --tick-ms <MS>        Publisher scan interval override
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use halremote_server::application::publisher::UpdateTransmitter;
use halremote_server::application::registry::RegistryEvent;
use halremote_server::application::service::HalService;
use halremote_server::infrastructure::network::{
    start_command_endpoint, start_update_endpoint, UpdateFanout,
};
use halremote_server::infrastructure::storage::load_config;

/// HALremote authority daemon.
///
/// Serves BIND / PING / SET_PINS commands and publishes full and
/// incremental pin updates per component topic.
#[derive(Debug, Parser)]
#[command(name = "halremoted", about = "HALremote remote-component authority", version)]
struct Cli {
    /// Config file path.  Defaults to the platform config directory.
    #[arg(long, env = "HALREMOTED_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port of the command (request/reply) endpoint.
    #[arg(long, env = "HALREMOTED_CMD_PORT")]
    cmd_port: Option<u16>,

    /// TCP port of the update (publish/subscribe) endpoint.
    #[arg(long, env = "HALREMOTED_UPDATE_PORT")]
    update_port: Option<u16>,

    /// IP address to bind both listeners to.
    #[arg(long, env = "HALREMOTED_BIND")]
    bind: Option<String>,

    /// Publisher scan interval in milliseconds.
    #[arg(long, env = "HALREMOTED_TICK_MS")]
    tick_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("loading configuration")?;
    if let Some(port) = cli.cmd_port {
        config.network.cmd_port = port;
    }
    if let Some(port) = cli.update_port {
        config.network.update_port = port;
    }
    if let Some(bind) = cli.bind {
        config.network.bind_address = bind;
    }
    if let Some(tick) = cli.tick_ms {
        config.service.tick_ms = tick;
    }

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.service.log_level.clone())),
        )
        .init();

    info!("halremoted starting");

    let cmd_addr: SocketAddr = format!("{}:{}", config.network.bind_address, config.network.cmd_port)
        .parse()
        .context("invalid command endpoint address")?;
    let update_addr: SocketAddr = format!(
        "{}:{}",
        config.network.bind_address, config.network.update_port
    )
    .parse()
    .context("invalid update endpoint address")?;

    // Shutdown flag shared across all background services.
    let running = Arc::new(AtomicBool::new(true));

    // ── Service loop ──────────────────────────────────────────────────────────
    let fanout = Arc::new(UpdateFanout::new());
    let transmitter: Arc<dyn UpdateTransmitter> = fanout.clone();
    let (service, handle, mut registry_events) = HalService::new(
        transmitter,
        Duration::from_millis(config.service.tick_ms),
    );
    let service_task = tokio::spawn(service.run(Arc::clone(&running)));

    // ── Endpoints ─────────────────────────────────────────────────────────────
    start_command_endpoint(cmd_addr, handle.clone(), Arc::clone(&running))
        .await
        .map_err(|e| {
            error!("failed to start command endpoint: {e}");
            e
        })?;
    start_update_endpoint(update_addr, fanout, handle, Arc::clone(&running))
        .await
        .map_err(|e| {
            error!("failed to start update endpoint: {e}");
            e
        })?;

    // ── Registry event pump ───────────────────────────────────────────────────
    tokio::spawn(async move {
        while let Some(event) = registry_events.recv().await {
            match event {
                RegistryEvent::Bound { component } => info!(%component, "component bound"),
                RegistryEvent::Unbound { component } => info!(%component, "component unbound"),
            }
        }
    });

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("halremoted ready on cmd={cmd_addr} update={update_addr}.  Press Ctrl-C to exit.");

    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !running.load(Ordering::Relaxed) {
            break;
        }
    }

    // Give the service loop a moment to unwind (it unbinds all components).
    let _ = tokio::time::timeout(Duration::from_secs(2), service_task).await;

    info!("halremoted stopped");
    Ok(())
}
