//! HALremote demo panel — entry point.
//!
//! A headless stand-in for a remote UI: declares the classic demo pin set,
//! binds the `demo` component, and then sits in the event loop logging every
//! inbound pin change while periodically nudging its own spinbutton value —
//! enough traffic to watch the full bind → snapshot → incremental-update
//! cycle against a running `halremoted`.
//!
//! # Message dispatch loop (for beginners)
//!
//! The `tokio::select!` loop is the heart of the client.  Nothing in it
//! blocks waiting for a reply; each arm handles one kind of scheduling
//! event:
//!
//! - a network event (reply or status message) → feed the state machine,
//!   execute the actions it returns;
//! - the heartbeat timer → send a PING, detect a dead authority;
//! - the demo timer → write a local OUT pin, which the state machine
//!   forwards upstream once synced.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use halremote_client::infrastructure::network::{
    ChannelConfig, CommandChannel, NetworkEvent, StatusChannel,
};
use halremote_client::{ClientAction, ClientEvent, RemoteComponent};
use halremote_core::{PinDir, PinType, PinValue};

/// Heartbeat period for the PING/PING_ACK liveness probe.
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(3);

/// How often the demo nudges its spinbutton pin.
const NUDGE_PERIOD: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("halremote-panel starting");

    // ── Remote component: the fake UI widgets ─────────────────────────────────
    let (mut component, mut client_events) = RemoteComponent::new("demo");
    component.add_pin("button", PinType::Bit, PinDir::Out)?;
    component.add_pin("spinbutton", PinType::Float, PinDir::Out)?;
    component.add_pin("led", PinType::Bit, PinDir::In)?;
    component.add_pin("speed", PinType::Float, PinDir::In)?;

    // ── Channels ──────────────────────────────────────────────────────────────
    let config = ChannelConfig::default();
    info!(
        client_id = %config.client_id,
        "connecting to cmd={} update={}", config.cmd_addr, config.update_addr
    );

    let running = Arc::new(AtomicBool::new(true));
    let (events_tx, mut network_events) = tokio::sync::mpsc::channel(128);

    let cmd = Arc::new(CommandChannel::new(config.clone()));
    let status = Arc::new(StatusChannel::new(config));
    cmd.clone().start(events_tx.clone(), Arc::clone(&running));
    status.clone().start(events_tx, Arc::clone(&running));

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut heartbeat = tokio::time::interval(HEARTBEAT_PERIOD);
    let mut nudge = tokio::time::interval(NUDGE_PERIOD);
    let mut spin_value = 3.14f64;
    let mut ready_sent = false;

    while running.load(Ordering::Relaxed) {
        tokio::select! {
            event = network_events.recv() => {
                let Some(event) = event else { break };
                let actions = match event {
                    NetworkEvent::CommandConnected => {
                        if ready_sent {
                            component.command_connected()
                        } else {
                            ready_sent = true;
                            component.ready()
                        }
                    }
                    NetworkEvent::CommandDisconnected => {
                        component.command_disconnected();
                        Vec::new()
                    }
                    NetworkEvent::CommandMessage(message) => {
                        component.handle_command_message(message)
                    }
                    NetworkEvent::StatusConnected => Vec::new(),
                    NetworkEvent::StatusDisconnected => {
                        component.status_disconnected();
                        Vec::new()
                    }
                    NetworkEvent::StatusMessage { topic, serial, message } => {
                        component.handle_status_message(&topic, serial, message)
                    }
                };
                execute(&cmd, &status, actions).await;
            }

            _ = heartbeat.tick() => {
                let actions = component.heartbeat_tick();
                execute(&cmd, &status, actions).await;
            }

            _ = nudge.tick() => {
                spin_value += 2.718;
                match component.set_pin("spinbutton", PinValue::Float(spin_value)) {
                    Ok(actions) => execute(&cmd, &status, actions).await,
                    Err(e) => warn!("could not set spinbutton: {e}"),
                }
            }

            Some(event) = client_events.recv() => {
                log_client_event(&event);
            }
        }
    }

    info!("halremote-panel stopped");
    Ok(())
}

/// Executes the actions returned by the state machine.
async fn execute(
    cmd: &Arc<CommandChannel>,
    status: &Arc<StatusChannel>,
    actions: Vec<ClientAction>,
) {
    for action in actions {
        match action {
            ClientAction::SendCommand(message) => cmd.send_message(&message).await,
            ClientAction::Subscribe(topic) => status.subscribe(&topic).await,
            ClientAction::Unsubscribe(topic) => status.unsubscribe(&topic).await,
        }
    }
}

fn log_client_event(event: &ClientEvent) {
    match event {
        ClientEvent::CommandState(state) => info!(?state, "command channel state"),
        ClientEvent::StatusState(state) => info!(?state, "status channel state"),
        ClientEvent::Synced => info!("mirror synced"),
        ClientEvent::PinChanged(change) => {
            info!(pin = %change.name, value = %change.value, linked = change.linked, "pin changed");
        }
        ClientEvent::BindRejected { note } => warn!(%note, "bind rejected"),
        ClientEvent::SubscribeError { note } => warn!(%note, "subscribe error"),
        ClientEvent::Desynced { expected, got } => {
            warn!(expected, got, "updates lost, resubscribing");
        }
        ClientEvent::HeartbeatTimeout => warn!("authority not answering pings"),
        ClientEvent::AuthorityRestarted => warn!("authority restarted"),
        ClientEvent::ProtocolViolation { note } => warn!(%note, "protocol violation"),
    }
}
