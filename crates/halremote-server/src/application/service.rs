//! The authority's single-threaded event loop.
//!
//! All mutation of the component table happens on this loop: command
//! requests, subscription events, and the scan timer are delivered as
//! messages, so no per-component locking is needed anywhere in the
//! authority.
//!
//! # Event sources
//!
//! ```text
//!  command endpoint ──┐
//!  update endpoint  ──┼──► mpsc ──► HalService::run ──► UpdateTransmitter
//!  interval timer   ──┘              (registry, publisher)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use halremote_core::HalMessage;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::command::handle_command;
use crate::application::publisher::{UpdatePublisher, UpdateTransmitter};
use crate::application::registry::{ComponentRegistry, RegistryEvent};

/// A request delivered to the service loop.
#[derive(Debug)]
pub enum ServiceRequest {
    /// One command-channel message; the reply (if any) goes back through
    /// `reply`.
    Command {
        client: String,
        message: HalMessage,
        reply: oneshot::Sender<Option<HalMessage>>,
    },
    /// A new subscription to `topic` was observed on the update endpoint.
    Subscribe { topic: String },
    /// The last subscriber of `topic` went away.
    LastUnsubscribe { topic: String },
}

/// Handle used by the endpoints to reach the service loop.
pub type ServiceHandle = mpsc::Sender<ServiceRequest>;

/// The authority event loop: owns the registry and the publisher.
pub struct HalService {
    registry: ComponentRegistry,
    publisher: UpdatePublisher,
    requests: mpsc::Receiver<ServiceRequest>,
    tick_interval: Duration,
}

impl HalService {
    /// Builds the service.  Returns the service itself, the request handle
    /// for the endpoints, and the receiver for bound/unbound notifications.
    pub fn new(
        transmitter: Arc<dyn UpdateTransmitter>,
        tick_interval: Duration,
    ) -> (
        Self,
        ServiceHandle,
        mpsc::UnboundedReceiver<RegistryEvent>,
    ) {
        let (registry, events) = ComponentRegistry::new();
        let publisher = UpdatePublisher::new(transmitter, Uuid::new_v4());
        let (tx, rx) = mpsc::channel(128);
        (
            Self {
                registry,
                publisher,
                requests: rx,
                tick_interval,
            },
            tx,
            events,
        )
    }

    /// Runs until `running` clears or every request handle is dropped.
    ///
    /// On exit, unbinds every bound component so a restarted authority
    /// starts from a clean slate.
    pub async fn run(self, running: Arc<AtomicBool>) {
        let Self {
            mut registry,
            mut publisher,
            mut requests,
            tick_interval,
        } = self;

        info!(tick_ms = tick_interval.as_millis() as u64, "service loop started");
        let mut ticker = tokio::time::interval(tick_interval);
        // A stalled loop should not fire a burst of catch-up ticks; each
        // tick diffs against the current state anyway.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            if !running.load(Ordering::Relaxed) {
                break;
            }
            tokio::select! {
                request = requests.recv() => {
                    match request {
                        Some(request) => dispatch(&mut registry, &mut publisher, request).await,
                        None => break, // all endpoints gone
                    }
                }
                _ = ticker.tick() => {
                    publisher.tick(&mut registry).await;
                }
            }
        }

        registry.unbind_all();
        info!("service loop stopped");
    }

    /// Direct access for in-process embedding and tests: the pins live
    /// here, and the publisher picks changes up on the next tick.
    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    /// Drives one publisher tick without waiting for the timer.
    pub async fn force_tick(&mut self) {
        self.publisher.tick(&mut self.registry).await;
    }

    /// Applies one service request inline.  Used by tests and in-process
    /// embedders that do not go through the mpsc channel.
    pub async fn apply(&mut self, request: ServiceRequest) {
        dispatch(&mut self.registry, &mut self.publisher, request).await;
    }
}

/// Routes one request to the command handler or the publisher.
async fn dispatch(
    registry: &mut ComponentRegistry,
    publisher: &mut UpdatePublisher,
    request: ServiceRequest,
) {
    match request {
        ServiceRequest::Command {
            client,
            message,
            reply,
        } => {
            debug!(%client, message_type = ?message.message_type(), "command");
            let response = handle_command(registry, &client, message);
            // The endpoint may have dropped the connection meanwhile.
            let _ = reply.send(response);
        }
        ServiceRequest::Subscribe { topic } => {
            publisher.handle_subscribe(registry, &topic).await;
        }
        ServiceRequest::LastUnsubscribe { topic } => {
            publisher.handle_last_unsubscribe(registry, &topic);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
