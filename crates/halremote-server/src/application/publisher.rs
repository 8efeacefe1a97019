//! UpdatePublisher: snapshot-on-subscribe and per-tick incremental diffs.
//!
//! The publisher observes subscription events from the update endpoint
//! (every new subscribe, the last unsubscribe per topic) and a fixed-interval
//! scan tick.  It depends only on the [`UpdateTransmitter`] trait and the
//! registry, so the whole publication state machine is unit-testable without
//! sockets.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use halremote_core::protocol::codec::encode_message_now;
use halremote_core::protocol::messages::{PinDelta, PinSnapshot};
use halremote_core::{HalMessage, Pin};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::registry::{CompState, ComponentRegistry};

/// Trait for delivering an encoded status message to every subscriber of a
/// topic.
///
/// The infrastructure implementation fans out over TCP; test
/// implementations record calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpdateTransmitter: Send + Sync {
    /// Sends a fully encoded protocol message on `topic`.
    async fn publish(&self, topic: &str, bytes: Vec<u8>) -> Result<(), String>;
}

/// Publishes full and incremental updates for subscribed components.
pub struct UpdatePublisher {
    transmitter: Arc<dyn UpdateTransmitter>,
    /// Identifies this authority process on full updates so clients can
    /// detect a restart.
    instance: Uuid,
    /// Topics with at least one live subscriber, in stable order so tick
    /// output is deterministic.
    subscribed: BTreeSet<String>,
}

impl UpdatePublisher {
    pub fn new(transmitter: Arc<dyn UpdateTransmitter>, instance: Uuid) -> Self {
        Self {
            transmitter,
            instance,
            subscribed: BTreeSet::new(),
        }
    }

    /// The authority instance id stamped on full updates.
    pub fn instance(&self) -> Uuid {
        self.instance
    }

    /// Handles one new subscription to `topic`.
    ///
    /// Unknown component: publishes a `SubscribeError` on the topic and does
    /// not create anything — binding is a command-channel operation, not
    /// implicit via subscription.  Known component: binds it (idempotent)
    /// and publishes one full snapshot.  Every subscriber of the topic
    /// receives the snapshot; late joiners on a live topic simply see an
    /// extra full update, which re-bases their mirror harmlessly.
    pub async fn handle_subscribe(&mut self, registry: &mut ComponentRegistry, topic: &str) {
        if !registry.contains(topic) {
            warn!(topic, "subscribe to unknown component");
            let note = format!("component {topic} does not exist");
            self.send(topic, &HalMessage::SubscribeError { note }, 0).await;
            return;
        }

        registry.bind_existing(topic);
        self.subscribed.insert(topic.to_string());
        self.publish_full(registry, topic).await;
    }

    /// Handles the last subscriber of `topic` going away.
    ///
    /// The component returns to UNBOUND and drops out of the tick scan; its
    /// pins stay in memory.  Resource reclamation, not correctness.
    pub fn handle_last_unsubscribe(&mut self, registry: &mut ComponentRegistry, topic: &str) {
        if self.subscribed.remove(topic) {
            registry.unbind(topic);
        }
    }

    /// One scan tick: publishes an incremental update for every subscribed,
    /// bound component with pending changes.
    pub async fn tick(&mut self, registry: &mut ComponentRegistry) {
        let topics: Vec<String> = self.subscribed.iter().cloned().collect();
        for topic in topics {
            let bound = registry
                .component(&topic)
                .is_some_and(|c| c.state() == CompState::Bound);
            if !bound {
                continue;
            }

            let changed = registry.changed_pins(&topic);
            if changed.is_empty() {
                continue;
            }

            let pins = changed.iter().map(delta_record).collect();
            let serial = match registry.component_mut(&topic) {
                Some(comp) => comp.next_serial(),
                None => continue,
            };
            debug!(%topic, serial, pins = changed.len(), "incremental update");
            self.send(&topic, &HalMessage::IncrementalUpdate { pins }, serial)
                .await;
        }
    }

    /// Publishes one full snapshot of `topic` and re-bases its diff
    /// baseline so the next tick reports only changes subscribers have not
    /// seen.
    async fn publish_full(&self, registry: &mut ComponentRegistry, topic: &str) {
        let (pins, serial) = match registry.component_mut(topic) {
            Some(comp) => {
                let pins: Vec<PinSnapshot> =
                    comp.pins().iter().map(snapshot_record).collect();
                comp.pins_mut().rebase();
                (pins, comp.next_serial())
            }
            None => return,
        };
        debug!(topic, serial, pins = pins.len(), "full update");
        let message = HalMessage::FullUpdate {
            instance: self.instance,
            pins,
        };
        self.send(topic, &message, serial).await;
    }

    async fn send(&self, topic: &str, message: &HalMessage, serial: u64) {
        match encode_message_now(message, serial) {
            Ok(bytes) => {
                if let Err(e) = self.transmitter.publish(topic, bytes).await {
                    error!(topic, error = %e, "failed to publish update");
                }
            }
            Err(e) => error!(topic, error = %e, "failed to encode update"),
        }
    }
}

fn snapshot_record(pin: &Pin) -> PinSnapshot {
    PinSnapshot {
        handle: pin.handle,
        name: pin.name.clone(),
        pin_type: pin.pin_type,
        linked: pin.linked,
        value: pin.value,
    }
}

fn delta_record(pin: &Pin) -> PinDelta {
    PinDelta {
        handle: pin.handle,
        linked: pin.linked,
        value: pin.value,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
