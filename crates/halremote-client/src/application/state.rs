//! RemoteComponent: the client connection state machine.
//!
//! This is the piece a consumer embeds.  It is deliberately free of
//! sockets: every method consumes a decoded message or a timer tick and
//! returns the [`ClientAction`]s to perform, while observable conditions
//! are pushed on an event channel.  The infrastructure layer (or a test)
//! executes the actions.
//!
//! # The two liveness states (for beginners)
//!
//! `cstate` and `sstate` are independent on purpose, so an embedding UI can
//! distinguish "can't reach the command server" from "not yet receiving
//! status updates":
//!
//! ```text
//! cstate: DOWN ──ready()──► TRYING ──BIND_CONFIRM──► UP
//!                  ▲                                  │
//!                  └──── heartbeat timeout / reject ──┘
//!
//! sstate: DOWN ──subscribe──► TRYING ──FULL_UPDATE──► UP
//!                  ▲                                  │
//!                  └── serial gap / SUBSCRIBE_ERROR ──┘
//! ```
//!
//! # Desync recovery
//!
//! On an update-serial gap the machine resubscribes automatically: it
//! emits `Desynced`, drops `sstate` to TRYING, and issues an unsubscribe
//! plus subscribe so the authority answers with a fresh full snapshot.

use halremote_core::{HalMessage, PinDir, PinType, PinValue};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::mirror::{MirrorError, PinChange, PinMirror};

/// Liveness of one channel, observable by the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Down,
    Trying,
    Up,
}

/// Typed change events delivered to the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Command-channel liveness changed.
    CommandState(ChannelState),
    /// Status-channel liveness changed.
    StatusState(ChannelState),
    /// The mirror applied a full snapshot; local OUT-pin changes are now
    /// forwarded upstream.
    Synced,
    /// A mirrored pin changed value.
    PinChanged(PinChange),
    /// The authority rejected the bind; binding is not retried
    /// automatically.
    BindRejected { note: String },
    /// The subscribed topic does not name a known component.
    SubscribeError { note: String },
    /// An update was lost; a resubscribe is already underway.
    Desynced { expected: u64, got: u64 },
    /// A PING went unanswered for a full heartbeat period.
    HeartbeatTimeout,
    /// The authority's instance id changed between full updates.
    AuthorityRestarted,
    /// The stream delivered something that can only be an implementation
    /// bug (e.g. an unknown handle in an in-sequence update).
    ProtocolViolation { note: String },
}

/// An action the embedding/infrastructure layer must perform.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Send a message on the command channel.
    SendCommand(HalMessage),
    /// Subscribe to a topic on the status channel.
    Subscribe(String),
    /// Unsubscribe from a topic on the status channel.
    Unsubscribe(String),
}

/// The embeddable remote-component state machine.
pub struct RemoteComponent {
    mirror: PinMirror,
    cstate: ChannelState,
    sstate: ChannelState,
    /// `ready()` has been called; a reconnect re-sends the bind.
    ready: bool,
    /// A PING is in flight without an acknowledgement.
    ping_outstanding: bool,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl RemoteComponent {
    /// Creates the state machine for `component` together with the event
    /// receiver for the embedding application.
    pub fn new(component: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                mirror: PinMirror::new(component),
                cstate: ChannelState::Down,
                sstate: ChannelState::Down,
                ready: false,
                ping_outstanding: false,
                events: tx,
            },
            rx,
        )
    }

    pub fn name(&self) -> &str {
        self.mirror.component()
    }

    pub fn cstate(&self) -> ChannelState {
        self.cstate
    }

    pub fn sstate(&self) -> ChannelState {
        self.sstate
    }

    pub fn mirror(&self) -> &PinMirror {
        &self.mirror
    }

    /// Declares a pin.  Must happen before [`ready`](Self::ready).
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::DuplicateName`].
    pub fn add_pin(&mut self, name: &str, pin_type: PinType, dir: PinDir) -> Result<(), MirrorError> {
        self.mirror.declare(name, pin_type, dir)
    }

    /// Marks the pin declaration complete and starts the bind handshake.
    pub fn ready(&mut self) -> Vec<ClientAction> {
        self.ready = true;
        self.set_cstate(ChannelState::Trying);
        vec![ClientAction::SendCommand(HalMessage::Bind {
            component: self.name().to_string(),
            pins: self.mirror.decls(),
        })]
    }

    /// The command channel (re)connected.  Re-sends the bind when `ready()`
    /// already ran; handles and subscriptions are then re-learned through
    /// the normal confirm/subscribe/full-update sequence.
    pub fn command_connected(&mut self) -> Vec<ClientAction> {
        self.ping_outstanding = false;
        if self.ready {
            self.set_cstate(ChannelState::Trying);
            vec![ClientAction::SendCommand(HalMessage::Bind {
                component: self.name().to_string(),
                pins: self.mirror.decls(),
            })]
        } else {
            Vec::new()
        }
    }

    /// The command channel was lost.  In-flight requests simply receive no
    /// reply; the transport's reconnect loop will call
    /// [`command_connected`](Self::command_connected).
    pub fn command_disconnected(&mut self) {
        self.ping_outstanding = false;
        self.set_cstate(ChannelState::Trying);
    }

    /// The status channel was lost.  The mirror stops forwarding local
    /// writes until the next full update.
    pub fn status_disconnected(&mut self) {
        self.mirror.reset_sync();
        self.set_sstate(ChannelState::Down);
    }

    /// Consumes one reply from the command channel.
    pub fn handle_command_message(&mut self, message: HalMessage) -> Vec<ClientAction> {
        match message {
            HalMessage::BindConfirm { component, pins } => {
                if component != self.name() {
                    warn!(
                        %component,
                        expected = self.name(),
                        "bind confirm for the wrong component"
                    );
                    return Vec::new();
                }
                debug!(%component, pins = pins.len(), "bind confirmed");
                self.mirror.confirm(&pins);
                self.set_cstate(ChannelState::Up);
                // The status channel starts delivering after this
                // subscribe; sstate stays TRYING until the snapshot lands.
                self.set_sstate(ChannelState::Trying);
                vec![ClientAction::Subscribe(self.name().to_string())]
            }

            HalMessage::BindReject { note } => {
                warn!(%note, "bind rejected");
                self.set_cstate(ChannelState::Down);
                self.emit(ClientEvent::BindRejected { note });
                // Retry policy, if any, belongs to the embedder.
                Vec::new()
            }

            HalMessage::PingAck => {
                self.ping_outstanding = false;
                // Traffic on the command channel proves liveness again.
                if self.cstate == ChannelState::Trying && self.ready {
                    self.set_cstate(ChannelState::Up);
                }
                Vec::new()
            }

            HalMessage::SetPinsReject { note } => {
                warn!(%note, "set pins rejected");
                self.emit(ClientEvent::ProtocolViolation { note });
                Vec::new()
            }

            other => {
                warn!(message_type = ?other.message_type(), "unexpected command reply dropped");
                Vec::new()
            }
        }
    }

    /// Consumes one message from the status channel.
    pub fn handle_status_message(
        &mut self,
        topic: &str,
        serial: u64,
        message: HalMessage,
    ) -> Vec<ClientAction> {
        if topic != self.name() {
            // The transport filters by subscription; anything else here is
            // another component's traffic and not ours to apply.
            return Vec::new();
        }

        match message {
            HalMessage::FullUpdate { instance, pins } => {
                match self.mirror.apply_full(serial, instance, &pins) {
                    Ok(applied) => {
                        self.set_sstate(ChannelState::Up);
                        if applied.restarted {
                            self.emit(ClientEvent::AuthorityRestarted);
                        }
                        for change in applied.changes {
                            self.emit(ClientEvent::PinChanged(change));
                        }
                        self.emit(ClientEvent::Synced);
                    }
                    Err(e) => {
                        warn!(error = %e, "full update could not be applied");
                        self.emit(ClientEvent::ProtocolViolation { note: e.to_string() });
                    }
                }
                Vec::new()
            }

            HalMessage::IncrementalUpdate { pins } => {
                match self.mirror.apply_incremental(serial, &pins) {
                    Ok(changes) => {
                        for change in changes {
                            self.emit(ClientEvent::PinChanged(change));
                        }
                        Vec::new()
                    }
                    Err(MirrorError::SerialGap { expected, got }) => {
                        self.emit(ClientEvent::Desynced { expected, got });
                        self.resubscribe()
                    }
                    Err(MirrorError::NotSynced) => {
                        // An old in-flight delta raced the resubscribe;
                        // the pending full update will supersede it.
                        debug!(serial, "dropping incremental update while unsynced");
                        Vec::new()
                    }
                    Err(e) => {
                        warn!(error = %e, "incremental update could not be applied");
                        self.emit(ClientEvent::ProtocolViolation { note: e.to_string() });
                        Vec::new()
                    }
                }
            }

            HalMessage::SubscribeError { note } => {
                warn!(%note, "subscribe error");
                self.set_sstate(ChannelState::Down);
                self.emit(ClientEvent::SubscribeError { note });
                Vec::new()
            }

            other => {
                warn!(message_type = ?other.message_type(), "unexpected status message dropped");
                Vec::new()
            }
        }
    }

    /// One heartbeat period elapsed.
    ///
    /// An unanswered PING from the previous period is a liveness timeout:
    /// `cstate` degrades to TRYING and the embedder is notified.  A fresh
    /// PING goes out either way so recovery is automatic once traffic
    /// resumes.
    pub fn heartbeat_tick(&mut self) -> Vec<ClientAction> {
        if !self.ready {
            return Vec::new();
        }
        if self.ping_outstanding {
            self.set_cstate(ChannelState::Trying);
            self.emit(ClientEvent::HeartbeatTimeout);
        }
        self.ping_outstanding = true;
        vec![ClientAction::SendCommand(HalMessage::Ping)]
    }

    /// Applies a local pin write from the embedding application and
    /// forwards it upstream when allowed.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::NotWritable`] for IN pins (no wire traffic is
    /// generated), plus the usual name/type errors.
    pub fn set_pin(&mut self, name: &str, value: PinValue) -> Result<Vec<ClientAction>, MirrorError> {
        match self.mirror.set_local(name, value)? {
            Some(write) => Ok(vec![ClientAction::SendCommand(HalMessage::SetPins {
                pins: vec![write],
            })]),
            None => Ok(Vec::new()),
        }
    }

    /// Unsubscribe + subscribe, awaiting a fresh full snapshot.
    fn resubscribe(&mut self) -> Vec<ClientAction> {
        self.mirror.reset_sync();
        self.set_sstate(ChannelState::Trying);
        vec![
            ClientAction::Unsubscribe(self.name().to_string()),
            ClientAction::Subscribe(self.name().to_string()),
        ]
    }

    fn set_cstate(&mut self, state: ChannelState) {
        if self.cstate != state {
            self.cstate = state;
            self.emit(ClientEvent::CommandState(state));
        }
    }

    fn set_sstate(&mut self, state: ChannelState) {
        if self.sstate != state {
            self.sstate = state;
            self.emit(ClientEvent::StatusState(state));
        }
    }

    fn emit(&self, event: ClientEvent) {
        // The embedder may have dropped the receiver; the machine keeps
        // running regardless.
        let _ = self.events.send(event);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
