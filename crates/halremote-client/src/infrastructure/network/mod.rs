//! Network infrastructure for the client.
//!
//! Two independent connections to the authority, mirroring the two logical
//! channels of the protocol:
//!
//! - [`CommandChannel`] – request/reply.  Sends BIND / PING / SET_PINS,
//!   reads the replies.
//! - [`StatusChannel`] – subscribe-style.  Sends topic control frames,
//!   reads topic-tagged status messages.
//!
//! Both run a reconnect loop: when a connection drops, the owner is told
//! through a [`NetworkEvent`] (so the state machine can degrade its
//! liveness states) and the channel keeps retrying in the background.  The
//! status channel remembers its subscriptions and replays them after a
//! reconnect.
//!
//! Neither channel ever blocks the caller waiting for a reply — replies and
//! updates arrive as events on the shared channel, and correlation happens
//! by component/handle identity inside the messages.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use halremote_core::protocol::codec::{decode_message, encode_message_now};
use halremote_core::protocol::framing::{encode_subscription, SubscriptionAction};
use halremote_core::protocol::messages::{DEFAULT_CMD_PORT, DEFAULT_UPDATE_PORT, HEADER_SIZE};
use halremote_core::HalMessage;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{mpsc, Mutex},
    time,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for both channels.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Address of the authority's command endpoint.
    pub cmd_addr: SocketAddr,
    /// Address of the authority's update endpoint.
    pub update_addr: SocketAddr,
    /// Stable per-process identity string, for logging on both ends.
    pub client_id: String,
    /// Reconnect interval when a connection drops.
    pub reconnect_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            cmd_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_CMD_PORT)),
            update_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_UPDATE_PORT)),
            client_id: format!("halremote-client-{}", Uuid::new_v4()),
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

/// Events emitted by the network layer to the owner's select loop.
#[derive(Debug)]
pub enum NetworkEvent {
    CommandConnected,
    CommandDisconnected,
    /// A decoded reply arrived on the command channel.
    CommandMessage(HalMessage),
    StatusConnected,
    StatusDisconnected,
    /// A decoded status message arrived for `topic`.
    StatusMessage {
        topic: String,
        serial: u64,
        message: HalMessage,
    },
}

// ── Command channel ───────────────────────────────────────────────────────────

/// The request/reply connection to the authority.
pub struct CommandChannel {
    config: ChannelConfig,
    write_half: Arc<Mutex<Option<OwnedWriteHalf>>>,
}

impl CommandChannel {
    /// Creates a new (not yet connected) command channel.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            write_half: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts the reconnect loop.  Events are delivered on `events` until
    /// `running` clears.
    pub fn start(
        self: Arc<Self>,
        events: mpsc::Sender<NetworkEvent>,
        running: Arc<AtomicBool>,
    ) {
        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                match TcpStream::connect(self.config.cmd_addr).await {
                    Ok(stream) => {
                        info!(client_id = %self.config.client_id, "command channel connected to {}", self.config.cmd_addr);
                        let (read_half, write_half) = stream.into_split();
                        {
                            let mut guard = self.write_half.lock().await;
                            *guard = Some(write_half);
                        }
                        if events.send(NetworkEvent::CommandConnected).await.is_err() {
                            break;
                        }

                        read_command_loop(read_half, &events).await;

                        {
                            let mut guard = self.write_half.lock().await;
                            *guard = None;
                        }
                        if events.send(NetworkEvent::CommandDisconnected).await.is_err() {
                            break;
                        }
                        info!(
                            "command channel lost; reconnecting in {:?}",
                            self.config.reconnect_interval
                        );
                    }
                    Err(e) => {
                        warn!("could not connect command channel to {}: {e}", self.config.cmd_addr);
                    }
                }

                if running.load(Ordering::Relaxed) {
                    time::sleep(self.config.reconnect_interval).await;
                }
            }
        });
    }

    /// Encodes and sends a command message.  Silently skipped while
    /// disconnected — the reconnect handshake re-establishes state.
    pub async fn send_message(&self, msg: &HalMessage) {
        match encode_message_now(msg, 0) {
            Ok(bytes) => {
                let mut guard = self.write_half.lock().await;
                if let Some(ref mut w) = *guard {
                    if let Err(e) = w.write_all(&bytes).await {
                        warn!("failed to send command message: {e}");
                    }
                } else {
                    debug!("command channel down, dropping outbound message");
                }
            }
            Err(e) => warn!("failed to encode command message: {e}"),
        }
    }
}

/// Reads framed messages off the command connection until it closes.
async fn read_command_loop(mut reader: OwnedReadHalf, events: &mpsc::Sender<NetworkEvent>) {
    loop {
        let mut header = [0u8; HEADER_SIZE];
        if let Err(e) = reader.read_exact(&mut header).await {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                warn!("command channel read error: {e}");
            }
            break;
        }
        let payload_len = u32::from_be_bytes(header[4..8].try_into().unwrap()) as usize;
        let mut message = header.to_vec();
        message.resize(HEADER_SIZE + payload_len, 0);
        if payload_len > 0 {
            if let Err(e) = reader.read_exact(&mut message[HEADER_SIZE..]).await {
                warn!("command payload read error: {e}");
                break;
            }
        }

        match decode_message(&message) {
            Ok((decoded, _)) => {
                if events
                    .send(NetworkEvent::CommandMessage(decoded.message))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => warn!("dropping undecodable command reply: {e}"),
        }
    }
}

// ── Status channel ────────────────────────────────────────────────────────────

/// The subscribe-style connection to the authority's update endpoint.
pub struct StatusChannel {
    config: ChannelConfig,
    write_half: Arc<Mutex<Option<OwnedWriteHalf>>>,
    /// Topics to (re)subscribe; replayed after every reconnect.
    topics: Arc<Mutex<HashSet<String>>>,
}

impl StatusChannel {
    /// Creates a new (not yet connected) status channel.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            write_half: Arc::new(Mutex::new(None)),
            topics: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Starts the reconnect loop.  Events are delivered on `events` until
    /// `running` clears.
    pub fn start(
        self: Arc<Self>,
        events: mpsc::Sender<NetworkEvent>,
        running: Arc<AtomicBool>,
    ) {
        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                match TcpStream::connect(self.config.update_addr).await {
                    Ok(stream) => {
                        info!("status channel connected to {}", self.config.update_addr);
                        let (read_half, write_half) = stream.into_split();
                        {
                            let mut guard = self.write_half.lock().await;
                            *guard = Some(write_half);
                        }

                        // Replay standing subscriptions so the publisher
                        // answers each with a fresh full snapshot.
                        let standing: Vec<String> =
                            self.topics.lock().await.iter().cloned().collect();
                        for topic in standing {
                            self.send_subscription(&SubscriptionAction::Subscribe(topic)).await;
                        }

                        if events.send(NetworkEvent::StatusConnected).await.is_err() {
                            break;
                        }

                        read_status_loop(read_half, &events).await;

                        {
                            let mut guard = self.write_half.lock().await;
                            *guard = None;
                        }
                        if events.send(NetworkEvent::StatusDisconnected).await.is_err() {
                            break;
                        }
                        info!(
                            "status channel lost; reconnecting in {:?}",
                            self.config.reconnect_interval
                        );
                    }
                    Err(e) => {
                        warn!("could not connect status channel to {}: {e}", self.config.update_addr);
                    }
                }

                if running.load(Ordering::Relaxed) {
                    time::sleep(self.config.reconnect_interval).await;
                }
            }
        });
    }

    /// Subscribes to `topic` (now, and again after every reconnect).
    pub async fn subscribe(&self, topic: &str) {
        self.topics.lock().await.insert(topic.to_string());
        self.send_subscription(&SubscriptionAction::Subscribe(topic.to_string()))
            .await;
    }

    /// Unsubscribes from `topic`.
    pub async fn unsubscribe(&self, topic: &str) {
        self.topics.lock().await.remove(topic);
        self.send_subscription(&SubscriptionAction::Unsubscribe(topic.to_string()))
            .await;
    }

    async fn send_subscription(&self, action: &SubscriptionAction) {
        let bytes = encode_subscription(action);
        let mut guard = self.write_half.lock().await;
        if let Some(ref mut w) = *guard {
            if let Err(e) = w.write_all(&bytes).await {
                warn!("failed to send subscription frame: {e}");
            }
        } else {
            debug!(topic = action.topic(), "status channel down, subscription queued");
        }
    }
}

/// Reads publication frames (`[topic_len:u16][topic][message]`) until the
/// connection closes.
async fn read_status_loop(mut reader: OwnedReadHalf, events: &mpsc::Sender<NetworkEvent>) {
    loop {
        // Topic prefix.
        let mut len_buf = [0u8; 2];
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                warn!("status channel read error: {e}");
            }
            break;
        }
        let topic_len = u16::from_be_bytes(len_buf) as usize;
        let mut topic_buf = vec![0u8; topic_len];
        if reader.read_exact(&mut topic_buf).await.is_err() {
            break;
        }
        let topic = match String::from_utf8(topic_buf) {
            Ok(t) => t,
            Err(e) => {
                warn!("dropping publication with non-UTF-8 topic: {e}");
                // Framing is lost at this point; force a reconnect.
                break;
            }
        };

        // Embedded message: header, then payload.
        let mut header = [0u8; HEADER_SIZE];
        if reader.read_exact(&mut header).await.is_err() {
            break;
        }
        let payload_len = u32::from_be_bytes(header[4..8].try_into().unwrap()) as usize;
        let mut message = header.to_vec();
        message.resize(HEADER_SIZE + payload_len, 0);
        if payload_len > 0 && reader.read_exact(&mut message[HEADER_SIZE..]).await.is_err() {
            break;
        }

        match decode_message(&message) {
            Ok((decoded, _)) => {
                let event = NetworkEvent::StatusMessage {
                    topic,
                    serial: decoded.serial,
                    message: decoded.message,
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(%topic, "dropping undecodable status message: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
