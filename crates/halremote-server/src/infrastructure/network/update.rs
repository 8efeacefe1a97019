//! The update (publish/subscribe) TCP endpoint and fan-out.
//!
//! Subscribers send 1-byte-tagged topic control frames (subscribe /
//! unsubscribe); the server pushes `[topic][message]` publication frames to
//! every connection subscribed to the topic.  Subscription events are
//! forwarded to the service loop so the publisher can send a full snapshot
//! on each new subscription and unbind a component when its last subscriber
//! departs.
//!
//! # Slow subscribers
//!
//! Each connection has a bounded outbound queue.  When a subscriber cannot
//! keep up, frames are dropped here — the client sees the loss as an update
//! serial gap and resynchronizes with a fresh snapshot.  This keeps one
//! stalled UI from blocking the scan loop for everyone else.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use halremote_core::protocol::framing::{decode_subscription, encode_publication, SubscriptionAction};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::application::publisher::UpdateTransmitter;
use crate::application::service::{ServiceHandle, ServiceRequest};
use crate::infrastructure::network::EndpointError;

/// Outbound queue depth per subscriber connection.
const SUBSCRIBER_QUEUE: usize = 64;

type FrameSender = mpsc::Sender<Arc<Vec<u8>>>;

/// Topic-indexed set of subscriber connections.
///
/// Constructed once by the process entry point and shared between the
/// listener (which registers connections) and the publisher (which writes
/// through the [`UpdateTransmitter`] impl).
#[derive(Default)]
pub struct UpdateFanout {
    topics: Mutex<HashMap<String, HashMap<u64, FrameSender>>>,
}

impl UpdateFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `conn` as a subscriber of `topic`.
    fn add(&self, topic: &str, conn: u64, sender: FrameSender) {
        self.topics
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .insert(conn, sender);
    }

    /// Removes `conn` from `topic`.  Returns `true` if that was the last
    /// subscriber of the topic.
    fn remove(&self, topic: &str, conn: u64) -> bool {
        let mut topics = self.topics.lock().unwrap();
        if let Some(subs) = topics.get_mut(topic) {
            subs.remove(&conn);
            if subs.is_empty() {
                topics.remove(topic);
                return true;
            }
        }
        false
    }

    /// Number of live subscribers of `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap()
            .get(topic)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl UpdateTransmitter for UpdateFanout {
    async fn publish(&self, topic: &str, bytes: Vec<u8>) -> Result<(), String> {
        let frame = Arc::new(encode_publication(topic, &bytes));
        let senders: Vec<FrameSender> = {
            let topics = self.topics.lock().unwrap();
            match topics.get(topic) {
                Some(subs) => subs.values().cloned().collect(),
                None => return Ok(()), // nobody listening
            }
        };
        for sender in senders {
            match sender.try_send(Arc::clone(&frame)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Dropped frame surfaces as a serial gap at the client.
                    warn!(topic, "subscriber queue full, dropping update frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Connection is going away; its reader task cleans up.
                }
            }
        }
        Ok(())
    }
}

/// Binds the update listener and spawns the accept loop.
///
/// # Errors
///
/// Returns [`EndpointError::BindFailed`] if the address cannot be bound.
pub async fn start_update_endpoint(
    addr: SocketAddr,
    fanout: Arc<UpdateFanout>,
    service: ServiceHandle,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, EndpointError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| EndpointError::BindFailed { addr, source })?;
    info!("update endpoint listening on {addr}");

    let conn_counter = Arc::new(AtomicU64::new(0));
    let handle = tokio::spawn(async move {
        while running.load(Ordering::Relaxed) {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let conn = conn_counter.fetch_add(1, Ordering::Relaxed);
                            debug!(%peer, conn, "subscriber connected");
                            let fanout = Arc::clone(&fanout);
                            let service = service.clone();
                            tokio::spawn(handle_subscriber(stream, peer, conn, fanout, service));
                        }
                        Err(e) => warn!("update accept failed: {e}"),
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            }
        }
        info!("update endpoint stopped");
    });
    Ok(handle)
}

/// Serves one subscriber connection: applies its subscription control
/// frames and streams publication frames back until it disconnects.
async fn handle_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    conn: u64,
    fanout: Arc<UpdateFanout>,
    service: ServiceHandle,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Arc<Vec<u8>>>(SUBSCRIBER_QUEUE);

    // Writer half: drain the outbound queue onto the socket.
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    // Reader half: subscription control frames, [tag:1][len:u16][topic].
    let mut subscribed: HashSet<String> = HashSet::new();
    loop {
        let mut prefix = [0u8; 3];
        if let Err(e) = reader.read_exact(&mut prefix).await {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                warn!(%peer, "subscriber read error: {e}");
            }
            break;
        }
        let topic_len = u16::from_be_bytes([prefix[1], prefix[2]]) as usize;
        let mut frame = prefix.to_vec();
        frame.resize(3 + topic_len, 0);
        if topic_len > 0 {
            if let Err(e) = reader.read_exact(&mut frame[3..]).await {
                warn!(%peer, "subscriber topic read error: {e}");
                break;
            }
        }

        let action = match decode_subscription(&frame) {
            Ok((action, _)) => action,
            Err(e) => {
                warn!(%peer, "dropping malformed subscription frame: {e}");
                continue;
            }
        };

        match action {
            SubscriptionAction::Subscribe(topic) => {
                debug!(%peer, %topic, "subscribe");
                fanout.add(&topic, conn, tx.clone());
                subscribed.insert(topic.clone());
                // Every subscribe is forwarded so the publisher can answer
                // it with a full snapshot.
                if service.send(ServiceRequest::Subscribe { topic }).await.is_err() {
                    break;
                }
            }
            SubscriptionAction::Unsubscribe(topic) => {
                debug!(%peer, %topic, "unsubscribe");
                subscribed.remove(&topic);
                if fanout.remove(&topic, conn)
                    && service
                        .send(ServiceRequest::LastUnsubscribe { topic })
                        .await
                        .is_err()
                {
                    break;
                }
            }
        }
    }

    // Connection gone: drop its remaining subscriptions, notifying the
    // service for every topic it was the last subscriber of.
    for topic in subscribed {
        if fanout.remove(&topic, conn) {
            let _ = service
                .send(ServiceRequest::LastUnsubscribe { topic })
                .await;
        }
    }
    writer_task.abort();
    debug!(%peer, conn, "subscriber disconnected");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> FrameSender {
        mpsc::channel(4).0
    }

    #[test]
    fn test_fanout_counts_subscribers_per_topic() {
        let fanout = UpdateFanout::new();
        fanout.add("demo", 1, sender());
        fanout.add("demo", 2, sender());
        fanout.add("other", 3, sender());
        assert_eq!(fanout.subscriber_count("demo"), 2);
        assert_eq!(fanout.subscriber_count("other"), 1);
        assert_eq!(fanout.subscriber_count("ghost"), 0);
    }

    #[test]
    fn test_fanout_remove_reports_last_subscriber() {
        let fanout = UpdateFanout::new();
        fanout.add("demo", 1, sender());
        fanout.add("demo", 2, sender());
        assert!(!fanout.remove("demo", 1), "one subscriber remains");
        assert!(fanout.remove("demo", 2), "last subscriber left");
        assert!(!fanout.remove("demo", 2), "already gone");
    }

    #[tokio::test]
    async fn test_publish_delivers_framed_message_to_subscriber() {
        use halremote_core::protocol::framing::decode_publication;

        let fanout = UpdateFanout::new();
        let (tx, mut rx) = mpsc::channel(4);
        fanout.add("demo", 1, tx);

        fanout.publish("demo", vec![0xAA, 0xBB]).await.unwrap();

        let frame = rx.try_recv().expect("frame must be queued");
        let (topic, offset) = decode_publication(&frame).unwrap();
        assert_eq!(topic, "demo");
        assert_eq!(&frame[offset..], &[0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_a_no_op() {
        let fanout = UpdateFanout::new();
        fanout.publish("demo", vec![1, 2, 3]).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_drops_frames_when_queue_is_full() {
        let fanout = UpdateFanout::new();
        let (tx, mut rx) = mpsc::channel(1);
        fanout.add("demo", 1, tx);

        fanout.publish("demo", vec![1]).await.unwrap();
        fanout.publish("demo", vec![2]).await.unwrap(); // dropped, queue full

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "second frame must have been dropped");
    }
}
