//! Topic framing for the update (publish/subscribe) channel.
//!
//! The update channel is asymmetric:
//!
//! - **Subscriber → publisher**: 1-byte-tagged subscription control frames,
//!   `0x01` + topic to subscribe and `0x00` + topic to unsubscribe.  The
//!   publisher observes these directly, which is what lets it send a full
//!   snapshot on a new subscription and unbind a component when the last
//!   subscriber departs.
//!
//! - **Publisher → subscriber**: `[topic_len:u16][topic][message]` frames,
//!   where `message` is a complete encoded protocol message (header +
//!   payload, self-delimiting).  Subscribers filter by topic; the topic is
//!   always the component name.

use crate::protocol::codec::ProtocolError;

/// Control byte announcing a subscription.
pub const SUBSCRIBE_TAG: u8 = 0x01;

/// Control byte announcing an unsubscription.
pub const UNSUBSCRIBE_TAG: u8 = 0x00;

/// A subscription control frame sent by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionAction {
    Subscribe(String),
    Unsubscribe(String),
}

impl SubscriptionAction {
    /// The topic this action refers to.
    pub fn topic(&self) -> &str {
        match self {
            SubscriptionAction::Subscribe(t) | SubscriptionAction::Unsubscribe(t) => t,
        }
    }
}

/// Encodes a subscription control frame: `[tag:1][topic_len:u16][topic]`.
pub fn encode_subscription(action: &SubscriptionAction) -> Vec<u8> {
    let (tag, topic) = match action {
        SubscriptionAction::Subscribe(t) => (SUBSCRIBE_TAG, t),
        SubscriptionAction::Unsubscribe(t) => (UNSUBSCRIBE_TAG, t),
    };
    let bytes = topic.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    let mut buf = Vec::with_capacity(3 + len as usize);
    buf.push(tag);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
    buf
}

/// Decodes one subscription control frame from the beginning of `bytes`.
///
/// Returns the action and the number of bytes consumed.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] for unknown tags, truncated
/// frames, or non-UTF-8 topics.
pub fn decode_subscription(bytes: &[u8]) -> Result<(SubscriptionAction, usize), ProtocolError> {
    if bytes.len() < 3 {
        return Err(ProtocolError::InsufficientData {
            needed: 3,
            available: bytes.len(),
        });
    }
    let tag = bytes[0];
    let len = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
    let end = 3 + len;
    if bytes.len() < end {
        return Err(ProtocolError::MalformedPayload(format!(
            "subscription topic of length {len} exceeds buffer"
        )));
    }
    let topic = std::str::from_utf8(&bytes[3..end])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8 topic: {e}")))?
        .to_string();
    let action = match tag {
        SUBSCRIBE_TAG => SubscriptionAction::Subscribe(topic),
        UNSUBSCRIBE_TAG => SubscriptionAction::Unsubscribe(topic),
        other => {
            return Err(ProtocolError::MalformedPayload(format!(
                "unknown subscription tag: 0x{other:02X}"
            )))
        }
    };
    Ok((action, end))
}

/// Encodes a publication frame: `[topic_len:u16][topic][message]`.
///
/// `message` must already be a complete encoded protocol message.
pub fn encode_publication(topic: &str, message: &[u8]) -> Vec<u8> {
    let bytes = topic.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    let mut buf = Vec::with_capacity(2 + len as usize + message.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
    buf.extend_from_slice(message);
    buf
}

/// Decodes the topic of a publication frame.
///
/// Returns the topic and the offset where the embedded message begins; the
/// message itself is decoded with [`crate::protocol::codec::decode_message`].
///
/// # Errors
///
/// Returns [`ProtocolError`] for truncated frames or non-UTF-8 topics.
pub fn decode_publication(bytes: &[u8]) -> Result<(String, usize), ProtocolError> {
    if bytes.len() < 2 {
        return Err(ProtocolError::InsufficientData {
            needed: 2,
            available: bytes.len(),
        });
    }
    let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let end = 2 + len;
    if bytes.len() < end {
        return Err(ProtocolError::MalformedPayload(format!(
            "publication topic of length {len} exceeds buffer"
        )));
    }
    let topic = std::str::from_utf8(&bytes[2..end])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8 topic: {e}")))?
        .to_string();
    Ok((topic, end))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
