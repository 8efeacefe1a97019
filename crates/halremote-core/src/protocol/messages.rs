//! All HALremote protocol message types.
//!
//! The command channel carries `Bind`, `SetPins`, and `Ping` requests with
//! their replies; the update channel carries `FullUpdate`,
//! `IncrementalUpdate`, and `SubscribeError` under a topic equal to the
//! component name.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pin::{PinDir, PinHandle, PinType, PinValue};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the common message header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Default TCP port of the command (request/reply) endpoint.
pub const DEFAULT_CMD_PORT: u16 = 4711;

/// Default TCP port of the update (publish/subscribe) endpoint.
pub const DEFAULT_UPDATE_PORT: u16 = 4712;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes defined in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Command channel (0x01–0x3F)
    Bind = 0x01,
    BindConfirm = 0x02,
    BindReject = 0x03,
    SetPins = 0x04,
    SetPinsReject = 0x05,
    Ping = 0x06,
    PingAck = 0x07,
    // Update channel (0x40–0x4F)
    FullUpdate = 0x40,
    IncrementalUpdate = 0x41,
    SubscribeError = 0x42,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Bind),
            0x02 => Ok(MessageType::BindConfirm),
            0x03 => Ok(MessageType::BindReject),
            0x04 => Ok(MessageType::SetPins),
            0x05 => Ok(MessageType::SetPinsReject),
            0x06 => Ok(MessageType::Ping),
            0x07 => Ok(MessageType::PingAck),
            0x40 => Ok(MessageType::FullUpdate),
            0x41 => Ok(MessageType::IncrementalUpdate),
            0x42 => Ok(MessageType::SubscribeError),
            _ => Err(()),
        }
    }
}

// ── Per-pin wire records ──────────────────────────────────────────────────────

/// Pin descriptor inside a `Bind` request or `BindConfirm` reply.
///
/// No handle yet — handles are learned from the subsequent `FullUpdate`.
/// `name` is the full dotted `component.pinname` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinDecl {
    pub name: String,
    pub pin_type: PinType,
    pub dir: PinDir,
}

/// Complete pin record inside a `FullUpdate` snapshot.
///
/// Carries the declared type alongside the tagged value so decoders can
/// reject a record whose populated value field disagrees with the type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinSnapshot {
    pub handle: PinHandle,
    pub name: String,
    pub pin_type: PinType,
    pub linked: bool,
    pub value: PinValue,
}

/// Changed-pin record inside an `IncrementalUpdate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinDelta {
    pub handle: PinHandle,
    pub linked: bool,
    pub value: PinValue,
}

/// Write request record inside a `SetPins` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinWrite {
    pub handle: PinHandle,
    pub value: PinValue,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid HALremote messages, discriminated by type.
///
/// The update serial of `FullUpdate`/`IncrementalUpdate` travels in the
/// message header, not in the payload — see [`crate::protocol::codec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HalMessage {
    /// Client → authority: declare/validate a component's pin layout.
    Bind {
        component: String,
        pins: Vec<PinDecl>,
    },
    /// Authority → client: bind succeeded; carries the authoritative layout.
    BindConfirm {
        component: String,
        pins: Vec<PinDecl>,
    },
    /// Authority → client: bind failed; the client must not subscribe.
    BindReject { note: String },
    /// Client → authority: push new values for remote-writable pins.
    SetPins { pins: Vec<PinWrite> },
    /// Authority → client: a SET_PINS record failed to resolve or apply.
    SetPinsReject { note: String },
    /// Liveness probe, either direction.  No side effects on pin state.
    Ping,
    PingAck,
    /// Full snapshot of every pin of one component.  `instance` identifies
    /// the authority process so clients can detect a restart.
    FullUpdate {
        instance: Uuid,
        pins: Vec<PinSnapshot>,
    },
    /// Diff containing only pins whose value changed since the last update.
    IncrementalUpdate { pins: Vec<PinDelta> },
    /// Published on a topic that does not name a known component.
    SubscribeError { note: String },
}

impl HalMessage {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            HalMessage::Bind { .. } => MessageType::Bind,
            HalMessage::BindConfirm { .. } => MessageType::BindConfirm,
            HalMessage::BindReject { .. } => MessageType::BindReject,
            HalMessage::SetPins { .. } => MessageType::SetPins,
            HalMessage::SetPinsReject { .. } => MessageType::SetPinsReject,
            HalMessage::Ping => MessageType::Ping,
            HalMessage::PingAck => MessageType::PingAck,
            HalMessage::FullUpdate { .. } => MessageType::FullUpdate,
            HalMessage::IncrementalUpdate { .. } => MessageType::IncrementalUpdate,
            HalMessage::SubscribeError { .. } => MessageType::SubscribeError,
        }
    }
}
