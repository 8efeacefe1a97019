//! Binary codec for encoding and decoding HALremote protocol messages.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][serial:8][timestamp_us:8][payload:N]
//! ```
//! Total header size: 24 bytes.  All multi-byte integers are big-endian.
//!
//! The `serial` header field carries the per-component update serial on
//! `FullUpdate`/`IncrementalUpdate` messages and 0 everywhere else.
//!
//! Pin values are encoded as a tag byte (the [`PinType`] code) followed by
//! the value bytes.  Where a record also carries a declared pin type
//! (`FullUpdate` snapshots), the decoder rejects a record whose value tag
//! disagrees with the declaration instead of silently coercing.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use uuid::Uuid;

use crate::domain::pin::{PinDir, PinType, PinValue};
use crate::protocol::messages::{
    HalMessage, MessageType, PinDecl, PinDelta, PinSnapshot, PinWrite, HEADER_SIZE,
    PROTOCOL_VERSION,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (field value out of range, UTF-8
    /// error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the actual data
    /// available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// A pin record's populated value field disagrees with its declared type.
    #[error("pin {name}: value tag {got:?} does not match declared type {want:?}")]
    ValueTypeMismatch {
        name: String,
        want: PinType,
        got: PinType,
    },
}

/// A decoded message together with its header fields of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub message: HalMessage,
    /// Update serial from the header; 0 for non-status messages.
    pub serial: u64,
    /// Microseconds since the Unix epoch at time of encoding.
    pub timestamp_us: u64,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`HalMessage`] into a byte vector including the 24-byte header.
///
/// `serial` must be the component's update serial for status messages and 0
/// for everything else.
///
/// # Errors
///
/// Returns [`ProtocolError`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use halremote_core::protocol::{encode_message, decode_message};
/// use halremote_core::protocol::messages::HalMessage;
///
/// let msg = HalMessage::Ping;
/// let bytes = encode_message(&msg, 0, 0).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded.message, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(
    msg: &HalMessage,
    serial: u64,
    timestamp_us: u64,
) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg)?;
    let payload_len = payload.len() as u32;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());

    // Header: version (1) + msg_type (1) + reserved (2) + payload_len (4) +
    //         serial (8) + timestamp_us (8) = 24 bytes
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&serial.to_be_bytes());
    buf.extend_from_slice(&timestamp_us.to_be_bytes());

    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Encodes a [`HalMessage`] using the current system time as the timestamp.
///
/// # Errors
///
/// Returns [`ProtocolError`] if serialization fails.
pub fn encode_message_now(msg: &HalMessage, serial: u64) -> Result<Vec<u8>, ProtocolError> {
    let timestamp_us = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64;
    encode_message(msg, serial, timestamp_us)
}

/// Decodes one [`HalMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message with its header fields and the total number
/// of bytes consumed (header + payload), so the caller can advance their
/// read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_message(bytes: &[u8]) -> Result<(Decoded, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let msg_type_byte = bytes[1];
    let msg_type = MessageType::try_from(msg_type_byte)
        .map_err(|_| ProtocolError::UnknownMessageType(msg_type_byte))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;

    let total_needed = HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let serial = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
    let timestamp_us = u64::from_be_bytes(bytes[16..24].try_into().unwrap());

    let payload = &bytes[HEADER_SIZE..HEADER_SIZE + payload_len];
    let message = decode_payload(msg_type, payload)?;
    Ok((
        Decoded {
            message,
            serial,
            timestamp_us,
        },
        total_needed,
    ))
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &HalMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    match msg {
        HalMessage::Bind { component, pins } | HalMessage::BindConfirm { component, pins } => {
            encode_pin_decls(&mut buf, component, pins);
        }
        HalMessage::BindReject { note }
        | HalMessage::SetPinsReject { note }
        | HalMessage::SubscribeError { note } => {
            write_length_prefixed_string(&mut buf, note);
        }
        HalMessage::SetPins { pins } => encode_set_pins(&mut buf, pins),
        HalMessage::Ping | HalMessage::PingAck => {} // empty payload
        HalMessage::FullUpdate { instance, pins } => encode_full_update(&mut buf, instance, pins),
        HalMessage::IncrementalUpdate { pins } => encode_incremental_update(&mut buf, pins),
    }
    Ok(buf)
}

fn encode_pin_decls(buf: &mut Vec<u8>, component: &str, pins: &[PinDecl]) {
    write_length_prefixed_string(buf, component);
    buf.extend_from_slice(&(pins.len() as u16).to_be_bytes());
    for pin in pins {
        write_length_prefixed_string(buf, &pin.name);
        buf.push(pin.pin_type as u8);
        buf.push(pin.dir as u8);
    }
}

fn encode_set_pins(buf: &mut Vec<u8>, pins: &[PinWrite]) {
    buf.extend_from_slice(&(pins.len() as u16).to_be_bytes());
    for pin in pins {
        buf.extend_from_slice(&pin.handle.to_be_bytes());
        write_value(buf, &pin.value);
    }
}

fn encode_full_update(buf: &mut Vec<u8>, instance: &Uuid, pins: &[PinSnapshot]) {
    buf.extend_from_slice(instance.as_bytes());
    buf.extend_from_slice(&(pins.len() as u16).to_be_bytes());
    for pin in pins {
        buf.extend_from_slice(&pin.handle.to_be_bytes());
        write_length_prefixed_string(buf, &pin.name);
        buf.push(pin.pin_type as u8);
        buf.push(if pin.linked { 0x01 } else { 0x00 });
        write_value(buf, &pin.value);
    }
}

fn encode_incremental_update(buf: &mut Vec<u8>, pins: &[PinDelta]) {
    buf.extend_from_slice(&(pins.len() as u16).to_be_bytes());
    for pin in pins {
        buf.extend_from_slice(&pin.handle.to_be_bytes());
        buf.push(if pin.linked { 0x01 } else { 0x00 });
        write_value(buf, &pin.value);
    }
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<HalMessage, ProtocolError> {
    match msg_type {
        MessageType::Bind => {
            let (component, pins) = decode_pin_decls(payload)?;
            Ok(HalMessage::Bind { component, pins })
        }
        MessageType::BindConfirm => {
            let (component, pins) = decode_pin_decls(payload)?;
            Ok(HalMessage::BindConfirm { component, pins })
        }
        MessageType::BindReject => {
            let (note, _) = read_length_prefixed_string(payload, 0)?;
            Ok(HalMessage::BindReject { note })
        }
        MessageType::SetPins => decode_set_pins(payload).map(|pins| HalMessage::SetPins { pins }),
        MessageType::SetPinsReject => {
            let (note, _) = read_length_prefixed_string(payload, 0)?;
            Ok(HalMessage::SetPinsReject { note })
        }
        MessageType::Ping => Ok(HalMessage::Ping),
        MessageType::PingAck => Ok(HalMessage::PingAck),
        MessageType::FullUpdate => decode_full_update(payload),
        MessageType::IncrementalUpdate => {
            decode_incremental_update(payload).map(|pins| HalMessage::IncrementalUpdate { pins })
        }
        MessageType::SubscribeError => {
            let (note, _) = read_length_prefixed_string(payload, 0)?;
            Ok(HalMessage::SubscribeError { note })
        }
    }
}

fn decode_pin_decls(p: &[u8]) -> Result<(String, Vec<PinDecl>), ProtocolError> {
    let (component, mut off) = read_length_prefixed_string(p, 0)?;
    require_len(p, off + 2, "pin count")?;
    let count = u16::from_be_bytes([p[off], p[off + 1]]) as usize;
    off += 2;

    let mut pins = Vec::with_capacity(count);
    for _ in 0..count {
        let (name, name_end) = read_length_prefixed_string(p, off)?;
        off = name_end;
        require_len(p, off + 2, "pin type/dir")?;
        let pin_type = PinType::try_from(p[off])
            .map_err(|_| ProtocolError::MalformedPayload(format!("unknown pin type: {}", p[off])))?;
        let dir = PinDir::try_from(p[off + 1]).map_err(|_| {
            ProtocolError::MalformedPayload(format!("unknown pin direction: {}", p[off + 1]))
        })?;
        off += 2;
        pins.push(PinDecl {
            name,
            pin_type,
            dir,
        });
    }
    Ok((component, pins))
}

fn decode_set_pins(p: &[u8]) -> Result<Vec<PinWrite>, ProtocolError> {
    require_len(p, 2, "SetPins")?;
    let count = u16::from_be_bytes([p[0], p[1]]) as usize;
    let mut off = 2;
    let mut pins = Vec::with_capacity(count);
    for _ in 0..count {
        let handle = read_u32(p, off)?;
        off += 4;
        let (value, value_end) = read_value(p, off)?;
        off = value_end;
        pins.push(PinWrite { handle, value });
    }
    Ok(pins)
}

fn decode_full_update(p: &[u8]) -> Result<HalMessage, ProtocolError> {
    let instance = read_uuid(p, 0)?;
    require_len(p, 18, "FullUpdate")?;
    let count = u16::from_be_bytes([p[16], p[17]]) as usize;
    let mut off = 18;

    let mut pins = Vec::with_capacity(count);
    for _ in 0..count {
        let handle = read_u32(p, off)?;
        off += 4;
        let (name, name_end) = read_length_prefixed_string(p, off)?;
        off = name_end;
        require_len(p, off + 2, "FullUpdate pin type/linked")?;
        let pin_type = PinType::try_from(p[off])
            .map_err(|_| ProtocolError::MalformedPayload(format!("unknown pin type: {}", p[off])))?;
        let linked = p[off + 1] != 0;
        off += 2;
        let (value, value_end) = read_value(p, off)?;
        off = value_end;

        // A populated value field that disagrees with the declared type is a
        // protocol violation, never coerced.
        if !value.matches(pin_type) {
            return Err(ProtocolError::ValueTypeMismatch {
                name,
                want: pin_type,
                got: value.pin_type(),
            });
        }

        pins.push(PinSnapshot {
            handle,
            name,
            pin_type,
            linked,
            value,
        });
    }
    Ok(HalMessage::FullUpdate { instance, pins })
}

fn decode_incremental_update(p: &[u8]) -> Result<Vec<PinDelta>, ProtocolError> {
    require_len(p, 2, "IncrementalUpdate")?;
    let count = u16::from_be_bytes([p[0], p[1]]) as usize;
    let mut off = 2;
    let mut pins = Vec::with_capacity(count);
    for _ in 0..count {
        let handle = read_u32(p, off)?;
        off += 4;
        require_len(p, off + 1, "IncrementalUpdate linked")?;
        let linked = p[off] != 0;
        off += 1;
        let (value, value_end) = read_value(p, off)?;
        off = value_end;
        pins.push(PinDelta {
            handle,
            linked,
            value,
        });
    }
    Ok(pins)
}

// ── Value encoding ────────────────────────────────────────────────────────────

/// Writes a tagged pin value: the [`PinType`] code byte, then the value bytes.
fn write_value(buf: &mut Vec<u8>, value: &PinValue) {
    buf.push(value.pin_type() as u8);
    match value {
        PinValue::Bit(v) => buf.push(if *v { 0x01 } else { 0x00 }),
        PinValue::Float(v) => buf.extend_from_slice(&v.to_be_bytes()),
        PinValue::S32(v) => buf.extend_from_slice(&v.to_be_bytes()),
        PinValue::U32(v) => buf.extend_from_slice(&v.to_be_bytes()),
    }
}

/// Reads a tagged pin value.  Returns the value and the offset just past it.
fn read_value(buf: &[u8], offset: usize) -> Result<(PinValue, usize), ProtocolError> {
    require_len(buf, offset + 1, "value tag")?;
    let tag = buf[offset];
    let pin_type = PinType::try_from(tag)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown value tag: {tag}")))?;
    let off = offset + 1;
    match pin_type {
        PinType::Bit => {
            require_len(buf, off + 1, "bit value")?;
            Ok((PinValue::Bit(buf[off] != 0), off + 1))
        }
        PinType::Float => {
            require_len(buf, off + 8, "float value")?;
            let v = f64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
            Ok((PinValue::Float(v), off + 8))
        }
        PinType::S32 => {
            require_len(buf, off + 4, "s32 value")?;
            let v = i32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
            Ok((PinValue::S32(v), off + 4))
        }
        PinType::U32 => {
            require_len(buf, off + 4, "u32 value")?;
            let v = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
            Ok((PinValue::U32(v), off + 4))
        }
    }
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    if buf.len() < offset + 4 {
        return Err(ProtocolError::InsufficientData {
            needed: offset + 4,
            available: buf.len(),
        });
    }
    Ok(u32::from_be_bytes(
        buf[offset..offset + 4].try_into().unwrap(),
    ))
}

fn read_uuid(buf: &[u8], offset: usize) -> Result<Uuid, ProtocolError> {
    if buf.len() < offset + 16 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 16 bytes for UUID at offset {offset}, got {}",
            buf.len().saturating_sub(offset)
        )));
    }
    Ok(Uuid::from_bytes(buf[offset..offset + 16].try_into().unwrap()))
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
