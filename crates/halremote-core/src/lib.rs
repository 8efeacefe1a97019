//! # halremote-core
//!
//! Shared library for HALremote containing the wire protocol codec, the pin
//! domain types, and the update-serial bookkeeping used by both sides of the
//! remote-component protocol.
//!
//! This crate is used by both the authority (`halremote-server`) and the
//! remote UI side (`halremote-client`).  It has zero dependencies on network
//! sockets, async runtimes, or UI frameworks.
//!
//! # Architecture overview (for beginners)
//!
//! HALremote synchronizes a named *component* — a set of typed, directional
//! value slots called *pins* — between an authoritative server process and
//! any number of remote processes (UIs, bridges, monitoring tools).  A remote
//! process declares the pins it expects, *binds* the component over a
//! request/reply channel, then subscribes to a status topic named after the
//! component.  The authority answers the subscription with one full snapshot
//! of every pin value and thereafter publishes incremental diffs, each
//! stamped with a monotonically increasing serial number so lost updates are
//! detectable.
//!
//! This crate (`halremote-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel over the network.  Messages are
//!   encoded into a compact binary format (24-byte header + payload) and
//!   decoded back into typed Rust structs on the other end.  Also contains
//!   the topic framing of the update channel and the [`SerialTracker`] that
//!   detects lost incremental updates.
//!
//! - **`domain`** – Pure protocol-independent state.  The most important
//!   piece is the [`PinSet`]: the ordered, name- and handle-indexed pin
//!   collection that is the unit of binding, validation, and change
//!   detection.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `halremote_core::PinValue` instead of `halremote_core::domain::pin::PinValue`.
pub use domain::pin::{Pin, PinDir, PinHandle, PinType, PinValue};
pub use domain::pinset::{PinSet, PinSetError};
pub use protocol::codec::{decode_message, encode_message, Decoded, ProtocolError};
pub use protocol::messages::{HalMessage, MessageType};
pub use protocol::serial::{SerialCheck, SerialTracker};
