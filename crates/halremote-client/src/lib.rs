//! # halremote-client
//!
//! The embeddable client side of the HALremote protocol: a consumer (a UI,
//! a bridge, a monitoring tool) declares the pins it expects, calls
//! `ready()`, and from then on receives typed change events while its local
//! pin writes are forwarded to the authority.
//!
//! The protocol logic lives in [`application::state::RemoteComponent`], a
//! plain state machine that consumes decoded messages and returns the
//! actions to perform — it owns no sockets, which is what makes the whole
//! bind/subscribe/heartbeat lifecycle unit-testable.  The
//! [`infrastructure::network`] module supplies the two TCP channels
//! (command and status) with automatic reconnection.

pub mod application;
pub mod infrastructure;

pub use application::mirror::{MirrorError, PinChange, PinMirror};
pub use application::state::{ChannelState, ClientAction, ClientEvent, RemoteComponent};
