//! Protocol module containing message types, the binary codec, update-channel
//! topic framing, and update-serial tracking.

pub mod codec;
pub mod framing;
pub mod messages;
pub mod serial;

pub use codec::{decode_message, encode_message, Decoded, ProtocolError};
pub use framing::{decode_publication, decode_subscription, encode_publication, encode_subscription, SubscriptionAction};
pub use messages::*;
pub use serial::{SerialCheck, SerialTracker};
