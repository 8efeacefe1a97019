//! Domain module containing the pin value types and the PinSet collection.

pub mod pin;
pub mod pinset;

pub use pin::{Pin, PinDir, PinHandle, PinType, PinValue};
pub use pinset::{PinSet, PinSetError};
