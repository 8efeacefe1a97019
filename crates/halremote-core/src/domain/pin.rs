//! Pin identity and value types.
//!
//! A *pin* is a single named, typed, directional value slot within a
//! component.  The numeric codes for [`PinType`] and [`PinDir`] follow the
//! original HAL constants so that captures of the wire traffic stay readable
//! next to the historical tooling.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned stable integer identifying a pin for incremental updates.
///
/// Assigned once when the component is created and never reused for a
/// different pin while the component exists.
pub type PinHandle = u32;

/// Value type of a pin.  Exactly one of the [`PinValue`] variants matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PinType {
    Bit = 1,
    Float = 2,
    S32 = 3,
    U32 = 4,
}

impl TryFrom<u8> for PinType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PinType::Bit),
            2 => Ok(PinType::Float),
            3 => Ok(PinType::S32),
            4 => Ok(PinType::U32),
            _ => Err(()),
        }
    }
}

/// Data-flow direction of a pin, seen from the remote component's side.
///
/// An `Out` pin is written by the embedding application (a button, a
/// setpoint) and forwarded upstream; an `In` pin is driven by the authority
/// (an indicator, a readout) and must never be written remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PinDir {
    In = 16,
    Out = 32,
    Io = 48,
}

impl PinDir {
    /// Returns `true` if the remote side may push values for this pin
    /// upstream via SET_PINS.
    pub fn remote_writable(self) -> bool {
        matches!(self, PinDir::Out | PinDir::Io)
    }
}

impl TryFrom<u8> for PinDir {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            16 => Ok(PinDir::In),
            32 => Ok(PinDir::Out),
            48 => Ok(PinDir::Io),
            _ => Err(()),
        }
    }
}

/// Tagged pin value union.  Exactly one variant is populated per pin record
/// on the wire, selected by the pin's declared [`PinType`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PinValue {
    Bit(bool),
    Float(f64),
    S32(i32),
    U32(u32),
}

impl PinValue {
    /// Returns the [`PinType`] this value belongs to.
    pub fn pin_type(&self) -> PinType {
        match self {
            PinValue::Bit(_) => PinType::Bit,
            PinValue::Float(_) => PinType::Float,
            PinValue::S32(_) => PinType::S32,
            PinValue::U32(_) => PinType::U32,
        }
    }

    /// Returns the zero value for a pin type — the value a freshly created
    /// pin carries before anyone writes it.
    pub fn zero(pin_type: PinType) -> PinValue {
        match pin_type {
            PinType::Bit => PinValue::Bit(false),
            PinType::Float => PinValue::Float(0.0),
            PinType::S32 => PinValue::S32(0),
            PinType::U32 => PinValue::U32(0),
        }
    }

    /// Returns `true` if this value's variant matches `pin_type`.
    pub fn matches(&self, pin_type: PinType) -> bool {
        self.pin_type() == pin_type
    }

    /// Bit-for-bit equality.
    ///
    /// Floats are compared by their raw bit pattern so that a NaN value does
    /// not register as changed on every diff pass.
    pub fn same_bits(&self, other: &PinValue) -> bool {
        match (self, other) {
            (PinValue::Bit(a), PinValue::Bit(b)) => a == b,
            (PinValue::Float(a), PinValue::Float(b)) => a.to_bits() == b.to_bits(),
            (PinValue::S32(a), PinValue::S32(b)) => a == b,
            (PinValue::U32(a), PinValue::U32(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for PinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinValue::Bit(v) => write!(f, "{v}"),
            PinValue::Float(v) => write!(f, "{v}"),
            PinValue::S32(v) => write!(f, "{v}"),
            PinValue::U32(v) => write!(f, "{v}"),
        }
    }
}

/// A single pin: identity plus current value.
///
/// `name` is globally unique within a component and travels in dotted
/// `component.pinname` form on the wire.  `linked` reports whether the
/// underlying realtime signal has a live connection — informational only.
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub name: String,
    pub pin_type: PinType,
    pub dir: PinDir,
    pub handle: PinHandle,
    pub value: PinValue,
    pub linked: bool,
}

impl Pin {
    /// Creates a pin carrying the zero value for its type, not linked.
    pub fn new(name: impl Into<String>, pin_type: PinType, dir: PinDir, handle: PinHandle) -> Self {
        Self {
            name: name.into(),
            pin_type,
            dir,
            handle,
            value: PinValue::zero(pin_type),
            linked: false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
