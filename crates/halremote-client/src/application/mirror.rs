//! The client-side pin mirror.
//!
//! The mirror is owned exclusively by one client instance.  It is populated
//! with names, types, and directions at BIND_CONFIRM time, learns handles
//! from the first FULL_UPDATE, and is kept current by INCREMENTAL_UPDATE
//! messages.  It is never shared with the authority's PinSet.
//!
//! A mirror is *synced* once it has applied at least one full update.
//! Local writes to remote-writable pins are only forwarded upstream while
//! synced — forwarding earlier would race the authoritative snapshot.

use std::collections::HashMap;

use halremote_core::protocol::messages::{PinDecl, PinDelta, PinSnapshot, PinWrite};
use halremote_core::{PinDir, PinHandle, PinType, PinValue, SerialCheck, SerialTracker};
use thiserror::Error;
use uuid::Uuid;

/// Error type for mirror operations.
#[derive(Debug, Error, PartialEq)]
pub enum MirrorError {
    #[error("duplicate pin name: {0}")]
    DuplicateName(String),

    #[error("unknown pin name: {0}")]
    UnknownName(String),

    /// An incremental update referenced a handle the mirror does not know.
    /// This indicates a protocol/implementation bug, not a recoverable
    /// condition.
    #[error("unknown pin handle: {0}")]
    UnknownHandle(PinHandle),

    #[error("pin {name}: value type {got:?} does not match declared type {want:?}")]
    TypeMismatch {
        name: String,
        want: PinType,
        got: PinType,
    },

    /// A local write targeted a pin the remote side does not own.
    #[error("pin {name} is not writable from the remote side (direction {dir:?})")]
    NotWritable { name: String, dir: PinDir },

    /// An incremental update arrived with a non-consecutive serial.
    #[error("update serial gap: expected {expected}, got {got}")]
    SerialGap { expected: u64, got: u64 },

    /// An incremental update arrived before any full snapshot.
    #[error("incremental update before full snapshot")]
    NotSynced,
}

/// One mirrored pin.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorPin {
    /// Full dotted `component.pinname` name.
    pub name: String,
    pub pin_type: PinType,
    pub dir: PinDir,
    /// Learned from the first full update; `None` until then.
    pub handle: Option<PinHandle>,
    pub value: PinValue,
    pub linked: bool,
}

/// A value-changed notification produced by applying an update.
#[derive(Debug, Clone, PartialEq)]
pub struct PinChange {
    pub name: String,
    pub handle: PinHandle,
    pub value: PinValue,
    pub linked: bool,
}

/// Result of applying a full update.
#[derive(Debug)]
pub struct FullApplied {
    /// One change record per pin in the snapshot.
    pub changes: Vec<PinChange>,
    /// `true` when the authority's instance id differs from the previous
    /// full update — the authority was restarted.
    pub restarted: bool,
}

/// The local pin mirror of one remote component.
#[derive(Debug)]
pub struct PinMirror {
    component: String,
    pins: Vec<MirrorPin>,
    by_name: HashMap<String, usize>,
    by_handle: HashMap<PinHandle, usize>,
    tracker: SerialTracker,
    synced: bool,
    instance: Option<Uuid>,
}

impl PinMirror {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            pins: Vec::new(),
            by_name: HashMap::new(),
            by_handle: HashMap::new(),
            tracker: SerialTracker::new(),
            synced: false,
            instance: None,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// `true` once at least one full update has been applied.
    pub fn synced(&self) -> bool {
        self.synced
    }

    /// The serial of the most recently applied status message.
    pub fn last_serial(&self) -> Option<u64> {
        self.tracker.last()
    }

    /// Declares a pin before binding.  `name` is the local pin name; the
    /// dotted wire name is formed from the component name.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::DuplicateName`].
    pub fn declare(
        &mut self,
        name: &str,
        pin_type: PinType,
        dir: PinDir,
    ) -> Result<(), MirrorError> {
        let full_name = self.full_name(name);
        if self.by_name.contains_key(&full_name) {
            return Err(MirrorError::DuplicateName(full_name));
        }
        let idx = self.pins.len();
        self.by_name.insert(full_name.clone(), idx);
        self.pins.push(MirrorPin {
            name: full_name,
            pin_type,
            dir,
            handle: None,
            value: PinValue::zero(pin_type),
            linked: false,
        });
        Ok(())
    }

    /// The pin descriptor list for the BIND request.
    pub fn decls(&self) -> Vec<PinDecl> {
        self.pins
            .iter()
            .map(|p| PinDecl {
                name: p.name.clone(),
                pin_type: p.pin_type,
                dir: p.dir,
            })
            .collect()
    }

    /// Adopts the authoritative layout from a BIND_CONFIRM.
    ///
    /// The authority has already validated the layout against this client's
    /// request, so the confirmed list either equals the declared one or the
    /// client is a late joiner adopting an existing component's layout.
    pub fn confirm(&mut self, pins: &[PinDecl]) {
        self.pins = pins
            .iter()
            .map(|d| MirrorPin {
                name: d.name.clone(),
                pin_type: d.pin_type,
                dir: d.dir,
                handle: None,
                value: PinValue::zero(d.pin_type),
                linked: false,
            })
            .collect();
        self.by_name = self
            .pins
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        self.by_handle.clear();
        self.synced = false;
        self.tracker.reset();
        // A fresh bind re-learns everything anyway; only an instance change
        // *within* one binding is a reportable restart.
        self.instance = None;
    }

    /// Applies a full snapshot: values, linked flags, and the handle map are
    /// replaced, the serial tracker is re-seeded, and the mirror becomes
    /// synced.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::TypeMismatch`] if a snapshot record disagrees
    /// with the declared type of a same-named pin.
    pub fn apply_full(
        &mut self,
        serial: u64,
        instance: Uuid,
        snapshot: &[PinSnapshot],
    ) -> Result<FullApplied, MirrorError> {
        // Validate before mutating anything.
        for record in snapshot {
            if let Some(&idx) = self.by_name.get(&record.name) {
                let pin = &self.pins[idx];
                if pin.pin_type != record.pin_type {
                    return Err(MirrorError::TypeMismatch {
                        name: record.name.clone(),
                        want: pin.pin_type,
                        got: record.pin_type,
                    });
                }
            }
        }

        self.by_handle.clear();
        let mut changes = Vec::with_capacity(snapshot.len());
        for record in snapshot {
            let idx = match self.by_name.get(&record.name) {
                Some(&idx) => idx,
                None => {
                    // A pin the bind confirm did not mention (monitor-style
                    // subscriber): adopt it.
                    let idx = self.pins.len();
                    self.by_name.insert(record.name.clone(), idx);
                    self.pins.push(MirrorPin {
                        name: record.name.clone(),
                        pin_type: record.pin_type,
                        dir: PinDir::In,
                        handle: None,
                        value: PinValue::zero(record.pin_type),
                        linked: false,
                    });
                    idx
                }
            };
            let pin = &mut self.pins[idx];
            pin.handle = Some(record.handle);
            pin.value = record.value;
            pin.linked = record.linked;
            self.by_handle.insert(record.handle, idx);
            changes.push(PinChange {
                name: record.name.clone(),
                handle: record.handle,
                value: record.value,
                linked: record.linked,
            });
        }

        self.tracker.seed(serial);
        self.synced = true;
        let restarted = self.instance.is_some_and(|old| old != instance);
        self.instance = Some(instance);
        Ok(FullApplied { changes, restarted })
    }

    /// Applies an incremental update.
    ///
    /// # Errors
    ///
    /// - [`MirrorError::NotSynced`] before any full update.
    /// - [`MirrorError::SerialGap`] on a non-consecutive serial; the deltas
    ///   are *not* applied.
    /// - [`MirrorError::UnknownHandle`] / [`MirrorError::TypeMismatch`] for
    ///   records that cannot be applied (protocol bug; fail fast).
    pub fn apply_incremental(
        &mut self,
        serial: u64,
        deltas: &[PinDelta],
    ) -> Result<Vec<PinChange>, MirrorError> {
        if !self.synced {
            return Err(MirrorError::NotSynced);
        }
        if let SerialCheck::Gap { expected, got } = self.tracker.observe(serial) {
            // The mirror can no longer be trusted; the caller must trigger
            // a resync instead of applying a partial state.
            self.synced = false;
            return Err(MirrorError::SerialGap { expected, got });
        }

        let mut changes = Vec::with_capacity(deltas.len());
        for delta in deltas {
            let idx = *self
                .by_handle
                .get(&delta.handle)
                .ok_or(MirrorError::UnknownHandle(delta.handle))?;
            let pin = &mut self.pins[idx];
            if !delta.value.matches(pin.pin_type) {
                return Err(MirrorError::TypeMismatch {
                    name: pin.name.clone(),
                    want: pin.pin_type,
                    got: delta.value.pin_type(),
                });
            }
            pin.value = delta.value;
            pin.linked = delta.linked;
            changes.push(PinChange {
                name: pin.name.clone(),
                handle: delta.handle,
                value: delta.value,
                linked: delta.linked,
            });
        }
        Ok(changes)
    }

    /// Applies a local write from the embedding application.
    ///
    /// The local mirror value is updated immediately.  Returns the
    /// [`PinWrite`] to forward upstream when the pin is remote-writable and
    /// the mirror is synced; returns `Ok(None)` when forwarding is
    /// suppressed (not yet synced).
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::NotWritable`] for IN pins — no wire traffic
    /// may be generated for them — plus the usual name/type errors.
    pub fn set_local(&mut self, name: &str, value: PinValue) -> Result<Option<PinWrite>, MirrorError> {
        let full_name = self.full_name(name);
        let idx = *self
            .by_name
            .get(&full_name)
            .ok_or_else(|| MirrorError::UnknownName(full_name.clone()))?;
        let pin = &mut self.pins[idx];
        if !pin.dir.remote_writable() {
            return Err(MirrorError::NotWritable {
                name: pin.name.clone(),
                dir: pin.dir,
            });
        }
        if !value.matches(pin.pin_type) {
            return Err(MirrorError::TypeMismatch {
                name: pin.name.clone(),
                want: pin.pin_type,
                got: value.pin_type(),
            });
        }
        pin.value = value;

        match (self.synced, pin.handle) {
            (true, Some(handle)) => Ok(Some(PinWrite { handle, value })),
            _ => Ok(None),
        }
    }

    /// Forgets the sync state (after an unsubscribe or a status-channel
    /// loss); handles and values stay until the next full update replaces
    /// them.
    pub fn reset_sync(&mut self) {
        self.synced = false;
        self.tracker.reset();
    }

    /// Looks up a pin by local or dotted name.
    pub fn pin(&self, name: &str) -> Option<&MirrorPin> {
        let full_name = self.full_name(name);
        self.by_name.get(&full_name).map(|&i| &self.pins[i])
    }

    /// Current value of a pin, by local or dotted name.
    pub fn value(&self, name: &str) -> Option<PinValue> {
        self.pin(name).map(|p| p.value)
    }

    /// Iterates mirrored pins in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &MirrorPin> {
        self.pins.iter()
    }

    fn full_name(&self, name: &str) -> String {
        if name.contains('.') {
            name.to_string()
        } else {
            format!("{}.{}", self.component, name)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
