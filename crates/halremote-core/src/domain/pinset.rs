//! PinSet: the ordered, name-indexed pin collection of one component.
//!
//! The PinSet is the unit of binding and validation.  It also owns the
//! change-detection baseline used by the authority's update publisher:
//! [`PinSet::changed_pins`] is an *edge-triggered* diff — it returns the pins
//! whose value differs from the value recorded at the previous call, then
//! rebases.  Calling it twice with no intervening mutation returns an empty
//! list both times.

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::pin::{Pin, PinHandle, PinType, PinValue};

/// Error type for PinSet operations.
#[derive(Debug, Error, PartialEq)]
pub enum PinSetError {
    /// A pin with this name already exists in the set.
    #[error("duplicate pin name: {0}")]
    DuplicateName(String),

    /// A pin with this handle already exists in the set.
    #[error("duplicate pin handle: {0}")]
    DuplicateHandle(PinHandle),

    /// No pin with the given handle exists.
    #[error("unknown pin handle: {0}")]
    UnknownHandle(PinHandle),

    /// The supplied value's variant does not match the pin's declared type.
    #[error("pin {name}: value type {got:?} does not match declared type {want:?}")]
    TypeMismatch {
        name: String,
        want: PinType,
        got: PinType,
    },
}

/// The named, typed pins belonging to one component.
///
/// Pins are kept in creation order (the order of the original BIND request),
/// with O(1) lookup by name and by handle.  Pin names are unique within the
/// set; handles are unique and never reassigned.
#[derive(Debug, Default)]
pub struct PinSet {
    pins: Vec<Pin>,
    by_name: HashMap<String, usize>,
    by_handle: HashMap<PinHandle, usize>,
    /// Values as of the last `changed_pins` call (or insertion).
    baseline: HashMap<PinHandle, PinValue>,
}

impl PinSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pins in the set.
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Iterates pins in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Pin> {
        self.pins.iter()
    }

    /// Adds a pin.  The pin's current value seeds the diff baseline, so a
    /// freshly inserted pin does not show up as changed.
    ///
    /// # Errors
    ///
    /// Returns [`PinSetError::DuplicateName`] or
    /// [`PinSetError::DuplicateHandle`] without mutating the set.
    pub fn insert(&mut self, pin: Pin) -> Result<(), PinSetError> {
        if self.by_name.contains_key(&pin.name) {
            return Err(PinSetError::DuplicateName(pin.name));
        }
        if self.by_handle.contains_key(&pin.handle) {
            return Err(PinSetError::DuplicateHandle(pin.handle));
        }
        let idx = self.pins.len();
        self.by_name.insert(pin.name.clone(), idx);
        self.by_handle.insert(pin.handle, idx);
        self.baseline.insert(pin.handle, pin.value);
        self.pins.push(pin);
        Ok(())
    }

    /// Looks a pin up by its full dotted name.
    pub fn by_name(&self, name: &str) -> Option<&Pin> {
        self.by_name.get(name).map(|&i| &self.pins[i])
    }

    /// Looks a pin up by handle.
    pub fn by_handle(&self, handle: PinHandle) -> Option<&Pin> {
        self.by_handle.get(&handle).map(|&i| &self.pins[i])
    }

    /// Overwrites a pin's value in place.
    ///
    /// # Errors
    ///
    /// Returns [`PinSetError::UnknownHandle`] if no pin carries `handle`, or
    /// [`PinSetError::TypeMismatch`] if the value variant disagrees with the
    /// pin's declared type.  Neither error mutates the set.
    pub fn set_value(&mut self, handle: PinHandle, value: PinValue) -> Result<&Pin, PinSetError> {
        let idx = *self
            .by_handle
            .get(&handle)
            .ok_or(PinSetError::UnknownHandle(handle))?;
        let pin = &mut self.pins[idx];
        if !value.matches(pin.pin_type) {
            return Err(PinSetError::TypeMismatch {
                name: pin.name.clone(),
                want: pin.pin_type,
                got: value.pin_type(),
            });
        }
        pin.value = value;
        Ok(&self.pins[idx])
    }

    /// Updates the informational `linked` flag of a pin.
    ///
    /// # Errors
    ///
    /// Returns [`PinSetError::UnknownHandle`] if no pin carries `handle`.
    pub fn set_linked(&mut self, handle: PinHandle, linked: bool) -> Result<(), PinSetError> {
        let idx = *self
            .by_handle
            .get(&handle)
            .ok_or(PinSetError::UnknownHandle(handle))?;
        self.pins[idx].linked = linked;
        Ok(())
    }

    /// Returns the pins whose value differs from the recorded baseline, then
    /// rebases the baseline to the current values.
    ///
    /// Edge-triggered, deterministic and total: two consecutive calls with no
    /// intervening mutation both return an empty list.
    pub fn changed_pins(&mut self) -> Vec<Pin> {
        let mut changed = Vec::new();
        for pin in &self.pins {
            let previous = self.baseline.get(&pin.handle);
            let unchanged = previous.is_some_and(|prev| prev.same_bits(&pin.value));
            if !unchanged {
                changed.push(pin.clone());
                self.baseline.insert(pin.handle, pin.value);
            }
        }
        changed
    }

    /// Returns a copy of every pin at its current value, without touching
    /// the diff baseline.
    pub fn snapshot(&self) -> Vec<Pin> {
        self.pins.clone()
    }

    /// Rebases the diff baseline to the current values.
    ///
    /// Called after a full snapshot has been published so the next
    /// incremental diff starts from what subscribers already saw.
    pub fn rebase(&mut self) {
        for pin in &self.pins {
            self.baseline.insert(pin.handle, pin.value);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pin::PinDir;

    fn demo_set() -> PinSet {
        let mut set = PinSet::new();
        set.insert(Pin::new("demo.speed", PinType::S32, PinDir::Out, 1))
            .unwrap();
        set.insert(Pin::new("demo.running", PinType::Bit, PinDir::In, 2))
            .unwrap();
        set
    }

    #[test]
    fn test_insert_preserves_creation_order() {
        let set = demo_set();
        let names: Vec<&str> = set.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["demo.speed", "demo.running"]);
    }

    #[test]
    fn test_insert_rejects_duplicate_name() {
        let mut set = demo_set();
        let result = set.insert(Pin::new("demo.speed", PinType::Bit, PinDir::In, 3));
        assert_eq!(result, Err(PinSetError::DuplicateName("demo.speed".into())));
        assert_eq!(set.len(), 2, "failed insert must not mutate the set");
    }

    #[test]
    fn test_insert_rejects_duplicate_handle() {
        let mut set = demo_set();
        let result = set.insert(Pin::new("demo.other", PinType::Bit, PinDir::In, 1));
        assert_eq!(result, Err(PinSetError::DuplicateHandle(1)));
    }

    #[test]
    fn test_lookup_by_name_and_handle_agree() {
        let set = demo_set();
        let by_name = set.by_name("demo.running").unwrap();
        let by_handle = set.by_handle(2).unwrap();
        assert_eq!(by_name, by_handle);
    }

    #[test]
    fn test_set_value_overwrites_in_place() {
        let mut set = demo_set();
        set.set_value(1, PinValue::S32(500)).unwrap();
        assert_eq!(set.by_handle(1).unwrap().value, PinValue::S32(500));
    }

    #[test]
    fn test_set_value_unknown_handle_fails() {
        let mut set = demo_set();
        assert_eq!(
            set.set_value(99, PinValue::Bit(true)),
            Err(PinSetError::UnknownHandle(99))
        );
    }

    #[test]
    fn test_set_value_type_mismatch_fails_without_mutating() {
        let mut set = demo_set();
        let result = set.set_value(1, PinValue::Float(1.5));
        assert!(matches!(result, Err(PinSetError::TypeMismatch { .. })));
        assert_eq!(set.by_handle(1).unwrap().value, PinValue::S32(0));
    }

    // ── Edge-triggered diff ───────────────────────────────────────────────────

    #[test]
    fn test_changed_pins_empty_on_fresh_set() {
        let mut set = demo_set();
        assert!(set.changed_pins().is_empty());
        assert!(set.changed_pins().is_empty());
    }

    #[test]
    fn test_changed_pins_returns_mutated_pin_exactly_once() {
        let mut set = demo_set();
        set.set_value(2, PinValue::Bit(true)).unwrap();

        let changed = set.changed_pins();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].name, "demo.running");
        assert_eq!(changed[0].value, PinValue::Bit(true));

        assert!(
            set.changed_pins().is_empty(),
            "second call without mutation must be empty"
        );
    }

    #[test]
    fn test_changed_pins_reports_each_mutation_edge() {
        let mut set = demo_set();
        set.set_value(1, PinValue::S32(1)).unwrap();
        assert_eq!(set.changed_pins().len(), 1);

        set.set_value(1, PinValue::S32(2)).unwrap();
        let changed = set.changed_pins();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].value, PinValue::S32(2));
    }

    #[test]
    fn test_rewriting_same_value_is_not_a_change() {
        let mut set = demo_set();
        set.set_value(1, PinValue::S32(0)).unwrap();
        assert!(set.changed_pins().is_empty());
    }

    #[test]
    fn test_rebase_suppresses_pending_changes() {
        let mut set = demo_set();
        set.set_value(2, PinValue::Bit(true)).unwrap();
        set.rebase();
        assert!(
            set.changed_pins().is_empty(),
            "rebase must absorb mutations that a full snapshot already covered"
        );
    }

    #[test]
    fn test_snapshot_does_not_disturb_diff() {
        let mut set = demo_set();
        set.set_value(2, PinValue::Bit(true)).unwrap();
        let snap = set.snapshot();
        assert_eq!(snap.len(), 2);
        // Snapshot alone must not rebase: the change is still pending.
        assert_eq!(set.changed_pins().len(), 1);
    }

    #[test]
    fn test_linked_flag_updates() {
        let mut set = demo_set();
        set.set_linked(1, true).unwrap();
        assert!(set.by_handle(1).unwrap().linked);
        assert_eq!(set.set_linked(99, true), Err(PinSetError::UnknownHandle(99)));
    }
}
