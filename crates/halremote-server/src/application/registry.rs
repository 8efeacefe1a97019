//! ComponentRegistry: the authority's table of remote components.
//!
//! The registry owns the mapping from component name to its live
//! [`PinSet`].  A component is created by the first successful BIND request
//! for an unknown name — the requester's pin list becomes authoritative for
//! that creation.  Every later BIND for the same name must present an
//! identical layout (same count, names, types, directions) or is rejected
//! without touching the existing component.
//!
//! # Component lifecycle (for beginners)
//!
//! ```text
//!                bind (create or validate)
//!   UNBOUND  ───────────────────────────────►  BOUND
//!      ▲                                         │
//!      └──────────── last subscriber leaves ─────┘
//! ```
//!
//! A component is never destroyed by a client disconnect: several clients
//! may be subscribed to the same component concurrently, and a UI that
//! reconnects expects its pins (and their handles) to still be there.
//! Unbinding merely stops the component from being diffed and published.

use std::collections::HashMap;

use halremote_core::protocol::messages::PinDecl;
use halremote_core::{Pin, PinDir, PinHandle, PinSet, PinSetError, PinType, PinValue};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Lifecycle state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompState {
    Unbound,
    Bound,
}

/// Outcome of a successful bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The component did not exist; it was created from the requested pins.
    Created,
    /// The component existed and the requested layout matched it.
    Validated,
}

/// Error type for bind validation.  None of these mutate registry state.
#[derive(Debug, Error, PartialEq)]
pub enum BindError {
    #[error("component name must not be empty")]
    EmptyName,

    #[error("duplicate pin name in request: {0}")]
    DuplicateRequestPin(String),

    #[error("pin count mismatch: requested={requested} have={existing}")]
    PinCountMismatch { requested: usize, existing: usize },

    #[error("pin {0} does not exist")]
    NoSuchPin(String),

    #[error("pin {name} type mismatch: {requested:?}/{existing:?}")]
    TypeMismatch {
        name: String,
        requested: PinType,
        existing: PinType,
    },

    #[error("pin {name} direction mismatch: {requested:?}/{existing:?}")]
    DirMismatch {
        name: String,
        requested: PinDir,
        existing: PinDir,
    },
}

/// Error type for SET_PINS application.
#[derive(Debug, Error, PartialEq)]
pub enum SetPinError {
    #[error("unknown pin handle: {0}")]
    UnknownHandle(PinHandle),

    #[error("pin {name} is not remote-writable (direction {dir:?})")]
    NotWritable { name: String, dir: PinDir },

    #[error(transparent)]
    Pin(#[from] PinSetError),
}

/// Component-lifecycle notification for the embedding process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Bound { component: String },
    Unbound { component: String },
}

/// A named, registered component.
#[derive(Debug)]
pub struct Component {
    name: String,
    state: CompState,
    pins: PinSet,
    /// Next update serial to stamp on a status message for this component.
    /// Survives unbind/rebind cycles.
    serial: u64,
}

impl Component {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CompState {
        self.state
    }

    pub fn pins(&self) -> &PinSet {
        &self.pins
    }

    /// Returns the serial to stamp on the next status message and advances
    /// the counter.
    pub(crate) fn next_serial(&mut self) -> u64 {
        let serial = self.serial;
        self.serial += 1;
        serial
    }

    pub(crate) fn pins_mut(&mut self) -> &mut PinSet {
        &mut self.pins
    }
}

/// The authority's process-wide component table.
///
/// Constructed once by the server's top-level composition and passed by
/// reference to the command handler and the update publisher — deliberately
/// not a global.
pub struct ComponentRegistry {
    components: HashMap<String, Component>,
    /// Which component owns each handle.  Handles are assigned from one
    /// counter across all components and never reused.
    handle_owner: HashMap<PinHandle, String>,
    next_handle: PinHandle,
    event_tx: mpsc::UnboundedSender<RegistryEvent>,
}

impl ComponentRegistry {
    /// Creates an empty registry and returns it together with the receiver
    /// for bound/unbound notifications.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RegistryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                components: HashMap::new(),
                handle_owner: HashMap::new(),
                next_handle: 1,
                event_tx: tx,
            },
            rx,
        )
    }

    /// Creates or validates a component for a BIND request.
    ///
    /// Unknown name: a new component is created with exactly the requested
    /// pins, fresh handles are assigned, and the component becomes BOUND.
    /// Known name: the request is validated against the existing layout; on
    /// a full match the component becomes BOUND (if it was not already) and
    /// the existing handle assignment stays authoritative.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] on any mismatch, leaving the registry
    /// untouched.
    pub fn bind(
        &mut self,
        name: &str,
        requested: &[PinDecl],
    ) -> Result<(BindOutcome, &Component), BindError> {
        if name.is_empty() {
            return Err(BindError::EmptyName);
        }

        if let Some(existing) = self.components.get(name) {
            Self::validate(existing.pins(), requested)?;
            let comp = self.components.get_mut(name).expect("checked above");
            if comp.state == CompState::Unbound {
                comp.state = CompState::Bound;
                let _ = self.event_tx.send(RegistryEvent::Bound {
                    component: name.to_string(),
                });
            }
            debug!(component = name, "existing component validated");
            return Ok((BindOutcome::Validated, &self.components[name]));
        }

        // Unknown component: create as per pin list, assigning fresh handles.
        let mut pins = PinSet::new();
        let first_handle = self.next_handle;
        for decl in requested {
            let handle = self.next_handle;
            pins.insert(Pin::new(decl.name.clone(), decl.pin_type, decl.dir, handle))
                .map_err(|e| match e {
                    PinSetError::DuplicateName(n) => BindError::DuplicateRequestPin(n),
                    // Handles come from our own counter; any other insert
                    // failure is a duplicate name in the request.
                    _ => BindError::DuplicateRequestPin(decl.name.clone()),
                })?;
            self.next_handle += 1;
        }
        // Registration of handle owners happens only after the whole pin
        // list inserted cleanly.
        for handle in first_handle..self.next_handle {
            self.handle_owner.insert(handle, name.to_string());
        }

        self.components.insert(
            name.to_string(),
            Component {
                name: name.to_string(),
                state: CompState::Bound,
                pins,
                serial: 0,
            },
        );
        let _ = self.event_tx.send(RegistryEvent::Bound {
            component: name.to_string(),
        });
        info!(component = name, pins = requested.len(), "created remote component");
        Ok((BindOutcome::Created, &self.components[name]))
    }

    /// Validates a requested pin list against an existing component.
    fn validate(existing: &PinSet, requested: &[PinDecl]) -> Result<(), BindError> {
        if existing.len() != requested.len() {
            return Err(BindError::PinCountMismatch {
                requested: requested.len(),
                existing: existing.len(),
            });
        }
        for decl in requested {
            let pin = existing
                .by_name(&decl.name)
                .ok_or_else(|| BindError::NoSuchPin(decl.name.clone()))?;
            if pin.pin_type != decl.pin_type {
                return Err(BindError::TypeMismatch {
                    name: decl.name.clone(),
                    requested: decl.pin_type,
                    existing: pin.pin_type,
                });
            }
            if pin.dir != decl.dir {
                return Err(BindError::DirMismatch {
                    name: decl.name.clone(),
                    requested: decl.dir,
                    existing: pin.dir,
                });
            }
        }
        Ok(())
    }

    /// Looks a component up by name.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Applies one pin write from a SET_PINS request.
    ///
    /// Direction is enforced here as well as at the client: a conforming
    /// client never transmits a write for an IN pin, but the registry does
    /// not trust that.
    ///
    /// # Errors
    ///
    /// Returns [`SetPinError`] without mutating any pin.
    pub fn set_pin(&mut self, handle: PinHandle, value: PinValue) -> Result<(), SetPinError> {
        let owner = self
            .handle_owner
            .get(&handle)
            .ok_or(SetPinError::UnknownHandle(handle))?;
        let comp = self
            .components
            .get_mut(owner)
            .ok_or(SetPinError::UnknownHandle(handle))?;
        let pin = comp
            .pins
            .by_handle(handle)
            .ok_or(SetPinError::UnknownHandle(handle))?;
        if !pin.dir.remote_writable() {
            return Err(SetPinError::NotWritable {
                name: pin.name.clone(),
                dir: pin.dir,
            });
        }
        comp.pins.set_value(handle, value)?;
        Ok(())
    }

    /// Overwrites a pin value on behalf of the authority itself (the
    /// realtime side driving IN pins).  No direction check.
    ///
    /// # Errors
    ///
    /// Returns [`SetPinError::UnknownHandle`] or a type mismatch.
    pub fn drive_pin(&mut self, handle: PinHandle, value: PinValue) -> Result<(), SetPinError> {
        let owner = self
            .handle_owner
            .get(&handle)
            .ok_or(SetPinError::UnknownHandle(handle))?;
        let comp = self
            .components
            .get_mut(owner)
            .ok_or(SetPinError::UnknownHandle(handle))?;
        comp.pins.set_value(handle, value)?;
        Ok(())
    }

    /// Edge-triggered diff for one component; empty vec if the component is
    /// unknown.
    pub fn changed_pins(&mut self, name: &str) -> Vec<Pin> {
        match self.components.get_mut(name) {
            Some(comp) => comp.pins.changed_pins(),
            None => Vec::new(),
        }
    }

    /// Marks an existing component BOUND.  Idempotent; does not create.
    ///
    /// Used by the publisher when the first subscriber arrives for a
    /// component that exists but is currently unbound.
    pub fn bind_existing(&mut self, name: &str) -> bool {
        match self.components.get_mut(name) {
            Some(comp) => {
                if comp.state == CompState::Unbound {
                    comp.state = CompState::Bound;
                    let _ = self.event_tx.send(RegistryEvent::Bound {
                        component: name.to_string(),
                    });
                    info!(component = name, "bound");
                }
                true
            }
            None => false,
        }
    }

    /// Returns a component to UNBOUND.  Pins stay in memory but stop being
    /// diffed and published.
    pub fn unbind(&mut self, name: &str) {
        if let Some(comp) = self.components.get_mut(name) {
            if comp.state == CompState::Bound {
                comp.state = CompState::Unbound;
                let _ = self.event_tx.send(RegistryEvent::Unbound {
                    component: name.to_string(),
                });
                info!(component = name, "unbound");
            }
        }
    }

    /// Unbinds every bound component.  Called on shutdown.
    pub fn unbind_all(&mut self) {
        let names: Vec<String> = self
            .components
            .values()
            .filter(|c| c.state == CompState::Bound)
            .map(|c| c.name.clone())
            .collect();
        for name in names {
            self.unbind(&name);
        }
    }

    /// Mutable access for the publisher (serial stamping, rebasing).
    pub(crate) fn component_mut(&mut self, name: &str) -> Option<&mut Component> {
        self.components.get_mut(name)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, pin_type: PinType, dir: PinDir) -> PinDecl {
        PinDecl {
            name: name.to_string(),
            pin_type,
            dir,
        }
    }

    fn demo_decls() -> Vec<PinDecl> {
        vec![
            decl("demo.speed", PinType::S32, PinDir::Out),
            decl("demo.running", PinType::Bit, PinDir::In),
        ]
    }

    #[test]
    fn test_bind_unknown_name_creates_component() {
        let (mut reg, mut rx) = ComponentRegistry::new();
        let (outcome, comp) = reg.bind("demo", &demo_decls()).unwrap();

        assert_eq!(outcome, BindOutcome::Created);
        assert_eq!(comp.state(), CompState::Bound);
        assert_eq!(comp.pins().len(), 2);
        assert_eq!(
            rx.try_recv().unwrap(),
            RegistryEvent::Bound {
                component: "demo".to_string()
            }
        );
    }

    #[test]
    fn test_bind_assigns_fresh_distinct_handles() {
        let (mut reg, _rx) = ComponentRegistry::new();
        let (_, comp) = reg.bind("demo", &demo_decls()).unwrap();
        let handles: Vec<PinHandle> = comp.pins().iter().map(|p| p.handle).collect();
        assert_eq!(handles.len(), 2);
        assert_ne!(handles[0], handles[1]);
    }

    #[test]
    fn test_rebind_identical_layout_validates_with_same_handles() {
        let (mut reg, _rx) = ComponentRegistry::new();
        let (_, created) = reg.bind("demo", &demo_decls()).unwrap();
        let created_handles: Vec<PinHandle> = created.pins().iter().map(|p| p.handle).collect();

        let (outcome, validated) = reg.bind("demo", &demo_decls()).unwrap();
        let validated_handles: Vec<PinHandle> = validated.pins().iter().map(|p| p.handle).collect();

        assert_eq!(outcome, BindOutcome::Validated);
        assert_eq!(
            created_handles, validated_handles,
            "both clients must observe identical handles for identically-named pins"
        );
    }

    #[test]
    fn test_rebind_with_different_pin_count_is_rejected() {
        let (mut reg, _rx) = ComponentRegistry::new();
        reg.bind("demo", &demo_decls()).unwrap();

        let mut three = demo_decls();
        three.push(decl("demo.extra", PinType::U32, PinDir::Io));
        let result = reg.bind("demo", &three);

        assert_eq!(
            result.unwrap_err(),
            BindError::PinCountMismatch {
                requested: 3,
                existing: 2
            }
        );
        assert_eq!(reg.component("demo").unwrap().pins().len(), 2);
    }

    #[test]
    fn test_rebind_with_mismatched_type_is_rejected_without_mutation() {
        let (mut reg, _rx) = ComponentRegistry::new();
        reg.bind("demo", &demo_decls()).unwrap();

        let wrong = vec![
            decl("demo.speed", PinType::Float, PinDir::Out), // S32 on the authority
            decl("demo.running", PinType::Bit, PinDir::In),
        ];
        let result = reg.bind("demo", &wrong);
        assert!(matches!(result, Err(BindError::TypeMismatch { .. })));

        let pin = reg.component("demo").unwrap().pins().by_name("demo.speed").unwrap();
        assert_eq!(pin.pin_type, PinType::S32, "rejection must not alter pins");
    }

    #[test]
    fn test_rebind_with_mismatched_direction_is_rejected() {
        let (mut reg, _rx) = ComponentRegistry::new();
        reg.bind("demo", &demo_decls()).unwrap();

        let wrong = vec![
            decl("demo.speed", PinType::S32, PinDir::In),
            decl("demo.running", PinType::Bit, PinDir::In),
        ];
        assert!(matches!(
            reg.bind("demo", &wrong),
            Err(BindError::DirMismatch { .. })
        ));
    }

    #[test]
    fn test_rebind_with_unknown_pin_name_is_rejected() {
        let (mut reg, _rx) = ComponentRegistry::new();
        reg.bind("demo", &demo_decls()).unwrap();

        let wrong = vec![
            decl("demo.speed", PinType::S32, PinDir::Out),
            decl("demo.misnamed", PinType::Bit, PinDir::In),
        ];
        assert_eq!(
            reg.bind("demo", &wrong).unwrap_err(),
            BindError::NoSuchPin("demo.misnamed".to_string())
        );
    }

    #[test]
    fn test_bind_empty_name_is_rejected() {
        let (mut reg, _rx) = ComponentRegistry::new();
        assert_eq!(reg.bind("", &demo_decls()).unwrap_err(), BindError::EmptyName);
    }

    #[test]
    fn test_bind_duplicate_request_pin_is_rejected() {
        let (mut reg, _rx) = ComponentRegistry::new();
        let dup = vec![
            decl("demo.speed", PinType::S32, PinDir::Out),
            decl("demo.speed", PinType::S32, PinDir::Out),
        ];
        assert_eq!(
            reg.bind("demo", &dup).unwrap_err(),
            BindError::DuplicateRequestPin("demo.speed".to_string())
        );
        assert!(!reg.contains("demo"));
    }

    #[test]
    fn test_handles_are_never_reused_across_components() {
        let (mut reg, _rx) = ComponentRegistry::new();
        reg.bind("one", &[decl("one.a", PinType::Bit, PinDir::In)])
            .unwrap();
        let (_, two) = reg
            .bind("two", &[decl("two.a", PinType::Bit, PinDir::In)])
            .unwrap();
        let two_handle = two.pins().by_name("two.a").unwrap().handle;
        let one_handle = reg.component("one").unwrap().pins().by_name("one.a").unwrap().handle;
        assert_ne!(one_handle, two_handle);
    }

    // ── set_pin ──────────────────────────────────────────────────────────────

    #[test]
    fn test_set_pin_applies_to_out_pin() {
        let (mut reg, _rx) = ComponentRegistry::new();
        let (_, comp) = reg.bind("demo", &demo_decls()).unwrap();
        let handle = comp.pins().by_name("demo.speed").unwrap().handle;

        reg.set_pin(handle, PinValue::S32(900)).unwrap();
        assert_eq!(
            reg.component("demo").unwrap().pins().by_handle(handle).unwrap().value,
            PinValue::S32(900)
        );
    }

    #[test]
    fn test_set_pin_unknown_handle_fails() {
        let (mut reg, _rx) = ComponentRegistry::new();
        reg.bind("demo", &demo_decls()).unwrap();
        assert_eq!(
            reg.set_pin(9999, PinValue::Bit(true)),
            Err(SetPinError::UnknownHandle(9999))
        );
    }

    #[test]
    fn test_set_pin_rejects_in_direction_writes() {
        let (mut reg, _rx) = ComponentRegistry::new();
        let (_, comp) = reg.bind("demo", &demo_decls()).unwrap();
        let handle = comp.pins().by_name("demo.running").unwrap().handle;

        let result = reg.set_pin(handle, PinValue::Bit(true));
        assert!(matches!(result, Err(SetPinError::NotWritable { .. })));
        assert_eq!(
            reg.component("demo").unwrap().pins().by_handle(handle).unwrap().value,
            PinValue::Bit(false)
        );
    }

    #[test]
    fn test_set_pin_rejects_type_mismatch() {
        let (mut reg, _rx) = ComponentRegistry::new();
        let (_, comp) = reg.bind("demo", &demo_decls()).unwrap();
        let handle = comp.pins().by_name("demo.speed").unwrap().handle;
        assert!(matches!(
            reg.set_pin(handle, PinValue::Float(1.0)),
            Err(SetPinError::Pin(PinSetError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn test_drive_pin_may_write_in_pins() {
        let (mut reg, _rx) = ComponentRegistry::new();
        let (_, comp) = reg.bind("demo", &demo_decls()).unwrap();
        let handle = comp.pins().by_name("demo.running").unwrap().handle;
        reg.drive_pin(handle, PinValue::Bit(true)).unwrap();
        assert_eq!(
            reg.component("demo").unwrap().pins().by_handle(handle).unwrap().value,
            PinValue::Bit(true)
        );
    }

    // ── changed_pins / lifecycle ─────────────────────────────────────────────

    #[test]
    fn test_changed_pins_is_edge_triggered_through_registry() {
        let (mut reg, _rx) = ComponentRegistry::new();
        let (_, comp) = reg.bind("demo", &demo_decls()).unwrap();
        let handle = comp.pins().by_name("demo.running").unwrap().handle;

        assert!(reg.changed_pins("demo").is_empty());
        reg.drive_pin(handle, PinValue::Bit(true)).unwrap();
        assert_eq!(reg.changed_pins("demo").len(), 1);
        assert!(reg.changed_pins("demo").is_empty());
    }

    #[test]
    fn test_unbind_then_bind_existing_round_trips_state() {
        let (mut reg, mut rx) = ComponentRegistry::new();
        reg.bind("demo", &demo_decls()).unwrap();
        let _ = rx.try_recv(); // Bound from creation

        reg.unbind("demo");
        assert_eq!(reg.component("demo").unwrap().state(), CompState::Unbound);
        assert_eq!(
            rx.try_recv().unwrap(),
            RegistryEvent::Unbound {
                component: "demo".to_string()
            }
        );

        assert!(reg.bind_existing("demo"));
        assert_eq!(reg.component("demo").unwrap().state(), CompState::Bound);
    }

    #[test]
    fn test_bind_existing_unknown_component_returns_false() {
        let (mut reg, _rx) = ComponentRegistry::new();
        assert!(!reg.bind_existing("ghost"));
    }

    #[test]
    fn test_unbind_all_unbinds_every_bound_component() {
        let (mut reg, _rx) = ComponentRegistry::new();
        reg.bind("one", &[decl("one.a", PinType::Bit, PinDir::In)])
            .unwrap();
        reg.bind("two", &[decl("two.a", PinType::Bit, PinDir::In)])
            .unwrap();
        reg.unbind_all();
        assert_eq!(reg.component("one").unwrap().state(), CompState::Unbound);
        assert_eq!(reg.component("two").unwrap().state(), CompState::Unbound);
    }

    #[test]
    fn test_serial_survives_unbind_rebind() {
        let (mut reg, _rx) = ComponentRegistry::new();
        reg.bind("demo", &demo_decls()).unwrap();
        let comp = reg.component_mut("demo").unwrap();
        assert_eq!(comp.next_serial(), 0);
        assert_eq!(comp.next_serial(), 1);

        reg.unbind("demo");
        reg.bind_existing("demo");
        assert_eq!(
            reg.component_mut("demo").unwrap().next_serial(),
            2,
            "serial must continue across unbind/rebind"
        );
    }
}
