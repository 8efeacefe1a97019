//! Integration tests for the bind handshake through the command handler.
//!
//! These tests exercise the registry through `handle_command`, the same
//! path the TCP endpoint uses: BIND requests from several clients, reply
//! pairing, and the invariants around handle stability and rejection
//! without mutation.

use halremote_core::protocol::messages::{PinDecl, PinWrite};
use halremote_core::{HalMessage, PinDir, PinType, PinValue};
use halremote_server::application::command::handle_command;
use halremote_server::application::registry::{ComponentRegistry, RegistryEvent};

fn decl(name: &str, pin_type: PinType, dir: PinDir) -> PinDecl {
    PinDecl {
        name: name.to_string(),
        pin_type,
        dir,
    }
}

fn demo_bind() -> HalMessage {
    HalMessage::Bind {
        component: "demo".to_string(),
        pins: vec![
            decl("demo.speed", PinType::S32, PinDir::Out),
            decl("demo.running", PinType::Bit, PinDir::In),
        ],
    }
}

/// Two clients bind the same component with the same pin list: the first
/// creates it, the second validates against it, and both observe the same
/// authoritative layout.
#[test]
fn test_bind_is_idempotent_across_two_clients() {
    let (mut registry, mut events) = ComponentRegistry::new();

    let first = handle_command(&mut registry, "client-a", demo_bind());
    let second = handle_command(&mut registry, "client-b", demo_bind());

    let confirm_of = |reply: Option<HalMessage>| match reply {
        Some(HalMessage::BindConfirm { component, pins }) => (component, pins),
        other => panic!("expected BindConfirm, got {other:?}"),
    };
    let (comp_a, pins_a) = confirm_of(first);
    let (comp_b, pins_b) = confirm_of(second);

    assert_eq!(comp_a, "demo");
    assert_eq!(comp_a, comp_b);
    assert_eq!(pins_a, pins_b, "both clients see the identical layout");

    // Only the creation binds; the validation does not re-emit.
    assert_eq!(
        events.try_recv().unwrap(),
        RegistryEvent::Bound {
            component: "demo".to_string()
        }
    );
    assert!(events.try_recv().is_err());

    // Identically-named pins resolve to identical handles for both.
    let speed = registry
        .component("demo")
        .unwrap()
        .pins()
        .by_name("demo.speed")
        .unwrap()
        .handle;
    assert!(speed > 0);
}

/// A second client with a different pin count is rejected; the existing
/// component's pins are untouched.
#[test]
fn test_bind_rejection_leaves_component_unaltered() {
    let (mut registry, _events) = ComponentRegistry::new();
    handle_command(&mut registry, "client-a", demo_bind());

    let reply = handle_command(
        &mut registry,
        "client-b",
        HalMessage::Bind {
            component: "demo".to_string(),
            pins: vec![
                decl("demo.speed", PinType::S32, PinDir::Out),
                decl("demo.running", PinType::Bit, PinDir::In),
                decl("demo.extra", PinType::U32, PinDir::Out),
            ],
        },
    );

    match reply {
        Some(HalMessage::BindReject { note }) => {
            assert!(note.contains("pin count mismatch"), "note was: {note}");
        }
        other => panic!("expected BindReject, got {other:?}"),
    }
    assert_eq!(registry.component("demo").unwrap().pins().len(), 2);
}

/// A type mismatch on one pin rejects the whole request.
#[test]
fn test_bind_rejects_single_pin_type_mismatch() {
    let (mut registry, _events) = ComponentRegistry::new();
    handle_command(&mut registry, "client-a", demo_bind());

    let reply = handle_command(
        &mut registry,
        "client-b",
        HalMessage::Bind {
            component: "demo".to_string(),
            pins: vec![
                decl("demo.speed", PinType::Float, PinDir::Out),
                decl("demo.running", PinType::Bit, PinDir::In),
            ],
        },
    );

    match reply {
        Some(HalMessage::BindReject { note }) => {
            assert!(note.contains("demo.speed"), "note must name the pin: {note}");
            assert!(note.contains("type mismatch"), "note was: {note}");
        }
        other => panic!("expected BindReject, got {other:?}"),
    }
}

/// Different component names are fully independent: each gets its own
/// handles and its own lifecycle.
#[test]
fn test_two_components_bind_independently() {
    let (mut registry, _events) = ComponentRegistry::new();

    handle_command(&mut registry, "client-a", demo_bind());
    let reply = handle_command(
        &mut registry,
        "client-b",
        HalMessage::Bind {
            component: "panel".to_string(),
            pins: vec![decl("panel.estop", PinType::Bit, PinDir::Out)],
        },
    );
    assert!(matches!(reply, Some(HalMessage::BindConfirm { .. })));

    let demo_speed = registry
        .component("demo")
        .unwrap()
        .pins()
        .by_name("demo.speed")
        .unwrap()
        .handle;
    let panel_estop = registry
        .component("panel")
        .unwrap()
        .pins()
        .by_name("panel.estop")
        .unwrap()
        .handle;
    assert_ne!(demo_speed, panel_estop);
}

/// The full command surface in one sitting: bind, ping, write a pin, and
/// get rejected for a stale handle.
#[test]
fn test_command_sequence_bind_ping_set() {
    let (mut registry, _events) = ComponentRegistry::new();
    handle_command(&mut registry, "client-a", demo_bind());
    let speed = registry
        .component("demo")
        .unwrap()
        .pins()
        .by_name("demo.speed")
        .unwrap()
        .handle;

    assert_eq!(
        handle_command(&mut registry, "client-a", HalMessage::Ping),
        Some(HalMessage::PingAck)
    );

    let applied = handle_command(
        &mut registry,
        "client-a",
        HalMessage::SetPins {
            pins: vec![PinWrite {
                handle: speed,
                value: PinValue::S32(1500),
            }],
        },
    );
    assert_eq!(applied, None, "a fully applied SET_PINS has no reply");
    assert_eq!(
        registry
            .component("demo")
            .unwrap()
            .pins()
            .by_handle(speed)
            .unwrap()
            .value,
        PinValue::S32(1500)
    );

    let rejected = handle_command(
        &mut registry,
        "client-a",
        HalMessage::SetPins {
            pins: vec![PinWrite {
                handle: 4242,
                value: PinValue::S32(0),
            }],
        },
    );
    assert!(matches!(rejected, Some(HalMessage::SetPinsReject { .. })));
}
