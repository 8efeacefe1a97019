//! Request/reply handling for the command endpoint.
//!
//! One request per call, stateless across requests apart from the registry.
//! The reply (if any) goes back to the requesting client only; the transport
//! layer owns the pairing of replies to connections.

use halremote_core::protocol::messages::PinDecl;
use halremote_core::HalMessage;
use tracing::{info, warn};

use crate::application::registry::ComponentRegistry;

/// Handles one command-channel message and produces the reply to send back.
///
/// `client` is a stable label for the requesting connection, used only for
/// logging.  Returns `None` when the protocol defines no reply (a fully
/// applied SET_PINS, or an unexpected message that is dropped).
pub fn handle_command(
    registry: &mut ComponentRegistry,
    client: &str,
    message: HalMessage,
) -> Option<HalMessage> {
    match message {
        HalMessage::Bind { component, pins } => {
            Some(handle_bind(registry, client, &component, &pins))
        }

        // Liveness probe: answer immediately, no side effects on pin state.
        HalMessage::Ping => Some(HalMessage::PingAck),

        HalMessage::SetPins { pins } => handle_set_pins(registry, client, &pins),

        other => {
            warn!(
                client,
                message_type = ?other.message_type(),
                "unexpected message on command channel"
            );
            None
        }
    }
}

fn handle_bind(
    registry: &mut ComponentRegistry,
    client: &str,
    component: &str,
    pins: &[PinDecl],
) -> HalMessage {
    match registry.bind(component, pins) {
        Ok((outcome, comp)) => {
            info!(client, component, ?outcome, "bound");
            // The confirm carries the authoritative layout; handles are
            // learned from the full update that follows the subscribe.
            let authoritative = comp
                .pins()
                .iter()
                .map(|p| PinDecl {
                    name: p.name.clone(),
                    pin_type: p.pin_type,
                    dir: p.dir,
                })
                .collect();
            HalMessage::BindConfirm {
                component: component.to_string(),
                pins: authoritative,
            }
        }
        Err(e) => {
            warn!(client, component, error = %e, "bind rejected");
            HalMessage::BindReject { note: e.to_string() }
        }
    }
}

fn handle_set_pins(
    registry: &mut ComponentRegistry,
    client: &str,
    pins: &[halremote_core::protocol::messages::PinWrite],
) -> Option<HalMessage> {
    // Writes are applied in order; the first failure produces a diagnostic
    // reject naming the offending handle.  Earlier writes in the same
    // request stay applied — this is a reject, not a rollback.
    for write in pins {
        if let Err(e) = registry.set_pin(write.handle, write.value) {
            let note = format!("pin handle {}: {e}", write.handle);
            warn!(client, %note, "set pins rejected");
            return Some(HalMessage::SetPinsReject { note });
        }
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────
