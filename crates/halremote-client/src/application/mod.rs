//! Application layer of the client.
//!
//! - **`mirror`** – the local pin mirror: populated at BIND_CONFIRM, kept
//!   current by full/incremental updates, never shared with the authority.
//! - **`state`** – the `cstate`/`sstate` connection state machine the
//!   embedding application drives.

pub mod mirror;
pub mod state;
