//! Application layer of the authority.
//!
//! - **`registry`** – the component table: create-on-first-bind,
//!   validate-on-rebind, handle assignment, bound/unbound lifecycle.
//! - **`command`** – the request/reply handler for BIND, PING, and SET_PINS.
//! - **`publisher`** – full-snapshot-on-subscribe and per-tick incremental
//!   diffs, stamped with the per-component update serial.
//! - **`service`** – the single-threaded event loop that owns the registry
//!   and drives the other two.

pub mod command;
pub mod publisher;
pub mod registry;
pub mod service;
