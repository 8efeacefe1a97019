//! # halremote-server
//!
//! The HALremote authority: owns the component table, answers BIND / PING /
//! SET_PINS commands on the request/reply endpoint, and publishes full and
//! incremental pin updates on the topic-filtered update endpoint.
//!
//! The whole authority runs on one event loop (see
//! [`application::service::HalService`]): command requests, subscription
//! events, and the scan timer are all delivered as messages to that loop, so
//! no lock is ever taken on a component's pins.

pub mod application;
pub mod infrastructure;
