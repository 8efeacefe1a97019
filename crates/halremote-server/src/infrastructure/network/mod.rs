//! TCP endpoints of the authority.
//!
//! Two listeners, mirroring the two logical channels of the protocol:
//!
//! - **`cmd`** – request/reply.  Each accepted connection is one client;
//!   the connection itself pairs replies to requests, which is all the
//!   correlation the protocol needs.
//! - **`update`** – publish/subscribe.  Subscribers send topic control
//!   frames; the fan-out delivers topic-tagged status messages to every
//!   connection subscribed to that topic.

pub mod cmd;
pub mod update;

pub use cmd::start_command_endpoint;
pub use update::{start_update_endpoint, UpdateFanout};

use std::net::SocketAddr;

use thiserror::Error;

/// Error type for endpoint start-up.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
