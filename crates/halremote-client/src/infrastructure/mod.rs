//! Infrastructure layer: the two TCP channels to the authority.

pub mod network;
