//! Persistence for the authority: TOML configuration.

pub mod config;

pub use config::{load_config, save_config, ConfigError, ServerConfig};
