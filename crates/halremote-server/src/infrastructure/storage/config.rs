//! TOML-based configuration for the authority daemon.
//!
//! Reads and writes [`ServerConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\HALremote\halremoted.toml`
//! - Linux:    `~/.config/halremote/halremoted.toml`
//! - macOS:    `~/Library/Application Support/HALremote/halremoted.toml`
//!
//! Fields annotated with `#[serde(default = "…")]` fall back to their
//! defaults when absent, so the daemon runs correctly on first start (no
//! file yet) and after upgrades that introduce new fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use halremote_core::protocol::messages::{DEFAULT_CMD_PORT, DEFAULT_UPDATE_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Scan-loop and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Publisher scan interval in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Network port and bind-address settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// TCP port of the command (request/reply) endpoint.
    #[serde(default = "default_cmd_port")]
    pub cmd_port: u16,
    /// TCP port of the update (publish/subscribe) endpoint.
    #[serde(default = "default_update_port")]
    pub update_port: u16,
    /// IP address to bind both listeners to.  `"0.0.0.0"` binds all
    /// interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_tick_ms() -> u64 {
    20
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cmd_port() -> u16 {
    DEFAULT_CMD_PORT
}
fn default_update_port() -> u16 {
    DEFAULT_UPDATE_PORT
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cmd_port: default_cmd_port(),
            update_port: default_update_port(),
            bind_address: default_bind_address(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("halremoted.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads [`ServerConfig`] from `path` (or the platform default location),
/// returning `ServerConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than
/// "not found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: ServerConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to `path` (or the platform default location), creating
/// parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &ServerConfig, path: Option<&Path>) -> Result<(), ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("HALremote"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("halremote"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("HALremote")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_expected_ports() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.network.cmd_port, 4711);
        assert_eq!(cfg.network.update_port, 4712);
    }

    #[test]
    fn test_default_tick_is_twenty_milliseconds() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.service.tick_ms, 20);
    }

    #[test]
    fn test_default_log_level_is_info() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.service.log_level, "info");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = ServerConfig::default();
        cfg.network.cmd_port = 9000;
        cfg.service.tick_ms = 50;

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: ServerConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_deserialize_partial_network_overrides_defaults() {
        let toml_str = r#"
[network]
cmd_port = 9999
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).expect("deserialize partial");
        assert_eq!(cfg.network.cmd_port, 9999);
        assert_eq!(cfg.network.update_port, 4712);
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<ServerConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/halremoted.toml");
        let cfg = load_config(Some(&path)).expect("absent file must yield defaults");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        let dir = std::env::temp_dir().join(format!("halremote_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("halremoted.toml");

        let mut cfg = ServerConfig::default();
        cfg.network.bind_address = "127.0.0.1".to_string();
        cfg.service.log_level = "debug".to_string();

        save_config(&cfg, Some(&path)).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded, cfg);

        std::fs::remove_dir_all(&dir).ok();
    }
}
