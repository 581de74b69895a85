//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the relay server behavior.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::connection::DEFAULT_MAX_LINE_LENGTH;
use crate::error::ServerError;

/// Default STARS port.
pub const DEFAULT_PORT: u16 = 6057;

/// Default directory holding `.cfg`, `.allow` and `.key` resources.
pub const DEFAULT_LIBRARY_DIR: &str = "takaserv-lib";

/// Default time a closing connection gets to take its queued output.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;

fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}

fn default_drain_timeout_ms() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_MS
}

/// How connections are scheduled.
///
/// Both modes drive the same [`Router`](crate::messaging::Router); they only
/// differ in who owns it and how socket readiness reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// One task multiplexes the listener and every connection; router state is
    /// owned by that task and never locked.
    #[default]
    EventLoop,
    /// A reader and a writer task per connection feeding a shared router task;
    /// router state sits behind a single mutex.
    Workers,
}

impl std::str::FromStr for ConcurrencyMode {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event_loop" | "single" => Ok(Self::EventLoop),
            "workers" | "multi" => Ok(Self::Workers),
            other => Err(ServerError::Config(format!(
                "Unknown concurrency mode: {other}. Must be one of: event_loop, workers"
            ))),
        }
    }
}

/// Configuration structure for the relay server.
///
/// Contains the listening address, where configuration resources live and
/// which scheduling model drives connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Directory with `allow.cfg`, `aliases.cfg`, permission lists and `<node>.allow`
    pub library_dir: PathBuf,

    /// Directory with `<node>.key` files; `library_dir` is used when unset
    pub key_dir: Option<PathBuf>,

    /// Scheduling model
    pub mode: ConcurrencyMode,

    /// Worker reaper polling interval in milliseconds (workers mode only)
    pub supervisor_interval_ms: u64,

    /// Bytes requested per socket read
    pub read_buffer_size: usize,

    /// Whether peer addresses are reverse-resolved to hostnames
    pub resolve_hostnames: bool,

    /// Longest accepted inbound line in bytes; longer lines drop the connection
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Milliseconds a gracefully closed connection may spend flushing output
    /// before it is dropped
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

impl ServerConfig {
    /// Directory `.key` files are read from.
    pub fn effective_key_dir(&self) -> PathBuf {
        self.key_dir
            .clone()
            .unwrap_or_else(|| self.library_dir.clone())
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.library_dir.as_os_str().is_empty() {
            return Err(ServerError::Config("Library directory cannot be empty".to_string()));
        }
        if self.read_buffer_size == 0 {
            return Err(ServerError::Config("read_buffer_size must be greater than 0".to_string()));
        }
        if self.max_line_length == 0 {
            return Err(ServerError::Config("max_line_length must be greater than 0".to_string()));
        }
        if self.mode == ConcurrencyMode::Workers && self.supervisor_interval_ms == 0 {
            return Err(ServerError::Config(
                "supervisor_interval_ms must be greater than 0 in workers mode".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            library_dir: PathBuf::from(DEFAULT_LIBRARY_DIR),
            key_dir: None,
            mode: ConcurrencyMode::EventLoop,
            supervisor_interval_ms: 500,
            read_buffer_size: 512,
            resolve_hostnames: true,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_dir_falls_back_to_library_dir() {
        let mut config = ServerConfig::default();
        assert_eq!(config.effective_key_dir(), PathBuf::from(DEFAULT_LIBRARY_DIR));

        config.key_dir = Some(PathBuf::from("/etc/stars/keys"));
        assert_eq!(config.effective_key_dir(), PathBuf::from("/etc/stars/keys"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("event_loop".parse::<ConcurrencyMode>().unwrap(), ConcurrencyMode::EventLoop);
        assert_eq!("multi".parse::<ConcurrencyMode>().unwrap(), ConcurrencyMode::Workers);
        assert!("threads".parse::<ConcurrencyMode>().is_err());
    }

    #[test]
    fn test_deserializes_from_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            bind_address = "127.0.0.1:7000"
            library_dir = "lib"
            mode = "workers"
            supervisor_interval_ms = 100
            read_buffer_size = 1024
            resolve_hostnames = false
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_address.port(), 7000);
        assert_eq!(config.mode, ConcurrencyMode::Workers);
        assert_eq!(config.key_dir, None);
        assert_eq!(config.effective_key_dir(), PathBuf::from("lib"));
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
        assert_eq!(config.drain_timeout_ms, DEFAULT_DRAIN_TIMEOUT_MS);
    }

    #[test]
    fn test_validation() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_ok());

        config.mode = ConcurrencyMode::Workers;
        config.supervisor_interval_ms = 0;
        assert!(config.validate().is_err());

        config.supervisor_interval_ms = 500;
        config.max_line_length = 0;
        assert!(config.validate().is_err());

        config.max_line_length = DEFAULT_MAX_LINE_LENGTH;
        config.library_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
