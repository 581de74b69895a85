//! Utility functions and helper methods for the relay server.
//!
//! This module provides convenient factory functions for creating server
//! instances with different configurations.

use crate::{config::ServerConfig, server::StarsServer};

/// Creates a new relay server with default configuration.
///
/// Listens on `0.0.0.0:6057` and reads resources from `takaserv-lib`.
///
/// # Example
///
/// ```rust
/// use stars_server::create_server;
///
/// let server = create_server();
/// assert_eq!(server.config().bind_address.port(), 6057);
/// ```
pub fn create_server() -> StarsServer {
    StarsServer::new(ServerConfig::default())
}

/// Creates a new relay server with custom configuration.
///
/// # Arguments
///
/// * `config` - A `ServerConfig` instance with desired settings
///
/// # Example
///
/// ```rust
/// use stars_server::{create_server_with_config, ConcurrencyMode, ServerConfig};
///
/// let config = ServerConfig {
///     bind_address: "0.0.0.0:9000".parse().unwrap(),
///     mode: ConcurrencyMode::Workers,
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config);
/// assert_eq!(server.config().mode, ConcurrencyMode::Workers);
/// ```
pub fn create_server_with_config(config: ServerConfig) -> StarsServer {
    StarsServer::new(config)
}
