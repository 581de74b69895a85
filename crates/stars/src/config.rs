//! Configuration management for the STARS server.
//!
//! This module handles loading, validation, and conversion of server
//! configuration from TOML files and command-line arguments. A configuration
//! file that exists replaces the command line entirely; sections or keys it
//! omits fall back to the built-in defaults.

use crate::cli::CliArgs;
use serde::{Deserialize, Serialize};
use stars_server::config::{DEFAULT_LIBRARY_DIR, DEFAULT_PORT};
use stars_server::{ConcurrencyMode, ServerConfig};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Log levels accepted by `logging.level` and `--log-level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Rotations accepted by `logging.rotation` and `--log-rotation`.
pub const LOG_ROTATIONS: [&str; 3] = ["never", "hourly", "daily"];

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listening port
    pub port: u16,
    /// Address to listen on
    pub bind_host: String,
    /// Directory of `.cfg` and `.allow` resources
    pub library_dir: String,
    /// Directory of `.key` files; empty means `library_dir`
    pub key_dir: String,
    /// `event_loop` or `workers`
    pub mode: String,
    /// Worker reaper polling interval in milliseconds
    pub supervisor_interval_ms: u64,
    /// Reverse-resolve peer addresses
    pub resolve_hostnames: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_host: "0.0.0.0".to_string(),
            library_dir: DEFAULT_LIBRARY_DIR.to_string(),
            key_dir: String::new(),
            mode: "event_loop".to_string(),
            supervisor_interval_ms: 500,
            resolve_hostnames: true,
        }
    }
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Log file path; empty means stdout
    pub file: String,
    /// File rotation (never, hourly, daily)
    pub rotation: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file: String::new(),
            rotation: "never".to_string(),
        }
    }
}

impl AppConfig {
    /// Resolves the effective configuration for `args`.
    ///
    /// If `args.config_path` exists its contents are used as-is; otherwise
    /// the command-line values are applied over the defaults. A missing file
    /// is not created.
    ///
    /// # Returns
    ///
    /// The configuration together with the file it came from, if any.
    pub async fn load(args: &CliArgs) -> Result<(Self, Option<PathBuf>), Box<dyn std::error::Error>> {
        match Self::load_from_file(&args.config_path).await? {
            Some(config) => Ok((config, Some(args.config_path.clone()))),
            None => Ok((Self::from_args(args), None)),
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the file does not exist, the parsed configuration
    /// otherwise, or an error if reading or parsing failed.
    pub async fn load_from_file(path: &Path) -> Result<Option<Self>, Box<dyn std::error::Error>> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?;
        Ok(Some(config))
    }

    /// Builds a configuration from the defaults and the command line.
    pub fn from_args(args: &CliArgs) -> Self {
        let mut config = Self::default();

        if let Some(port) = args.port {
            config.server.port = port;
        }
        if let Some(library_dir) = &args.library_dir {
            config.server.library_dir = library_dir.to_string_lossy().to_string();
        }
        if let Some(key_dir) = &args.key_dir {
            config.server.key_dir = key_dir.to_string_lossy().to_string();
        }
        if args.multi {
            config.server.mode = "workers".to_string();
        }
        if let Some(level) = &args.log_level {
            config.logging.level = level.clone();
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if let Some(file) = &args.log_file {
            config.logging.file = file.clone();
        }
        if let Some(rotation) = &args.log_rotation {
            config.logging.rotation = rotation.clone();
        }

        config
    }

    /// Converts the application configuration to a relay server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let host: IpAddr = self
            .server
            .bind_host
            .parse()
            .map_err(|e| format!("Invalid bind host {}: {e}", self.server.bind_host))?;
        let key_dir = Some(self.server.key_dir.as_str())
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        Ok(ServerConfig {
            bind_address: SocketAddr::new(host, self.server.port),
            library_dir: PathBuf::from(&self.server.library_dir),
            key_dir,
            mode: self.server.mode.parse::<ConcurrencyMode>()?,
            supervisor_interval_ms: self.server.supervisor_interval_ms,
            resolve_hostnames: self.server.resolve_hostnames,
            ..ServerConfig::default()
        })
    }

    /// Validates the merged configuration.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Port must be greater than 0".to_string());
        }

        if self.server.bind_host.parse::<IpAddr>().is_err() {
            return Err(format!("Invalid bind host: {}", &self.server.bind_host));
        }

        if self.server.library_dir.is_empty() {
            return Err("Library directory cannot be empty".to_string());
        }

        match self.server.mode.parse::<ConcurrencyMode>() {
            Err(e) => return Err(e.to_string()),
            Ok(ConcurrencyMode::Workers) if self.server.supervisor_interval_ms == 0 => {
                return Err("supervisor_interval_ms must be greater than 0".to_string());
            }
            Ok(_) => {}
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        if !LOG_ROTATIONS.contains(&self.logging.rotation.as_str()) {
            return Err(format!(
                "Invalid log rotation: {}. Must be one of: {LOG_ROTATIONS:?}",
                &self.logging.rotation
            ));
        }

        Ok(())
    }
}
