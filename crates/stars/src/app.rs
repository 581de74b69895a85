//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that validates the merged
//! configuration, starts the relay server and coordinates shutdown.

use crate::{
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, wait_for_signal},
};
use stars_server::{ShutdownState, StarsServer};
use std::path::PathBuf;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

/// How long a graceful shutdown may take before the application gives up waiting.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(8);

/// Main application struct.
///
/// The `Application` owns the effective configuration and the relay server
/// built from it, and runs the server until a termination signal arrives.
pub struct Application {
    /// Effective application configuration
    config: AppConfig,
    /// Configuration file the settings came from, if one existed
    config_source: Option<PathBuf>,
    /// Relay server instance
    server: StarsServer,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Arguments
    ///
    /// * `config` - Effective configuration (file or command line)
    /// * `config_source` - The file `config` was read from, if any
    ///
    /// # Returns
    ///
    /// A configured `Application` instance ready to run, or an error if the
    /// configuration is invalid.
    pub fn new(config: AppConfig, config_source: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration validated successfully");

        display_banner();

        let server = StarsServer::new(config.to_server_config()?);
        Ok(Self {
            config,
            config_source,
            server,
        })
    }

    /// Runs the server until a termination signal or a fatal server error.
    ///
    /// # Returns
    ///
    /// `Ok(())` after a graceful shutdown, or the error that stopped the
    /// server (for example a port that could not be bound).
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.log_configuration_summary();

        let shutdown_state = ShutdownState::new();
        let mut server_handle = {
            let server = self.server;
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move { server.start_with_shutdown_state(shutdown_state).await })
        };

        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            finished = &mut server_handle => {
                return match finished {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        error!("❌ Server error: {}", e);
                        Err(e.into())
                    }
                    Err(e) => Err(e.into()),
                };
            }
            signal = setup_signal_handlers(&shutdown_state) => signal?,
        }

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("⏳ Waiting for the server to drop its connections...");
        match timeout(SHUTDOWN_TIMEOUT, server_handle).await {
            Ok(Ok(Ok(()))) => info!("✅ Server task completed gracefully"),
            Ok(Ok(Err(e))) => error!("❌ Server error during shutdown: {}", e),
            Ok(Err(e)) => error!("❌ Server task failed: {}", e),
            Err(_) => warn!("⏰ Server task did not complete within {:?}", SHUTDOWN_TIMEOUT),
        }

        info!("✅ STARS server shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        match &self.config_source {
            Some(path) => info!("  📂 Config file: {}", path.display()),
            None => info!("  📂 Config file: none (command line)"),
        }
        info!(
            "  🌐 Listening on: {}:{}",
            self.config.server.bind_host, self.config.server.port
        );
        info!("  📚 Library directory: {}", self.config.server.library_dir);
        if !self.config.server.key_dir.is_empty() {
            info!("  🔑 Key directory: {}", self.config.server.key_dir);
        }
        info!("  🧵 Mode: {}", self.config.server.mode);
        info!("  🔎 Resolve hostnames: {}", self.config.server.resolve_hostnames);
    }
}
