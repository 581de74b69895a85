//! # STARS Server - Main Entry Point
//!
//! Relay server for named nodes exchanging newline-terminated text messages.
//! This entry point handles CLI parsing, configuration loading, logging setup
//! and the application lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with defaults (port 6057, library in ./takaserv-lib)
//! stars
//!
//! # Custom port, library and key directories, task-per-connection mode
//! stars --port 7000 --lib /srv/stars/lib --key /srv/stars/keys --multi
//!
//! # JSON logs into a daily rotated file
//! stars --json-logs --log-file /var/log/stars/stars.log --log-rotation daily
//! ```
//!
//! ## Configuration
//!
//! When the configuration file (default: `stars.toml`) exists, its settings
//! are used and the command-line options are ignored. A missing file is not
//! an error and is never created.
//!
//! ## Signal Handling
//!
//! The server shuts down gracefully on SIGINT (Ctrl+C) and SIGTERM; a second
//! signal exits immediately.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for the STARS server.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
///
/// Called from `main` under `#[tokio::main]`.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let (config, config_source) = match AppConfig::load(&args).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Held until the process exits so buffered file output is flushed.
    let log_guard = match logging::setup_logging(&config.logging, args.json_logs) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ Failed to setup logging: {e}");
            std::process::exit(1);
        }
    };

    match Application::new(config, config_source) {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {}", e);
                drop(log_guard);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e}");
            drop(log_guard);
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for potential library usage
pub use config::{LoggingSettings, ServerSettings};
