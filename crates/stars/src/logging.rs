//! Logging system setup and configuration.
//!
//! This module handles the initialization of the tracing-based logging
//! system with support for human-readable and JSON output, written either to
//! stdout or to a rotating file through `tracing-appender`.

use crate::config::LoggingSettings;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system with the specified configuration.
///
/// # Arguments
///
/// * `config` - Logging configuration
/// * `json_format` - Whether to force JSON output format (CLI override)
///
/// # Returns
///
/// The file writer guard when logging to a file. It must be kept alive for
/// the lifetime of the process or buffered lines are lost.
///
/// # Features
///
/// * **Environment variable support** - Respects `RUST_LOG` if set
/// * **Flexible formatting** - Human-readable or JSON output
/// * **File output** - Non-blocking writer with never/hourly/daily rotation
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let (writer, guard, ansi) = if config.file.is_empty() {
        (BoxMakeWriter::new(std::io::stdout), None, true)
    } else {
        let appender = file_appender(&config.file, &config.rotation)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        (BoxMakeWriter::new(non_blocking), Some(guard), false)
    };

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(fmt::layer()
                .json()
                .with_writer(writer)
                .with_file(false)
                .with_line_number(false)
                .with_thread_ids(true)
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_file(false)
                .with_line_number(false)
                .with_thread_ids(true)
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    if !config.file.is_empty() {
        info!("📝 Writing logs to {} (rotation: {})", config.file, config.rotation);
    }
    Ok(guard)
}

/// Maps a configured rotation name to its `tracing-appender` value.
pub fn parse_rotation(rotation: &str) -> Result<Rotation, String> {
    match rotation {
        "never" => Ok(Rotation::NEVER),
        "hourly" => Ok(Rotation::HOURLY),
        "daily" => Ok(Rotation::DAILY),
        other => Err(format!("Invalid log rotation: {other}")),
    }
}

fn file_appender(file: &str, rotation: &str) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let path = Path::new(file);
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| format!("Log file path has no file name: {file}"))?;
    std::fs::create_dir_all(directory)?;
    let appender = RollingFileAppender::builder()
        .rotation(parse_rotation(rotation)?)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory)?;
    Ok(appender)
}

/// Displays the startup banner through the logging system.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║              🛰️  STARS SERVER             ║");
    info!("║                 v{:<24}║", version);
    info!("║                                          ║");
    info!("║  Line-oriented relay for named nodes     ║");
    info!("╚══════════════════════════════════════════╝");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rotation() {
        assert_eq!(parse_rotation("never").unwrap(), Rotation::NEVER);
        assert_eq!(parse_rotation("hourly").unwrap(), Rotation::HOURLY);
        assert_eq!(parse_rotation("daily").unwrap(), Rotation::DAILY);
        assert!(parse_rotation("weekly").is_err());
    }

    #[test]
    fn test_file_appender_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("logs").join("stars.log");
        let appender = file_appender(&file.to_string_lossy(), "never");
        assert!(appender.is_ok());
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_file_appender_rejects_bad_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stars.log");
        assert!(file_appender(&file.to_string_lossy(), "weekly").is_err());
    }
}
