//! Command-line interface handling for the STARS server.
//!
//! This module provides command-line argument parsing using the `clap`
//! builder API. Every option is optional; when a configuration file exists it
//! takes precedence over whatever is given here.

use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "stars.toml";

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional listening port
    pub port: Option<u16>,
    /// Optional library directory (`allow.cfg`, `aliases.cfg`, permission lists)
    pub library_dir: Option<PathBuf>,
    /// Optional directory holding `<node>.key` files
    pub key_dir: Option<PathBuf>,
    /// Run connections as reader/writer tasks instead of the event loop
    pub multi: bool,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional log file; stdout when absent
    pub log_file: Option<String>,
    /// Optional log file rotation (never, hourly, daily)
    pub log_rotation: Option<String>,
}

impl CliArgs {
    /// Parses the process arguments.
    ///
    /// # Returns
    ///
    /// A `CliArgs` instance containing all parsed command-line options. On
    /// invalid input clap prints usage and exits the process.
    pub fn parse() -> Self {
        Self::try_parse_from(std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    /// Parses an explicit argument list, first element being the program name.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
            port: matches.get_one::<u16>("port").copied(),
            library_dir: matches.get_one::<String>("lib").map(PathBuf::from),
            key_dir: matches.get_one::<String>("key").map(PathBuf::from),
            multi: matches.get_flag("multi"),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            log_file: matches.get_one::<String>("log-file").cloned(),
            log_rotation: matches.get_one::<String>("log-rotation").cloned(),
        }
    }
}

fn command() -> Command {
    Command::new("STARS Server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Line-oriented message relay for named nodes")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (overrides the options below when present)")
                .default_value(DEFAULT_CONFIG_FILE),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Listening port")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("lib")
                .short('l')
                .long("lib")
                .value_name("DIR")
                .help("Library directory with allow.cfg, aliases.cfg and permission lists"),
        )
        .arg(
            Arg::new("key")
                .short('k')
                .long("key")
                .value_name("DIR")
                .help("Directory with <node>.key files (defaults to the library directory)"),
        )
        .arg(
            Arg::new("multi")
                .long("multi")
                .help("Serve each connection with its own reader and writer task")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("FILE")
                .help("Write logs to FILE instead of stdout"),
        )
        .arg(
            Arg::new("log-rotation")
                .long("log-rotation")
                .value_name("ROTATION")
                .help("Log file rotation (never, hourly, daily)"),
        )
}
