//! Server lifecycle and the two concurrency adapters.
//!
//! This module contains the main relay server structure, the single-task
//! event loop, the task-per-connection worker model and peer resolution.

pub mod core;
mod event_loop;
pub mod resolver;
mod workers;

pub use core::StarsServer;

use std::time::Duration;

use crate::config::ServerConfig;

/// Per-connection settings both adapters apply.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionSettings {
    pub read_buffer_size: usize,
    pub max_line_length: usize,
    pub resolve_hostnames: bool,
    /// How long a graceful close may wait for the peer to take queued output
    pub drain_timeout: Duration,
}

impl SessionSettings {
    pub(crate) fn from_config(config: &ServerConfig) -> Self {
        Self {
            read_buffer_size: config.read_buffer_size,
            max_line_length: config.max_line_length,
            resolve_hostnames: config.resolve_hostnames,
            drain_timeout: Duration::from_millis(config.drain_timeout_ms),
        }
    }
}
