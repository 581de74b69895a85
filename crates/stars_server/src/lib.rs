//! # STARS Server - Line-Oriented Message Relay
//!
//! A central relay for named nodes. Nodes connect over TCP, authenticate with
//! a name/key handshake and exchange newline-terminated text messages
//! addressed by node name. The server reads only the routing header of a
//! line; payloads are forwarded untouched apart from a small set of built-in
//! `System` commands.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Directory** - node name <-> connection maps, pending nonces, aliases
//!   and flag subscriptions
//! * **Permission Filter** - command, reconnect and host pattern lists
//! * **Handshake** - nonce challenge answered from a per-node key file
//! * **Router** - parses lines, resolves aliases, filters and delivers
//! * **System Commands** - `flgon`, `disconnect`, `listnodes`, reloads, ...
//! * **I/O adapters** - a single-task event loop or a task-per-connection
//!   worker model, both driving the same [`messaging::Router`]
//!
//! ### Message Flow
//!
//! 1. The server sends a decimal nonce; the node answers `<name> <key>`
//! 2. The key must equal line `nonce mod len` of `<name>.key`
//! 3. Registered nodes send `[sender>]destination payload` lines
//! 4. The router resolves aliases, applies the command filter, and either
//!    delivers `sender>destination payload` or runs a `System` command
//!
//! ## Configuration
//!
//! The server is configured through [`ServerConfig`]: bind address, the
//! library directory holding `allow.cfg`, `aliases.cfg` and the permission
//! lists, an optional key directory and the concurrency mode.
//!
//! ## Error Handling
//!
//! Failures on the wire are answered with `Er:` lines and logged. Start-up
//! failures (bad configuration, unreadable resources, bind errors) surface as
//! [`ServerError`].
//!
//! ## Thread Safety
//!
//! The router itself is plain owned state. In event-loop mode it belongs to
//! one task; in worker mode it sits behind a single `tokio::sync::Mutex`
//! together with the per-connection task handles.

// Re-export core types and functions for easy access
pub use config::{ConcurrencyMode, ServerConfig};
pub use error::ServerError;
pub use server::StarsServer;
pub use shutdown::ShutdownState;
pub use utils::{create_server, create_server_with_config};

// Public module declarations
pub mod auth;
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod messaging;
pub mod resources;
pub mod security;
pub mod server;
pub mod shutdown;
pub mod utils;
