//! Line routing between registered nodes.
//!
//! This module provides the wire grammar, the [`Router`] that owns all
//! session state, the built-in `System` command set and the effect list the
//! router hands back to the I/O layer, plus the resource lookups adapters
//! run ahead of handshakes and reloads.

pub mod commands;
pub mod outbox;
pub mod prefetch;
pub mod router;
pub mod types;

pub use commands::SystemCommand;
pub use outbox::{Effect, Outbox};
pub use prefetch::{Lookup, NodeCredentials, Prefetched};
pub use router::Router;
pub use types::RoutedLine;
