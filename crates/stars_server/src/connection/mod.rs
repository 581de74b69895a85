//! Connection management for node connections.
//!
//! This module handles the lifecycle bookkeeping of stream connections:
//! identifiers, lifecycle states, peer identity, inbound line framing and
//! outbound queues with partial-write tracking.

pub mod client;
pub mod framing;
pub mod manager;

pub use client::{ClientConnection, PeerHost};
pub use framing::{LineBuffer, LineTooLong, OutboundQueue, ReadOutcome, DEFAULT_MAX_LINE_LENGTH};
pub use manager::ConnectionManager;

/// Type alias for connection identifiers.
///
/// Connection IDs are used to uniquely identify connections throughout their
/// lifecycle on the server. They are never reused.
pub type ConnectionId = usize;

/// Lifecycle of a connection.
///
/// `Connecting -> Unauthenticated -> Registered -> Closing -> Closed`; a
/// rejected handshake goes straight from `Unauthenticated` to `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Accepted, peer host not yet checked
    #[default]
    Connecting,
    /// Nonce issued, waiting for `<name> <credential>`
    Unauthenticated,
    /// Handshake complete; lines are routed
    Registered,
    /// Draining the outbound queue before the socket is closed
    Closing,
    Closed,
}

/// How a connection should be torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Flush whatever is queued, then close.
    Graceful,
    /// Drop the socket immediately, discarding queued output.
    Abort,
}
