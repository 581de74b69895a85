//! Client connection representation and management.
//!
//! This module defines the structure of individual node connections,
//! tracking their state and peer metadata.

use super::ConnectionState;
use std::net::SocketAddr;
use std::time::SystemTime;

/// Resolved identity of the remote end of a connection.
///
/// `hostname` falls back to the IP text when reverse resolution fails or is
/// disabled, so both fields are always usable for host-list checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerHost {
    pub hostname: String,
    pub ip: String,
}

impl PeerHost {
    pub fn new(hostname: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ip: ip.into(),
        }
    }

    /// A peer known only by its address.
    pub fn from_ip(addr: &SocketAddr) -> Self {
        let ip = addr.ip().to_string();
        Self {
            hostname: ip.clone(),
            ip,
        }
    }
}

/// Represents an individual connection to the server.
///
/// # Fields
///
/// * `remote_addr` - The network address of the connected peer
/// * `peer` - Hostname/IP resolved once at accept time
/// * `connected_at` - Timestamp when the connection was established
/// * `state` - Current lifecycle state
#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub remote_addr: SocketAddr,
    pub peer: PeerHost,
    pub connected_at: SystemTime,
    pub state: ConnectionState,
}

impl ClientConnection {
    /// Creates a new connection record in the `Connecting` state.
    pub fn new(remote_addr: SocketAddr, peer: PeerHost) -> Self {
        Self {
            remote_addr,
            peer,
            connected_at: SystemTime::now(),
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn is_registered(&self) -> bool {
        self.state == ConnectionState::Registered
    }
}
