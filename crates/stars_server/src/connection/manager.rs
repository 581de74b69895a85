//! Connection manager for tracking live connections.
//!
//! This module provides the table of every connection the router knows about,
//! registered or not, and hands out connection identifiers.

use super::{client::ClientConnection, ConnectionId, ConnectionState, PeerHost};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Central table of all live connections.
///
/// # Architecture
///
/// * Implements atomic connection ID generation (IDs are never reused)
/// * Stores peer identity and lifecycle state per connection
/// * Owned by the router; the concurrency adapter decides how it is shared
#[derive(Debug)]
pub struct ConnectionManager {
    /// Map of connection ID to connection information
    connections: HashMap<ConnectionId, ClientConnection>,

    /// Atomic counter for generating unique connection IDs
    next_id: AtomicUsize,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Adds a new connection and returns its unique ID.
    pub fn add_connection(&mut self, remote_addr: SocketAddr, peer: PeerHost) -> ConnectionId {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(
            "🔗 Connection {} from {} ({})",
            connection_id, peer.hostname, remote_addr
        );
        self.connections
            .insert(connection_id, ClientConnection::new(remote_addr, peer));
        connection_id
    }

    /// Removes a connection, returning its record if it was still known.
    pub fn remove_connection(&mut self, connection_id: ConnectionId) -> Option<ClientConnection> {
        let mut connection = self.connections.remove(&connection_id)?;
        connection.set_state(ConnectionState::Closed);
        info!(
            "❌ Connection {} from {} closed",
            connection_id, connection.remote_addr
        );
        Some(connection)
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&ClientConnection> {
        self.connections.get(&connection_id)
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    pub fn state(&self, connection_id: ConnectionId) -> Option<ConnectionState> {
        self.connections.get(&connection_id).map(ClientConnection::state)
    }

    pub fn set_state(&mut self, connection_id: ConnectionId, state: ConnectionState) {
        if let Some(connection) = self.connections.get_mut(&connection_id) {
            connection.set_state(state);
        }
    }

    pub fn peer(&self, connection_id: ConnectionId) -> Option<&PeerHost> {
        self.connections.get(&connection_id).map(|c| &c.peer)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
