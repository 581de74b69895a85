//! Directory store for registered nodes.
//!
//! Tracks which connection owns which node name, the handshake nonce issued
//! to connections that have not registered yet, the alias table and the
//! flag subscriptions. Everything here is plain in-memory state; the owner
//! (the router) decides whether it sits behind a lock.

pub mod aliases;
pub mod subscriptions;

pub use aliases::AliasTable;
pub use subscriptions::{SubscriptionError, SubscriptionRegistry};

use crate::connection::ConnectionId;
use std::collections::HashMap;

/// Bidirectional node-name <-> connection mapping plus pending nonces.
///
/// All lookups are O(1) average. A node name maps to at most one connection;
/// re-registering a name is only done by the reconnect protocol, which
/// removes the previous owner first.
#[derive(Debug, Default)]
pub struct Directory {
    nodes: HashMap<String, ConnectionId>,
    handles: HashMap<ConnectionId, String>,
    pending_nonces: HashMap<ConnectionId, u32>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `node` on `connection` and drops its pending nonce.
    ///
    /// Returns the connection that previously owned the name, if any; its
    /// reverse entry is removed so it no longer resolves to `node`.
    pub fn register(&mut self, node: &str, connection: ConnectionId) -> Option<ConnectionId> {
        self.pending_nonces.remove(&connection);
        let previous = self.nodes.insert(node.to_string(), connection);
        if let Some(previous) = previous.filter(|&p| p != connection) {
            self.handles.remove(&previous);
        }
        self.handles.insert(connection, node.to_string());
        previous.filter(|&p| p != connection)
    }

    /// Removes every entry of `connection`. Safe to call more than once.
    pub fn unregister(&mut self, connection: ConnectionId) -> Option<String> {
        self.pending_nonces.remove(&connection);
        let node = self.handles.remove(&connection)?;
        if self.nodes.get(&node) == Some(&connection) {
            self.nodes.remove(&node);
        }
        Some(node)
    }

    pub fn lookup(&self, name: &str) -> Option<ConnectionId> {
        self.nodes.get(name).copied()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Node name a connection is registered under.
    pub fn node_of(&self, connection: ConnectionId) -> Option<&str> {
        self.handles.get(&connection).map(String::as_str)
    }

    pub fn set_nonce(&mut self, connection: ConnectionId, nonce: u32) {
        self.pending_nonces.insert(connection, nonce);
    }

    pub fn nonce(&self, connection: ConnectionId) -> Option<u32> {
        self.pending_nonces.get(&connection).copied()
    }

    /// Registered node names, sorted.
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut directory = Directory::new();
        directory.set_nonce(1, 4821);

        assert_eq!(directory.register("Alice", 1), None);
        assert_eq!(directory.lookup("Alice"), Some(1));
        assert_eq!(directory.node_of(1), Some("Alice"));
        assert_eq!(directory.nonce(1), None, "nonce is dropped on registration");
        assert!(directory.is_registered("Alice"));
        assert!(!directory.is_registered("alice"), "names are case-sensitive");
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut directory = Directory::new();
        directory.register("Alice", 1);

        assert_eq!(directory.unregister(1), Some("Alice".to_string()));
        assert_eq!(directory.unregister(1), None);
        assert!(directory.lookup("Alice").is_none());
        assert!(directory.is_empty());
    }

    #[test]
    fn test_reregister_displaces_previous_owner() {
        let mut directory = Directory::new();
        directory.register("Alice", 1);

        assert_eq!(directory.register("Alice", 2), Some(1));
        assert_eq!(directory.lookup("Alice"), Some(2));
        assert_eq!(directory.node_of(1), None);

        // A late purge of the displaced connection must not evict the new owner.
        assert_eq!(directory.unregister(1), None);
        assert_eq!(directory.lookup("Alice"), Some(2));
    }

    #[test]
    fn test_unregister_clears_pending_nonce() {
        let mut directory = Directory::new();
        directory.set_nonce(7, 12);
        assert_eq!(directory.unregister(7), None);
        assert_eq!(directory.nonce(7), None);
    }

    #[test]
    fn test_node_names_sorted() {
        let mut directory = Directory::new();
        directory.register("Zed", 1);
        directory.register("Alice", 2);
        directory.register("Debugger", 3);
        assert_eq!(directory.node_names(), vec!["Alice", "Debugger", "Zed"]);
        assert_eq!(directory.len(), 3);
    }
}
