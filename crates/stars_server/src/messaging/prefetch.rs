//! Resource reads a line depends on.
//!
//! A handshake needs the node's `.allow` and `.key` files and the reload
//! verbs need their lists before the router can act on them.
//! [`Router::lookup_for`](crate::messaging::Router::lookup_for) names those
//! reads up front so an adapter can run them on the blocking pool and hand
//! the result to [`Router::handle_prefetched`](crate::messaging::Router::handle_prefetched).

use std::sync::Arc;
use tracing::warn;

use crate::connection::PeerHost;
use crate::directory::AliasTable;
use crate::error::ServerError;
use crate::messaging::router::load_aliases;
use crate::resources::{self, ResourceLoader};
use crate::security::{node_host_allowed, ListPair, PermissionFilter};

/// What has to be read before a line can be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// `<node>.allow` verdict for `peer` and the lines of `<node>.key`
    Credentials { node: String, peer: PeerHost },
    Aliases,
    CommandLists,
    ReconnectLists,
}

/// Library state a node authenticates against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeCredentials {
    pub host_allowed: bool,
    /// `None` when the key file is missing or unreadable
    pub keys: Option<Vec<String>>,
}

impl NodeCredentials {
    pub fn load(resources: &dyn ResourceLoader, node: &str, peer: &PeerHost) -> Self {
        let host_allowed = node_host_allowed(resources, node, &peer.hostname, &peer.ip);
        let keys = match resources.load_keys(&resources::node_key_resource(node)) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("⚠️ {}", e);
                None
            }
        };
        Self { host_allowed, keys }
    }
}

/// Outcome of a [`Lookup`].
#[derive(Debug)]
pub enum Prefetched {
    Credentials(NodeCredentials),
    Aliases(Result<AliasTable, ServerError>),
    CommandLists(Result<ListPair, ServerError>),
    ReconnectLists(Result<ListPair, ServerError>),
}

impl Prefetched {
    pub fn into_credentials(self) -> Option<NodeCredentials> {
        match self {
            Prefetched::Credentials(credentials) => Some(credentials),
            _ => None,
        }
    }

    pub fn into_aliases(self) -> Option<Result<AliasTable, ServerError>> {
        match self {
            Prefetched::Aliases(aliases) => Some(aliases),
            _ => None,
        }
    }

    pub fn into_command_lists(self) -> Option<Result<ListPair, ServerError>> {
        match self {
            Prefetched::CommandLists(lists) => Some(lists),
            _ => None,
        }
    }

    pub fn into_reconnect_lists(self) -> Option<Result<ListPair, ServerError>> {
        match self {
            Prefetched::ReconnectLists(lists) => Some(lists),
            _ => None,
        }
    }
}

impl Lookup {
    /// Performs the reads on the calling thread.
    pub fn run(&self, resources: &dyn ResourceLoader) -> Prefetched {
        match self {
            Lookup::Credentials { node, peer } => {
                Prefetched::Credentials(NodeCredentials::load(resources, node, peer))
            }
            Lookup::Aliases => Prefetched::Aliases(load_aliases(resources)),
            Lookup::CommandLists => {
                Prefetched::CommandLists(PermissionFilter::load_command_lists(resources))
            }
            Lookup::ReconnectLists => {
                Prefetched::ReconnectLists(PermissionFilter::load_reconnect_lists(resources))
            }
        }
    }

    /// Performs the reads on the blocking thread pool.
    ///
    /// A lookup task that dies yields the same answer as an unreadable
    /// resource: no credentials, or a failed reload.
    pub async fn run_blocking(self, resources: Arc<dyn ResourceLoader>) -> Prefetched {
        let lookup = self.clone();
        match tokio::task::spawn_blocking(move || lookup.run(resources.as_ref())).await {
            Ok(prefetched) => prefetched,
            Err(e) => {
                warn!("⚠️ Resource lookup {:?} failed: {}", self, e);
                self.failed(e.to_string())
            }
        }
    }

    fn failed(&self, reason: String) -> Prefetched {
        let error = || ServerError::Internal(reason.clone());
        match self {
            Lookup::Credentials { .. } => Prefetched::Credentials(NodeCredentials::default()),
            Lookup::Aliases => Prefetched::Aliases(Err(error())),
            Lookup::CommandLists => Prefetched::CommandLists(Err(error())),
            Lookup::ReconnectLists => Prefetched::ReconnectLists(Err(error())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::LibraryResources;
    use std::fs;

    fn peer() -> PeerHost {
        PeerHost::new("localhost", "127.0.0.1")
    }

    #[test]
    fn test_credentials_read_allow_and_key_files() {
        let dir = tempfile::tempdir().unwrap();
        let resources = LibraryResources::new(dir.path(), dir.path());
        fs::write(dir.path().join("Alice.key"), "secretA\nsecretB\n").unwrap();
        fs::write(dir.path().join("Bob.allow"), "192.168.*\n").unwrap();

        let alice = NodeCredentials::load(&resources, "Alice", &peer());
        assert!(alice.host_allowed);
        assert_eq!(alice.keys, Some(vec!["secretA".to_string(), "secretB".to_string()]));

        let bob = NodeCredentials::load(&resources, "Bob", &peer());
        assert!(!bob.host_allowed);
        assert_eq!(bob.keys, None);
    }

    #[tokio::test]
    async fn test_blocking_lookup_matches_inline_run() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("aliases.cfg"), "Motor Bob\n").unwrap();
        fs::write(dir.path().join("command_deny.cfg"), "(broken\n").unwrap();
        let resources: Arc<dyn ResourceLoader> = Arc::new(LibraryResources::new(dir.path(), dir.path()));

        let aliases = Lookup::Aliases
            .run_blocking(resources.clone())
            .await
            .into_aliases()
            .unwrap()
            .unwrap();
        assert_eq!(aliases.resolve_alias("Motor"), "Bob");

        let lists = Lookup::CommandLists.run_blocking(resources.clone()).await;
        assert!(matches!(lists, Prefetched::CommandLists(Err(_))));

        let credentials = Lookup::Credentials {
            node: "Carol".to_string(),
            peer: peer(),
        }
        .run_blocking(resources)
        .await;
        assert!(credentials.into_aliases().is_none(), "variant accessors do not cross");
    }
}
