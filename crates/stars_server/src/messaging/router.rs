//! The session router.
//!
//! [`Router`] is the single owner of every piece of session state: the
//! connection table, the node directory, aliases, flag subscriptions and the
//! permission filter. It is synchronous and socket-free; each entry point
//! takes an [`Outbox`] and records the sends and closes the I/O layer has to
//! perform. The event-loop adapter owns a `Router` outright, the worker
//! adapter keeps it behind one mutex.
//!
//! Lines that need library files (handshakes and the reload verbs) can be
//! split in two: [`Router::lookup_for`] names the reads, the adapter runs
//! them off its own task, and [`Router::handle_prefetched`] finishes the
//! line. [`Router::accept`] and [`Router::handle_line`] read inline.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::auth::{generate_nonce, verify_credential, HandshakeError, HandshakeRequest};
use crate::connection::{CloseMode, ConnectionId, ConnectionManager, ConnectionState, PeerHost};
use crate::directory::{AliasTable, Directory, SubscriptionRegistry};
use crate::error::ServerError;
use crate::messaging::commands::SystemCommand;
use crate::messaging::outbox::Outbox;
use crate::messaging::prefetch::{Lookup, NodeCredentials, Prefetched};
use crate::messaging::types::{
    base_name, is_exit_line, RoutedLine, DEBUGGER_NODE, EVENT_MARKER, REPLY_MARKER, SYSTEM_NODE,
};
use crate::resources::{self, ResourceLoader};
use crate::security::{peer_admitted, PermissionFilter};

/// Router state aggregate.
#[derive(Debug)]
pub struct Router {
    pub(super) resources: Arc<dyn ResourceLoader>,
    pub(super) connections: ConnectionManager,
    pub(super) directory: Directory,
    pub(super) aliases: AliasTable,
    pub(super) subscriptions: SubscriptionRegistry,
    pub(super) filter: PermissionFilter,
}

impl Router {
    /// Creates a router with nothing loaded. Call [`Router::startup`] before
    /// accepting connections.
    pub fn new(resources: Arc<dyn ResourceLoader>) -> Self {
        Self {
            resources,
            connections: ConnectionManager::new(),
            directory: Directory::new(),
            aliases: AliasTable::new(),
            subscriptions: SubscriptionRegistry::new(),
            filter: PermissionFilter::new(),
        }
    }

    /// Loads the command lists, the alias table and the reconnect lists.
    ///
    /// Missing resources leave the corresponding state empty; an unreadable
    /// resource or an invalid pattern is an error.
    pub fn startup(&mut self) -> Result<(), ServerError> {
        self.filter = PermissionFilter::load(self.resources.as_ref())?;
        self.aliases = load_aliases(self.resources.as_ref())?;
        info!("📚 Loaded {} alias pair(s)", self.aliases.len());
        Ok(())
    }

    /// Admits a freshly accepted connection, reading `allow.cfg` inline.
    ///
    /// See [`Router::accept_screened`].
    pub fn accept(&mut self, remote_addr: SocketAddr, peer: PeerHost, out: &mut Outbox) -> ConnectionId {
        let admitted = peer_admitted(self.resources.as_ref(), &peer);
        self.accept_screened(remote_addr, peer, admitted, out)
    }

    /// Admits a connection whose peer was already checked against the
    /// global host list.
    ///
    /// A rejected peer is told so and closed once the reply is flushed.
    /// Otherwise a nonce is issued and the connection waits for its
    /// handshake line.
    ///
    /// # Arguments
    ///
    /// * `remote_addr` - Socket address of the peer
    /// * `peer` - Hostname/IP resolved for the peer
    /// * `admitted` - Verdict of [`peer_admitted`] for `peer`
    /// * `out` - Receives the nonce or rejection line
    ///
    /// # Returns
    ///
    /// The identifier the adapter must use for every later call about this
    /// connection.
    pub fn accept_screened(
        &mut self,
        remote_addr: SocketAddr,
        peer: PeerHost,
        admitted: bool,
        out: &mut Outbox,
    ) -> ConnectionId {
        let connection = self.connections.add_connection(remote_addr, peer.clone());

        if !admitted {
            let rejection = HandshakeError::HostNotAllowed(peer.hostname.clone());
            warn!("🚫 Connection {} refused: {}", connection, rejection);
            self.enqueue(out, connection, rejection.reply());
            self.connections.set_state(connection, ConnectionState::Closing);
            out.close(connection, CloseMode::Graceful);
            return connection;
        }

        let nonce = generate_nonce();
        self.directory.set_nonce(connection, nonce);
        self.connections
            .set_state(connection, ConnectionState::Unauthenticated);
        self.enqueue(out, connection, nonce.to_string());
        connection
    }

    /// Names the resource reads `line` from `connection` needs, if any.
    ///
    /// The answer depends on router state, so it must be asked right before
    /// the line would otherwise be handled.
    pub fn lookup_for(&self, connection: ConnectionId, line: &str) -> Option<Lookup> {
        if is_exit_line(line) {
            return None;
        }
        match self.connections.state(connection)? {
            ConnectionState::Unauthenticated => {
                let request = HandshakeRequest::parse(line).ok()?;
                let peer = self.connections.peer(connection)?.clone();
                Some(Lookup::Credentials {
                    node: request.node,
                    peer,
                })
            }
            ConnectionState::Registered => {
                let parsed = RoutedLine::parse(line);
                if base_name(self.aliases.resolve_alias(parsed.destination?)) != SYSTEM_NODE {
                    return None;
                }
                match SystemCommand::parse(parsed.payload) {
                    SystemCommand::LoadAliases => Some(Lookup::Aliases),
                    SystemCommand::LoadPermission => Some(Lookup::CommandLists),
                    SystemCommand::LoadReconnectablePermission => Some(Lookup::ReconnectLists),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Handles one complete inbound line, reading whatever resources it
    /// needs inline.
    pub fn handle_line(&mut self, connection: ConnectionId, line: &str, out: &mut Outbox) {
        self.handle_prefetched(connection, line, None, out);
    }

    /// Handles one complete inbound line with the outcome of
    /// [`Router::lookup_for`] for it. A missing or mismatched `prefetched`
    /// falls back to reading inline.
    pub fn handle_prefetched(
        &mut self,
        connection: ConnectionId,
        line: &str,
        prefetched: Option<Prefetched>,
        out: &mut Outbox,
    ) {
        let state = match self.connections.state(connection) {
            Some(state @ (ConnectionState::Unauthenticated | ConnectionState::Registered)) => state,
            _ => {
                trace!("Ignoring line from inactive connection {}", connection);
                return;
            }
        };

        if is_exit_line(line) {
            debug!("👋 Connection {} sent {:?}", connection, line);
            self.connections.set_state(connection, ConnectionState::Closing);
            self.disconnect(connection, out);
            out.close(connection, CloseMode::Graceful);
            return;
        }

        if state == ConnectionState::Registered {
            self.route(connection, line, prefetched, out);
        } else {
            self.handshake(connection, line, prefetched, out);
        }
    }

    /// Purges everything known about `connection`.
    ///
    /// A registered node is removed from the directory, its own subscription
    /// keys are dropped and its subscribers receive `_Disconnected`. Calling
    /// this again for the same connection does nothing.
    ///
    /// Returns the node name the connection was registered under.
    pub fn disconnect(&mut self, connection: ConnectionId, out: &mut Outbox) -> Option<String> {
        self.connections.remove_connection(connection);
        let node = self.directory.unregister(connection)?;

        let purged = self.subscriptions.purge_node(&node);
        info!("🔌 Node {} disconnected ({} subscription key(s) purged)", node, purged);
        self.notify_subscribers(&node, "_Disconnected", out);
        Some(node)
    }

    /// Number of live connections, registered or not.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.directory.len()
    }

    /// Registered node names, sorted.
    pub fn node_names(&self) -> Vec<String> {
        self.directory
            .node_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn is_registered(&self, node: &str) -> bool {
        self.directory.is_registered(node)
    }

    /// Shared handle on the resource loader, for adapters running lookups.
    pub fn resources(&self) -> Arc<dyn ResourceLoader> {
        self.resources.clone()
    }

    fn handshake(
        &mut self,
        connection: ConnectionId,
        line: &str,
        prefetched: Option<Prefetched>,
        out: &mut Outbox,
    ) {
        let (node, replaces) = match self.authenticate(connection, line, prefetched) {
            Ok(admitted) => admitted,
            Err(rejection) => {
                warn!("🚫 Handshake on connection {} rejected: {}", connection, rejection);
                self.enqueue(out, connection, rejection.reply());
                if rejection.closes_connection() {
                    self.connections.set_state(connection, ConnectionState::Closing);
                    self.directory.unregister(connection);
                    out.close(connection, CloseMode::Graceful);
                }
                return;
            }
        };

        if let Some(previous) = replaces {
            info!(
                "🔁 Node {} reconnected on {}, dropping connection {}",
                node, connection, previous
            );
            self.disconnect(previous, out);
            out.close(previous, CloseMode::Abort);
        }

        self.directory.register(&node, connection);
        self.connections.set_state(connection, ConnectionState::Registered);
        info!("✅ Node {} registered on connection {}", node, connection);
        self.enqueue(out, connection, format!("{SYSTEM_NODE}>{node} Ok:"));
        self.notify_subscribers(&node, "_Connected", out);
    }

    /// Runs the admission checks in order: duplicate name (unless reconnect
    /// is permitted), node-specific host list, key file.
    fn authenticate(
        &self,
        connection: ConnectionId,
        line: &str,
        prefetched: Option<Prefetched>,
    ) -> Result<(String, Option<ConnectionId>), HandshakeError> {
        let request = HandshakeRequest::parse(line)?;
        let node = request.node;
        let peer = self
            .connections
            .peer(connection)
            .ok_or_else(|| HandshakeError::BadKey(node.clone()))?;

        let replaces = match self.directory.lookup(&node) {
            Some(existing) if self.filter.reconnect_allowed(&node, &peer.hostname) => Some(existing),
            Some(_) => return Err(HandshakeError::AlreadyExists(node)),
            None => None,
        };

        let credentials = prefetched
            .and_then(Prefetched::into_credentials)
            .unwrap_or_else(|| NodeCredentials::load(self.resources.as_ref(), &node, peer));
        if !credentials.host_allowed {
            return Err(HandshakeError::BadHost(node));
        }
        let Some(keys) = credentials.keys else {
            return Err(HandshakeError::BadKey(node));
        };
        let nonce = self
            .directory
            .nonce(connection)
            .ok_or_else(|| HandshakeError::BadKey(node.clone()))?;
        if !verify_credential(&keys, nonce, &request.credential) {
            return Err(HandshakeError::BadKey(node));
        }

        Ok((node, replaces))
    }

    fn route(
        &mut self,
        connection: ConnectionId,
        line: &str,
        prefetched: Option<Prefetched>,
        out: &mut Outbox,
    ) {
        let Some(own) = self.directory.node_of(connection).map(str::to_string) else {
            return;
        };
        let parsed = RoutedLine::parse(line);
        let sender = parsed.sender.unwrap_or(&own);

        let Some(destination) = parsed.destination else {
            debug!("Line from {} has no destination: {:?}", own, line);
            self.enqueue(out, connection, format!("{SYSTEM_NODE}>{sender}> @"));
            return;
        };
        let destination = self.aliases.resolve_alias(destination).to_string();
        let payload = parsed.payload;

        if !payload.is_empty()
            && !payload.starts_with(REPLY_MARKER)
            && !self.filter.command_allowed(&own, &destination, payload)
        {
            debug!("🚫 {}>{} {:?} denied", own, destination, payload);
            if !payload.starts_with(EVENT_MARKER) {
                self.enqueue(
                    out,
                    connection,
                    format!("{SYSTEM_NODE}>{sender} @{payload} Er: Command denied."),
                );
            }
            return;
        }

        let base = base_name(&destination);
        if base == SYSTEM_NODE {
            let sender = sender.to_string();
            self.execute_command(connection, &sender, payload, prefetched, out);
            return;
        }

        let Some(target) = self.directory.lookup(base) else {
            if !payload.starts_with([EVENT_MARKER, REPLY_MARKER]) {
                self.enqueue(
                    out,
                    connection,
                    format!("{SYSTEM_NODE}>{sender} @{payload} Er: {base} is down."),
                );
            }
            return;
        };

        let sender = self.aliases.resolve_real(sender);
        trace!("{}>{} {}", sender, destination, payload);
        self.enqueue(out, target, format!("{sender}>{destination} {payload}"));
    }

    /// Sends `<name>><key> <event>` to every subscriber whose pattern is found
    /// in the public name of `node`.
    pub(super) fn notify_subscribers(&self, node: &str, event: &str, out: &mut Outbox) {
        let name = self.aliases.resolve_real(node);
        for key in self.subscriptions.subscribers_of(name) {
            match self.directory.lookup(base_name(&key)) {
                Some(target) => self.enqueue(out, target, format!("{name}>{key} {event}")),
                None => trace!("Subscriber {} is not connected", key),
            }
        }
    }

    /// Queues `line` for `to`, mirroring it to the debugger tap.
    pub(super) fn enqueue(&self, out: &mut Outbox, to: ConnectionId, line: impl Into<String>) {
        let mut data = line.into();
        data.push('\n');
        if let Some(debugger) = self.directory.lookup(DEBUGGER_NODE).filter(|&d| d != to) {
            out.send(debugger, data.clone());
        }
        out.send(to, data);
    }
}

pub(super) fn load_aliases(resources: &dyn ResourceLoader) -> Result<AliasTable, ServerError> {
    Ok(resources
        .load_mapping(resources::ALIASES)?
        .map(AliasTable::from_pairs)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::outbox::Effect;
    use crate::resources::LibraryResources;
    use std::fs;
    use std::path::Path;

    struct Fixture {
        dir: tempfile::TempDir,
        router: Router,
    }

    fn fixture(setup: impl FnOnce(&Path)) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("allow.cfg"), "127.0.0.*\n").unwrap();
        fs::write(dir.path().join("Alice.key"), "secretA\nsecretB\nsecretC\n").unwrap();
        fs::write(dir.path().join("Bob.key"), "bob\n").unwrap();
        fs::write(dir.path().join("Debugger.key"), "dbg\n").unwrap();
        setup(dir.path());
        let resources = Arc::new(LibraryResources::new(dir.path(), dir.path()));
        let mut router = Router::new(resources);
        router.startup().unwrap();
        Fixture { dir, router }
    }

    fn local() -> (SocketAddr, PeerHost) {
        let addr: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        (addr, PeerHost::from_ip(&addr))
    }

    fn sent_to(out: &mut Outbox, connection: ConnectionId) -> Vec<String> {
        out.effects()
            .iter()
            .filter_map(|effect| match effect {
                Effect::Send { to, data } if *to == connection => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    fn closes(out: &Outbox) -> Vec<(ConnectionId, CloseMode)> {
        out.effects()
            .iter()
            .filter_map(|effect| match effect {
                Effect::Close { connection, mode } => Some((*connection, *mode)),
                _ => None,
            })
            .collect()
    }

    /// Accepts a connection and completes the handshake for `node`, picking
    /// the key the issued nonce asks for.
    fn login(router: &mut Router, node: &str, keys: &[&str]) -> ConnectionId {
        let (addr, peer) = local();
        let mut out = Outbox::new();
        let connection = router.accept(addr, peer, &mut out);
        let nonce: usize = sent_to(&mut out, connection)[0].trim_end().parse().unwrap();
        let mut out = Outbox::new();
        router.handle_line(connection, &format!("{node} {}", keys[nonce % keys.len()]), &mut out);
        assert!(router.is_registered(node), "{node} should be registered");
        connection
    }

    const ALICE: &[&str] = &["secretA", "secretB", "secretC"];
    const BOB: &[&str] = &["bob"];

    #[test]
    fn test_handshake_uses_nonce_mod_key_count() {
        let mut f = fixture(|_| {});
        let (addr, peer) = local();
        let mut out = Outbox::new();
        let connection = f.router.accept(addr, peer, &mut out);

        let nonce: u32 = sent_to(&mut out, connection)[0].trim_end().parse().unwrap();
        assert!(nonce < 10_000);
        let key = ["secretA", "secretB", "secretC"][nonce as usize % 3];

        let mut out = Outbox::new();
        f.router.handle_line(connection, &format!("Alice {key}"), &mut out);
        assert_eq!(sent_to(&mut out, connection), vec!["System>Alice Ok:\n"]);
        assert_eq!(f.router.node_names(), vec!["Alice"]);
    }

    #[test]
    fn test_bad_host_is_refused() {
        let mut f = fixture(|_| {});
        let addr: SocketAddr = "10.9.9.9:4000".parse().unwrap();
        let mut out = Outbox::new();
        let connection = f.router.accept(addr, PeerHost::from_ip(&addr), &mut out);

        assert_eq!(sent_to(&mut out, connection), vec!["Bad host. 10.9.9.9\n"]);
        assert_eq!(closes(&out), vec![(connection, CloseMode::Graceful)]);

        let mut out = Outbox::new();
        f.router.handle_line(connection, "Bob bob", &mut out);
        assert!(out.is_empty(), "closing connections are ignored");
    }

    #[test]
    fn test_bad_key_closes() {
        let mut f = fixture(|_| {});
        let (addr, peer) = local();
        let mut out = Outbox::new();
        let connection = f.router.accept(addr, peer, &mut out);

        let mut out = Outbox::new();
        f.router.handle_line(connection, "Bob wrong", &mut out);
        assert_eq!(sent_to(&mut out, connection), vec!["System> Er: Bad node name or key\n"]);
        assert_eq!(closes(&out), vec![(connection, CloseMode::Graceful)]);
        assert!(!f.router.is_registered("Bob"));

        let mut out = Outbox::new();
        let connection = f.router.accept(addr, PeerHost::from_ip(&addr), &mut out);
        f.router.handle_line(connection, "Carol anything", &mut out);
        assert_eq!(closes(&out), vec![(connection, CloseMode::Graceful)], "no key file");
    }

    #[test]
    fn test_duplicate_name_keeps_both_connections_open() {
        let mut f = fixture(|_| {});
        let first = login(&mut f.router, "Bob", BOB);

        let (addr, peer) = local();
        let mut out = Outbox::new();
        let second = f.router.accept(addr, peer, &mut out);
        let mut out = Outbox::new();
        f.router.handle_line(second, "Bob bob", &mut out);

        assert_eq!(sent_to(&mut out, second), vec!["System> Er: Bob already exists.\n"]);
        assert!(closes(&out).is_empty());
        assert_eq!(f.router.directory.lookup("Bob"), Some(first));

        // The first session still routes.
        let mut out = Outbox::new();
        f.router.handle_line(first, "Bob ping", &mut out);
        assert_eq!(sent_to(&mut out, first), vec!["Bob>Bob ping\n"]);
    }

    #[test]
    fn test_reconnect_replaces_previous_session() {
        let mut f = fixture(|dir| {
            fs::write(dir.join("reconnectable_allow.cfg"), "Bob\n").unwrap();
        });
        let first = login(&mut f.router, "Bob", BOB);
        let second = login(&mut f.router, "Bob", BOB);

        assert_ne!(first, second);
        assert_eq!(f.router.directory.lookup("Bob"), Some(second));
        assert_eq!(f.router.connection_count(), 1);
    }

    #[test]
    fn test_node_specific_host_list() {
        let mut f = fixture(|dir| {
            fs::write(dir.join("Bob.allow"), "192.168.*\n").unwrap();
        });
        let (addr, peer) = local();
        let mut out = Outbox::new();
        let connection = f.router.accept(addr, peer, &mut out);
        let mut out = Outbox::new();
        f.router.handle_line(connection, "Bob bob", &mut out);
        assert_eq!(sent_to(&mut out, connection), vec!["System> Er: Bad host for Bob\n"]);
        assert_eq!(closes(&out), vec![(connection, CloseMode::Graceful)]);
    }

    #[test]
    fn test_message_delivery_and_errors() {
        let mut f = fixture(|_| {});
        let alice = login(&mut f.router, "Alice", ALICE);
        let mut out = Outbox::new();
        f.router.handle_line(alice, "Bob hello", &mut out);
        assert_eq!(sent_to(&mut out, alice), vec!["System>Alice @hello Er: Bob is down.\n"]);

        let mut out = Outbox::new();
        f.router.handle_line(alice, "Bob _event", &mut out);
        assert!(out.is_empty(), "events to absent nodes are dropped silently");

        let bob = login(&mut f.router, "Bob", BOB);
        let mut out = Outbox::new();
        f.router.handle_line(alice, "Bob.motor move 10", &mut out);
        assert_eq!(sent_to(&mut out, bob), vec!["Alice>Bob.motor move 10\n"]);

        let mut out = Outbox::new();
        f.router.handle_line(alice, "Alice.sub>Bob hi", &mut out);
        assert_eq!(sent_to(&mut out, bob), vec!["Alice.sub>Bob hi\n"]);

        let mut out = Outbox::new();
        f.router.handle_line(alice, "Alice> hi", &mut out);
        assert_eq!(sent_to(&mut out, alice), vec!["System>Alice> @\n"]);
    }

    #[test]
    fn test_aliases_rewrite_both_ends() {
        let mut f = fixture(|dir| {
            fs::write(dir.join("aliases.cfg"), "Motor Bob\nUser Alice\n").unwrap();
        });
        let alice = login(&mut f.router, "Alice", ALICE);
        let bob = login(&mut f.router, "Bob", BOB);

        let mut out = Outbox::new();
        f.router.handle_line(alice, "Motor go", &mut out);
        assert_eq!(sent_to(&mut out, bob), vec!["User>Bob go\n"]);
    }

    #[test]
    fn test_command_filter() {
        let mut f = fixture(|dir| {
            fs::write(dir.join("command_deny.cfg"), "Alice>Bob stop \n").unwrap();
        });
        let alice = login(&mut f.router, "Alice", ALICE);
        let bob = login(&mut f.router, "Bob", BOB);

        let mut out = Outbox::new();
        f.router.handle_line(alice, "Bob stop now", &mut out);
        assert_eq!(sent_to(&mut out, alice), vec!["System>Alice @stop now Er: Command denied.\n"]);
        assert!(sent_to(&mut out, bob).is_empty());

        // A spoofed prefix does not dodge the filter.
        let mut out = Outbox::new();
        f.router.handle_line(alice, "Carol>Bob stop", &mut out);
        assert!(sent_to(&mut out, bob).is_empty());

        let mut out = Outbox::new();
        f.router.handle_line(alice, "Bob @stop done", &mut out);
        assert_eq!(sent_to(&mut out, bob), vec!["Alice>Bob @stop done\n"]);
    }

    #[test]
    fn test_debugger_tap_mirrors_traffic() {
        let mut f = fixture(|_| {});
        let debugger = login(&mut f.router, "Debugger", &["dbg"]);
        let alice = login(&mut f.router, "Alice", ALICE);
        let bob = login(&mut f.router, "Bob", BOB);

        let mut out = Outbox::new();
        f.router.handle_line(alice, "Bob hello", &mut out);
        assert_eq!(sent_to(&mut out, bob), vec!["Alice>Bob hello\n"]);
        assert_eq!(sent_to(&mut out, debugger), vec!["Alice>Bob hello\n"]);

        let mut out = Outbox::new();
        f.router.handle_line(alice, "Debugger hi", &mut out);
        assert_eq!(sent_to(&mut out, debugger), vec!["Alice>Debugger hi\n"], "no duplicate");
    }

    #[test]
    fn test_exit_purges_and_allows_relogin() {
        let mut f = fixture(|_| {});
        let bob = login(&mut f.router, "Bob", BOB);
        let mut out = Outbox::new();
        f.router.handle_line(bob, "exit", &mut out);

        assert_eq!(closes(&out), vec![(bob, CloseMode::Graceful)]);
        assert!(!f.router.is_registered("Bob"));
        assert_eq!(f.router.connection_count(), 0);

        // Purging again is harmless.
        let mut out = Outbox::new();
        assert_eq!(f.router.disconnect(bob, &mut out), None);
        assert!(out.is_empty());

        login(&mut f.router, "Bob", BOB);
    }

    #[test]
    fn test_connect_and_disconnect_notifications() {
        let mut f = fixture(|_| {});
        let alice = login(&mut f.router, "Alice", ALICE);
        let mut out = Outbox::new();
        f.router.handle_line(alice, "System flgon Bob", &mut out);
        assert_eq!(
            sent_to(&mut out, alice),
            vec!["System>Alice @flgon Node Bob has been registered.\n"]
        );

        let (addr, peer) = local();
        let mut out = Outbox::new();
        let bob = f.router.accept(addr, peer, &mut out);
        f.router.handle_line(bob, "Bob bob", &mut out);
        assert_eq!(sent_to(&mut out, alice), vec!["Bob>Alice _Connected\n"]);

        let mut out = Outbox::new();
        f.router.disconnect(bob, &mut out);
        assert_eq!(sent_to(&mut out, alice), vec!["Bob>Alice _Disconnected\n"]);
    }

    #[test]
    fn test_reload_verbs_apply_edited_files() {
        let mut f = fixture(|dir| {
            fs::write(dir.join("aliases.cfg"), "Motor Bob\n").unwrap();
        });
        let alice = login(&mut f.router, "Alice", ALICE);
        let bob = login(&mut f.router, "Bob", BOB);

        fs::write(f.dir.path().join("aliases.cfg"), "Arm Bob\n").unwrap();
        let mut out = Outbox::new();
        f.router.handle_line(alice, "System loadaliases", &mut out);
        assert_eq!(
            sent_to(&mut out, alice),
            vec!["System>Alice @loadaliases Aliases has been loaded.\n"]
        );

        let mut out = Outbox::new();
        f.router.handle_line(alice, "Arm up", &mut out);
        assert_eq!(sent_to(&mut out, bob), vec!["Alice>Bob up\n"]);
        let mut out = Outbox::new();
        f.router.handle_line(alice, "Motor up", &mut out);
        assert_eq!(sent_to(&mut out, alice), vec!["System>Alice @up Er: Motor is down.\n"]);

        // Without a reconnect rule a second Bob is refused and left waiting.
        let (addr, peer) = local();
        let mut out = Outbox::new();
        let second = f.router.accept(addr, peer, &mut out);
        let mut out = Outbox::new();
        f.router.handle_line(second, "Bob bob", &mut out);
        assert_eq!(sent_to(&mut out, second), vec!["System> Er: Bob already exists.\n"]);

        fs::write(f.dir.path().join("reconnectable_allow.cfg"), "Bob\n").unwrap();
        let mut out = Outbox::new();
        f.router.handle_line(alice, "System loadreconnectablepermission", &mut out);
        assert_eq!(
            sent_to(&mut out, alice),
            vec!["System>Alice @loadreconnectablepermission Reconnectable permission list has been loaded.\n"]
        );

        let mut out = Outbox::new();
        f.router.handle_line(second, "Bob bob", &mut out);
        assert_eq!(sent_to(&mut out, second), vec!["System>Bob Ok:\n"]);
        assert_eq!(closes(&out), vec![(bob, CloseMode::Abort)]);
        assert_eq!(f.router.directory.lookup("Bob"), Some(second));
    }

    #[test]
    fn test_failed_reload_keeps_previous_state() {
        let mut f = fixture(|dir| {
            fs::write(dir.join("aliases.cfg"), "Motor Bob\n").unwrap();
            fs::write(dir.join("reconnectable_allow.cfg"), "Bob\n").unwrap();
        });
        let alice = login(&mut f.router, "Alice", ALICE);
        let bob = login(&mut f.router, "Bob", BOB);

        fs::write(f.dir.path().join("aliases.cfg"), "Motor Bob\nArm\n").unwrap();
        let mut out = Outbox::new();
        f.router.handle_line(alice, "System loadaliases", &mut out);
        let replies = sent_to(&mut out, alice);
        assert_eq!(replies.len(), 1);
        assert!(
            replies[0].starts_with("System>Alice @loadaliases Er: "),
            "unexpected reply {:?}",
            replies[0]
        );

        let mut out = Outbox::new();
        f.router.handle_line(alice, "Motor hi", &mut out);
        assert_eq!(sent_to(&mut out, bob), vec!["Alice>Bob hi\n"]);

        fs::write(f.dir.path().join("reconnectable_allow.cfg"), "(Bob\n").unwrap();
        let mut out = Outbox::new();
        f.router.handle_line(alice, "System loadreconnectablepermission", &mut out);
        let replies = sent_to(&mut out, alice);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with("System>Alice @loadreconnectablepermission Er: "));

        // The earlier rule still lets Bob take over his name.
        let second = login(&mut f.router, "Bob", BOB);
        assert_eq!(f.router.directory.lookup("Bob"), Some(second));
    }

    #[test]
    fn test_lookup_for_names_needed_reads() {
        let mut f = fixture(|dir| {
            fs::write(dir.join("aliases.cfg"), "Sys System\n").unwrap();
        });
        let (addr, peer) = local();
        let mut out = Outbox::new();
        let pending = f.router.accept(addr, peer.clone(), &mut out);

        assert_eq!(
            f.router.lookup_for(pending, "Bob bob"),
            Some(Lookup::Credentials {
                node: "Bob".to_string(),
                peer,
            })
        );
        assert_eq!(f.router.lookup_for(pending, "Bob"), None, "malformed handshake");
        assert_eq!(f.router.lookup_for(pending, "exit"), None);

        let alice = login(&mut f.router, "Alice", ALICE);
        assert_eq!(f.router.lookup_for(alice, "System loadaliases"), Some(Lookup::Aliases));
        assert_eq!(f.router.lookup_for(alice, "Sys loadpermission"), Some(Lookup::CommandLists));
        assert_eq!(
            f.router.lookup_for(alice, "Alice>System.main loadreconnectablepermission"),
            Some(Lookup::ReconnectLists)
        );
        assert_eq!(f.router.lookup_for(alice, "System listnodes"), None);
        assert_eq!(f.router.lookup_for(alice, "Bob loadaliases"), None);
        assert_eq!(f.router.lookup_for(12345, "System loadaliases"), None, "unknown connection");
    }

    #[test]
    fn test_prefetched_results_replace_file_reads() {
        let mut f = fixture(|_| {});
        let (addr, peer) = local();
        let mut out = Outbox::new();
        let bob = f.router.accept_screened(addr, peer, true, &mut out);

        // Bob.key on disk holds "bob"; the prefetched keys are the ones checked.
        let credentials = NodeCredentials {
            host_allowed: true,
            keys: Some(vec!["swapped".to_string()]),
        };
        let mut out = Outbox::new();
        f.router.handle_prefetched(bob, "Bob swapped", Some(Prefetched::Credentials(credentials)), &mut out);
        assert_eq!(sent_to(&mut out, bob), vec!["System>Bob Ok:\n"]);

        let (addr, peer) = local();
        let mut out = Outbox::new();
        let other = f.router.accept_screened(addr, peer, true, &mut out);
        let denied = NodeCredentials {
            host_allowed: false,
            keys: Some(vec!["alice".to_string()]),
        };
        let mut out = Outbox::new();
        f.router.handle_prefetched(other, "Alice alice", Some(Prefetched::Credentials(denied)), &mut out);
        assert_eq!(sent_to(&mut out, other), vec!["System> Er: Bad host for Alice\n"]);

        let aliases = AliasTable::from_pairs([("Arm", "Bob")]);
        let mut out = Outbox::new();
        f.router.handle_prefetched(bob, "System loadaliases", Some(Prefetched::Aliases(Ok(aliases))), &mut out);
        assert_eq!(sent_to(&mut out, bob), vec!["System>Bob @loadaliases Aliases has been loaded.\n"]);
        assert_eq!(f.router.aliases.resolve_alias("Arm"), "Bob");
    }

    #[test]
    fn test_accept_screened_honours_verdict() {
        let mut f = fixture(|_| {});
        let (addr, peer) = local();
        let mut out = Outbox::new();
        let connection = f.router.accept_screened(addr, peer, false, &mut out);

        assert_eq!(sent_to(&mut out, connection), vec!["Bad host. 127.0.0.1\n"]);
        assert_eq!(closes(&out), vec![(connection, CloseMode::Graceful)]);
    }
}
