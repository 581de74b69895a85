//! Permission filtering for commands, reconnects and peer hosts.
//!
//! Command and reconnect lists are loaded at start-up and on the admin reload
//! verbs; host allow-lists are read fresh for every handshake so edits apply
//! to the next connection without a reload.

use tracing::{debug, info, warn};

use crate::connection::PeerHost;
use crate::error::ServerError;
use crate::resources::{self, ResourceLoader};

pub mod patterns;

pub use patterns::{PatternList, PatternSyntax};

/// A deny list and an allow list read together.
#[derive(Debug, Default, Clone)]
pub struct ListPair {
    pub deny: PatternList,
    pub allow: PatternList,
}

impl ListPair {
    fn load(
        resources: &dyn ResourceLoader,
        deny: &str,
        allow: &str,
        syntax: PatternSyntax,
    ) -> Result<Self, ServerError> {
        Ok(Self {
            deny: load_patterns(resources, deny, syntax)?,
            allow: load_patterns(resources, allow, syntax)?,
        })
    }
}

/// Central permission state for the relay.
///
/// An empty list means "not configured". Deny lists are always evaluated
/// before allow lists and short-circuit on the first match.
#[derive(Debug, Default, Clone)]
pub struct PermissionFilter {
    command_deny: PatternList,
    command_allow: PatternList,
    reconnect_deny: PatternList,
    reconnect_allow: PatternList,
}

impl PermissionFilter {
    /// Creates a filter with no lists configured: every command passes and
    /// no reconnect is permitted.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command_lists(mut self, deny: PatternList, allow: PatternList) -> Self {
        self.command_deny = deny;
        self.command_allow = allow;
        self
    }

    pub fn with_reconnect_lists(mut self, deny: PatternList, allow: PatternList) -> Self {
        self.reconnect_deny = deny;
        self.reconnect_allow = allow;
        self
    }

    /// Loads all four lists from `resources`.
    pub fn load(resources: &dyn ResourceLoader) -> Result<Self, ServerError> {
        let mut filter = Self::new();
        filter.reload_commands(resources)?;
        filter.reload_reconnect(resources)?;
        Ok(filter)
    }

    /// Reads and compiles `command_deny.cfg` and `command_allow.cfg`.
    pub fn load_command_lists(resources: &dyn ResourceLoader) -> Result<ListPair, ServerError> {
        ListPair::load(
            resources,
            resources::COMMAND_DENY,
            resources::COMMAND_ALLOW,
            PatternSyntax::Search,
        )
    }

    /// Reads and compiles the reconnect lists.
    pub fn load_reconnect_lists(resources: &dyn ResourceLoader) -> Result<ListPair, ServerError> {
        ListPair::load(
            resources,
            resources::RECONNECT_DENY,
            resources::RECONNECT_ALLOW,
            PatternSyntax::Full,
        )
    }

    pub fn set_command_lists(&mut self, lists: ListPair) {
        info!(
            "🛡️ Command permissions loaded: {} deny, {} allow",
            lists.deny.len(),
            lists.allow.len()
        );
        self.command_deny = lists.deny;
        self.command_allow = lists.allow;
    }

    pub fn set_reconnect_lists(&mut self, lists: ListPair) {
        info!(
            "🛡️ Reconnect permissions loaded: {} deny, {} allow",
            lists.deny.len(),
            lists.allow.len()
        );
        self.reconnect_deny = lists.deny;
        self.reconnect_allow = lists.allow;
    }

    /// Replaces the command lists. On failure the current lists stay in place.
    pub fn reload_commands(&mut self, resources: &dyn ResourceLoader) -> Result<(), ServerError> {
        self.set_command_lists(Self::load_command_lists(resources)?);
        Ok(())
    }

    /// Replaces the reconnect lists. On failure the current lists stay in place.
    pub fn reload_reconnect(&mut self, resources: &dyn ResourceLoader) -> Result<(), ServerError> {
        self.set_reconnect_lists(Self::load_reconnect_lists(resources)?);
        Ok(())
    }

    /// Whether any command list is configured.
    pub fn filters_commands(&self) -> bool {
        !self.command_deny.is_empty() || !self.command_allow.is_empty()
    }

    /// Checks `command_line` sent from `from` to `to`.
    ///
    /// The candidate is `"{from}>{to} {verb} "` where the verb is the first
    /// whitespace-delimited token of the command line.
    pub fn command_allowed(&self, from: &str, to: &str, command_line: &str) -> bool {
        if !self.filters_commands() {
            return true;
        }
        let Some(verb) = command_line.split_whitespace().next() else {
            return false;
        };
        let candidate = format!("{from}>{to} {verb} ");
        if let Some(rule) = self.command_deny.first_match(&candidate) {
            debug!("🚫 Command {:?} denied by {:?}", candidate, rule);
            return false;
        }
        if !self.command_allow.is_empty() && !self.command_allow.matches(&candidate) {
            debug!("🚫 Command {:?} not in allow list", candidate);
            return false;
        }
        true
    }

    /// Checks whether `node` connecting from `host` may replace its live session.
    pub fn reconnect_allowed(&self, node: &str, host: &str) -> bool {
        if self.reconnect_deny.is_empty() && self.reconnect_allow.is_empty() {
            return false;
        }
        let with_host = format!("{node} {host}");
        let hit = |list: &PatternList| list.matches(&with_host) || list.matches(node);
        if !self.reconnect_deny.is_empty() && hit(&self.reconnect_deny) {
            return false;
        }
        if !self.reconnect_allow.is_empty() && !hit(&self.reconnect_allow) {
            return false;
        }
        true
    }
}

/// Checks a peer against a host allow-list resource.
///
/// The hostname and (when different) the IP are tried against every glob.
/// `unmatched_default` is returned when nothing matches, and also when the
/// resource is absent or unreadable.
pub fn host_allowed(
    resources: &dyn ResourceLoader,
    resource: &str,
    hostname: &str,
    ip: &str,
    unmatched_default: bool,
) -> bool {
    match resources.load_list(resource) {
        Ok(Some(lines)) => host_list_matches(resource, &lines, hostname, ip) || unmatched_default,
        Ok(None) => unmatched_default,
        Err(e) => {
            warn!("⚠️ Host list {} unreadable: {}", resource, e);
            unmatched_default
        }
    }
}

/// Checks a freshly accepted peer against the global `allow.cfg`.
///
/// Nothing is admitted when the list is missing or unreadable.
pub fn peer_admitted(resources: &dyn ResourceLoader, peer: &PeerHost) -> bool {
    host_allowed(resources, resources::HOST_ALLOW, &peer.hostname, &peer.ip, false)
}

/// Checks a peer against the node-specific `<node>.allow` list.
///
/// A node without such a list may connect from any host that passed the
/// global list; when the list exists the peer must match one of its entries.
pub fn node_host_allowed(resources: &dyn ResourceLoader, node: &str, hostname: &str, ip: &str) -> bool {
    let resource = resources::node_allow_resource(node);
    match resources.load_list(&resource) {
        Ok(Some(lines)) => host_list_matches(&resource, &lines, hostname, ip),
        Ok(None) => true,
        Err(e) => {
            warn!("⚠️ Host list {} unreadable: {}", resource, e);
            false
        }
    }
}

fn host_list_matches(resource: &str, lines: &[String], hostname: &str, ip: &str) -> bool {
    match PatternList::compile(lines, PatternSyntax::Glob) {
        Ok(list) => list.matches(hostname) || (hostname != ip && list.matches(ip)),
        Err(e) => {
            warn!("⚠️ Host list {} has an invalid pattern: {}", resource, e);
            false
        }
    }
}

fn load_patterns(
    resources: &dyn ResourceLoader,
    name: &str,
    syntax: PatternSyntax,
) -> Result<PatternList, ServerError> {
    match resources.load_list(name)? {
        Some(lines) => {
            PatternList::compile(&lines, syntax).map_err(|e| ServerError::resource(name, e))
        }
        None => Ok(PatternList::empty()),
    }
}
