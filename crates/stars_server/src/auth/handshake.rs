//! Challenge/response handshake primitives.

use rand::Rng;

use crate::messaging::types::is_valid_node_name;

/// Nonces are drawn uniformly from `0..NONCE_RANGE`.
pub const NONCE_RANGE: u32 = 10_000;

/// Why a connection was not admitted.
///
/// [`HandshakeError::reply`] is the exact line sent to the peer (without the
/// newline); [`HandshakeError::closes_connection`] tells the caller whether
/// the connection is torn down after the reply is flushed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// Peer host is not in the global allow-list
    #[error("host {0} is not allowed")]
    HostNotAllowed(String),

    /// The first line was not `<name> <credential>`
    #[error("malformed handshake line")]
    Malformed,

    /// The name is registered and reconnecting is not permitted
    #[error("node {0} already exists")]
    AlreadyExists(String),

    /// The node-specific host list rejected the peer
    #[error("bad host for node {0}")]
    BadHost(String),

    /// Missing/empty key file or wrong credential
    #[error("bad key for node {0}")]
    BadKey(String),
}

impl HandshakeError {
    pub fn reply(&self) -> String {
        match self {
            HandshakeError::HostNotAllowed(host) => format!("Bad host. {host}"),
            HandshakeError::Malformed | HandshakeError::BadKey(_) => {
                "System> Er: Bad node name or key".to_string()
            }
            HandshakeError::AlreadyExists(node) => format!("System> Er: {node} already exists."),
            HandshakeError::BadHost(node) => format!("System> Er: Bad host for {node}"),
        }
    }

    /// An "already exists" answer leaves the connection open so the peer can
    /// retry under another name; every other rejection is terminal.
    pub fn closes_connection(&self) -> bool {
        !matches!(self, HandshakeError::AlreadyExists(_))
    }
}

/// A parsed `<name> <credential>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub node: String,
    pub credential: String,
}

impl HandshakeRequest {
    /// Parses the first line a connection sends.
    ///
    /// The line must hold exactly two fields separated by a single space and
    /// the name must be a valid node name.
    pub fn parse(line: &str) -> Result<Self, HandshakeError> {
        let mut fields = line.split(' ');
        let (Some(node), Some(credential), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(HandshakeError::Malformed);
        };
        if !is_valid_node_name(node) {
            return Err(HandshakeError::Malformed);
        }
        Ok(Self {
            node: node.to_string(),
            credential: credential.to_string(),
        })
    }
}

pub fn generate_nonce() -> u32 {
    rand::thread_rng().gen_range(0..NONCE_RANGE)
}

/// Checks `credential` against `keys[nonce mod keys.len()]`.
///
/// An empty key list never verifies.
pub fn verify_credential(keys: &[String], nonce: u32, credential: &str) -> bool {
    if keys.is_empty() {
        return false;
    }
    keys[nonce as usize % keys.len()] == credential
}
