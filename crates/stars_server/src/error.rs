//! Error types and handling for the relay server.
//!
//! This module defines the error types that can occur during server operations,
//! providing clear categorization of different failure modes. Only the
//! start-up path and resource reloads surface these to a caller; per-line
//! failures are answered on the wire and logged.

use crate::auth::HandshakeError;

/// Enumeration of possible server errors.
///
/// Mirrors the failure taxonomy of the relay: protocol violations, rejected
/// handshakes, routing failures, unreadable configuration resources and
/// socket errors, plus the infrastructure failures of binding and runtime.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed line or missing routing header
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A handshake attempt was refused
    #[error("Authentication rejected: {0}")]
    AuthRejected(#[from] HandshakeError),

    /// Unknown destination or a denied command
    #[error("Routing error: {0}")]
    Routing(String),

    /// A configuration resource could not be read or contains an invalid pattern
    #[error("Failed to load {resource}: {reason}")]
    ResourceLoad { resource: String, reason: String },

    /// Socket error on send/recv
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network-related errors such as binding failures
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid server configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub(crate) fn resource(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::ResourceLoad {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}
