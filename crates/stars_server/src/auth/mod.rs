//! Node authentication.
//!
//! A connection is challenged with a random nonce as soon as its host passes
//! the global allow-list. The node answers `<name> <credential>`, where the
//! credential is line `nonce mod len` of the node's key file. Key files are
//! read on every attempt so edits apply to the next connection.

pub mod handshake;

pub use handshake::{generate_nonce, verify_credential, HandshakeError, HandshakeRequest, NONCE_RANGE};
