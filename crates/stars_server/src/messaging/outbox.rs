//! Effects produced by the router.
//!
//! The router never touches sockets. Every call records what should happen
//! to which connection, and the concurrency adapter carries the effects out
//! in order.

use crate::connection::{CloseMode, ConnectionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append `data` (newline included) to a connection's outbound queue.
    Send { to: ConnectionId, data: String },
    /// Tear a connection down. Router state for it is already purged.
    Close { connection: ConnectionId, mode: CloseMode },
}

/// Ordered list of effects collected while handling one event.
#[derive(Debug, Default)]
pub struct Outbox {
    effects: Vec<Effect>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: ConnectionId, data: String) {
        self.effects.push(Effect::Send { to, data });
    }

    pub fn close(&mut self, connection: ConnectionId, mode: CloseMode) {
        self.effects.push(Effect::Close { connection, mode });
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, Effect> {
        self.effects.drain(..)
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }
}
