//! Flag ("flgon") subscriptions.
//!
//! A subscriber key is a node name, optionally dotted with a qualifier
//! (`NodeA.sensor1`). Each key holds a set of patterns; a pattern is a regular
//! expression searched anywhere in an event source name, so `Node` also
//! catches events from `Node.sensor1`.

use regex::Regex;
use std::collections::HashMap;

use crate::messaging::types::base_name;

/// Registry failures. The display text is what goes on the wire after `Er:`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Node {0} is already in the list.")]
    AlreadyListed(String),

    #[error("Node {0} is not in the list.")]
    NotListed(String),

    #[error("List is void.")]
    ListVoid,

    #[error("Bad pattern {0}.")]
    InvalidPattern(String),
}

#[derive(Debug, Clone)]
struct Subscription {
    pattern: String,
    matcher: Regex,
}

/// Subscriber key -> patterns.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `pattern` under `key`. The same pattern text is never stored twice
    /// for one key.
    pub fn add(&mut self, key: &str, pattern: &str) -> Result<(), SubscriptionError> {
        if self
            .entries
            .get(key)
            .is_some_and(|subs| subs.iter().any(|s| s.pattern == pattern))
        {
            return Err(SubscriptionError::AlreadyListed(pattern.to_string()));
        }
        let matcher =
            Regex::new(pattern).map_err(|_| SubscriptionError::InvalidPattern(pattern.to_string()))?;
        self.entries.entry(key.to_string()).or_default().push(Subscription {
            pattern: pattern.to_string(),
            matcher,
        });
        Ok(())
    }

    /// Removes `pattern` from `key`. A key left without patterns disappears.
    pub fn remove(&mut self, key: &str, pattern: &str) -> Result<(), SubscriptionError> {
        let subs = self.entries.get_mut(key).ok_or(SubscriptionError::ListVoid)?;
        let position = subs
            .iter()
            .position(|s| s.pattern == pattern)
            .ok_or_else(|| SubscriptionError::NotListed(pattern.to_string()))?;
        subs.remove(position);
        if subs.is_empty() {
            self.entries.remove(key);
        }
        Ok(())
    }

    /// Subscriber keys with at least one pattern found in `source`, sorted.
    pub fn subscribers_of(&self, source: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, subs)| subs.iter().any(|s| s.matcher.is_match(source)))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Drops every key owned by `node` (the key itself or `node.<qualifier>`).
    /// Returns how many keys were removed.
    pub fn purge_node(&mut self, node: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| base_name(key) != node);
        before - self.entries.len()
    }

    /// Patterns registered under `key`, in registration order.
    pub fn patterns(&self, key: &str) -> Vec<&str> {
        self.entries
            .get(key)
            .map(|subs| subs.iter().map(|s| s.pattern.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_pattern_rejected() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.add("Alice", "Bob").is_ok());
        assert_eq!(
            registry.add("Alice", "Bob"),
            Err(SubscriptionError::AlreadyListed("Bob".to_string()))
        );
        // Another key may hold the same pattern.
        assert!(registry.add("Alice.panel", "Bob").is_ok());
        assert_eq!(registry.patterns("Alice"), vec!["Bob"]);
    }

    #[test]
    fn test_remove_errors() {
        let mut registry = SubscriptionRegistry::new();
        assert_eq!(registry.remove("Alice", "Bob"), Err(SubscriptionError::ListVoid));

        registry.add("Alice", "Bob").unwrap();
        assert_eq!(
            registry.remove("Alice", "Carol"),
            Err(SubscriptionError::NotListed("Carol".to_string()))
        );
        assert!(registry.remove("Alice", "Bob").is_ok());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_pattern_search_semantics() {
        let mut registry = SubscriptionRegistry::new();
        registry.add("Alice", "Node").unwrap();
        registry.add("Carol.view", "^Motor[0-9]$").unwrap();

        assert_eq!(registry.subscribers_of("Node.sensor1"), vec!["Alice".to_string()]);
        assert_eq!(registry.subscribers_of("Motor3"), vec!["Carol.view".to_string()]);
        assert!(registry.subscribers_of("Motor12").is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let mut registry = SubscriptionRegistry::new();
        assert_eq!(
            registry.add("Alice", "Node("),
            Err(SubscriptionError::InvalidPattern("Node(".to_string()))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_purge_node_removes_qualified_keys_only_for_that_node() {
        let mut registry = SubscriptionRegistry::new();
        registry.add("Alice", "Bob").unwrap();
        registry.add("Alice.panel", "Bob").unwrap();
        registry.add("Alicex", "Bob").unwrap();

        assert_eq!(registry.purge_node("Alice"), 2);
        assert_eq!(registry.subscribers_of("Bob"), vec!["Alicex".to_string()]);
    }

    #[test]
    fn test_error_wire_text() {
        assert_eq!(
            SubscriptionError::AlreadyListed("Bob".into()).to_string(),
            "Node Bob is already in the list."
        );
        assert_eq!(SubscriptionError::ListVoid.to_string(), "List is void.");
    }
}
