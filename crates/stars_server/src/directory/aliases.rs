//! Alias <-> real node name mapping.

use std::collections::HashMap;

/// One-to-one mapping between public alias names and real node names.
///
/// Both directions are kept in their own map so either lookup is O(1).
/// Loading a pair whose alias or real name is already mapped replaces the old
/// pair entirely, keeping the two maps exact inverses.
#[derive(Debug, Default, Clone)]
pub struct AliasTable {
    alias_to_real: HashMap<String, String>,
    real_to_alias: HashMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, A, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, R)>,
        A: Into<String>,
        R: Into<String>,
    {
        let mut table = Self::new();
        for (alias, real) in pairs {
            table.insert(alias.into(), real.into());
        }
        table
    }

    pub fn insert(&mut self, alias: String, real: String) {
        if let Some(old_real) = self.alias_to_real.remove(&alias) {
            self.real_to_alias.remove(&old_real);
        }
        if let Some(old_alias) = self.real_to_alias.remove(&real) {
            self.alias_to_real.remove(&old_alias);
        }
        self.alias_to_real.insert(alias.clone(), real.clone());
        self.real_to_alias.insert(real, alias);
    }

    /// Maps an alias to its real name; any other name is returned unchanged.
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.alias_to_real.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Maps a real name to its public alias; any other name is returned unchanged.
    pub fn resolve_real<'a>(&'a self, name: &'a str) -> &'a str {
        self.real_to_alias.get(name).map(String::as_str).unwrap_or(name)
    }

    /// `(alias, real)` pairs sorted by alias.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .alias_to_real
            .iter()
            .map(|(alias, real)| (alias.as_str(), real.as_str()))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    pub fn len(&self) -> usize {
        self.alias_to_real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alias_to_real.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_in_both_directions() {
        let table = AliasTable::from_pairs([("Gate", "term1"), ("Motor", "term2")]);

        assert_eq!(table.resolve_alias("Gate"), "term1");
        assert_eq!(table.resolve_real("term2"), "Motor");
        assert_eq!(table.resolve_alias("Unknown"), "Unknown");
        assert_eq!(table.resolve_real("Unknown"), "Unknown");
    }

    #[test]
    fn test_symmetry_for_loaded_pairs() {
        let table = AliasTable::from_pairs([("Gate", "term1"), ("Motor", "term2"), ("Lamp", "term3")]);

        for (alias, real) in table.pairs() {
            assert_eq!(table.resolve_alias(table.resolve_real(real)), real);
            assert_eq!(table.resolve_real(table.resolve_alias(alias)), alias);
        }
    }

    #[test]
    fn test_remapping_keeps_maps_inverse() {
        let table = AliasTable::from_pairs([("Gate", "term1"), ("Gate", "term2"), ("Door", "term2")]);

        assert_eq!(table.len(), 1);
        assert_eq!(table.pairs(), vec![("Door", "term2")]);
        assert_eq!(table.resolve_real("term1"), "term1");
        assert_eq!(table.resolve_alias("Gate"), "Gate");
    }
}
