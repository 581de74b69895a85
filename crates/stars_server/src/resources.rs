//! Flat-file configuration resources.
//!
//! The relay reads everything it needs for authorization from small text
//! files in a library directory: host allow-lists, key files, the alias table
//! and the permission lists. The [`ResourceLoader`] trait is the only way the
//! core touches them, so tests and embedders can point it anywhere.

use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::ServerError;

/// Global host allow-list.
pub const HOST_ALLOW: &str = "allow.cfg";
/// Alias table, one `<alias> <real>` pair per line.
pub const ALIASES: &str = "aliases.cfg";
pub const COMMAND_DENY: &str = "command_deny.cfg";
pub const COMMAND_ALLOW: &str = "command_allow.cfg";
pub const RECONNECT_DENY: &str = "reconnectable_deny.cfg";
pub const RECONNECT_ALLOW: &str = "reconnectable_allow.cfg";

/// Name of the per-node host allow-list.
pub fn node_allow_resource(node: &str) -> String {
    format!("{node}.allow")
}

/// Name of the per-node key file.
pub fn node_key_resource(node: &str) -> String {
    format!("{node}.key")
}

/// Read-only access to named configuration resources.
///
/// Every method returns `Ok(None)` when the resource does not exist, so
/// callers can tell "not configured" apart from "configured but empty".
pub trait ResourceLoader: Send + Sync + Debug {
    /// Loads a list resource, skipping blank lines and `#` comments.
    fn load_list(&self, name: &str) -> Result<Option<Vec<String>>, ServerError>;

    /// Loads a key file. Every line is kept in order so indices stay positional.
    fn load_keys(&self, name: &str) -> Result<Option<Vec<String>>, ServerError>;

    /// Loads a two-column mapping resource.
    fn load_mapping(&self, name: &str) -> Result<Option<Vec<(String, String)>>, ServerError>;
}

/// Resources stored as files under a library directory, with key files
/// optionally kept in a separate directory.
#[derive(Debug, Clone)]
pub struct LibraryResources {
    library_dir: PathBuf,
    key_dir: PathBuf,
}

impl LibraryResources {
    pub fn new(library_dir: impl Into<PathBuf>, key_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
            key_dir: key_dir.into(),
        }
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    fn read(dir: &Path, name: &str) -> Result<Option<String>, ServerError> {
        let path = dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                trace!("📄 Read resource {}", path.display());
                Ok(Some(content))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ServerError::resource(name, e)),
        }
    }
}

impl ResourceLoader for LibraryResources {
    fn load_list(&self, name: &str) -> Result<Option<Vec<String>>, ServerError> {
        Ok(Self::read(&self.library_dir, name)?.map(|content| parse_list(&content)))
    }

    fn load_keys(&self, name: &str) -> Result<Option<Vec<String>>, ServerError> {
        Ok(Self::read(&self.key_dir, name)?.map(|content| parse_keys(&content)))
    }

    fn load_mapping(&self, name: &str) -> Result<Option<Vec<(String, String)>>, ServerError> {
        match Self::read(&self.library_dir, name)? {
            Some(content) => parse_mapping(&content)
                .map(Some)
                .map_err(|reason| ServerError::resource(name, reason)),
            None => Ok(None),
        }
    }
}

fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn parse_keys(content: &str) -> Vec<String> {
    content.lines().map(|line| line.trim().to_string()).collect()
}

fn parse_mapping(content: &str) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some(left), Some(right)) => pairs.push((left.to_string(), right.to_string())),
            _ => return Err(format!("line {} needs two fields: {line:?}", number + 1)),
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn library() -> (tempfile::TempDir, LibraryResources) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let resources = LibraryResources::new(dir.path(), dir.path());
        (dir, resources)
    }

    #[test]
    fn test_list_skips_comments_and_blank_lines() {
        let (dir, resources) = library();
        fs::write(dir.path().join(HOST_ALLOW), "# hosts\n\n127.0.0.1\n  *.kek.jp  \n#10.0.0.1\n").unwrap();

        let list = resources.load_list(HOST_ALLOW).unwrap().unwrap();
        assert_eq!(list, vec!["127.0.0.1".to_string(), "*.kek.jp".to_string()]);
    }

    #[test]
    fn test_missing_resource_is_none() {
        let (_dir, resources) = library();
        assert!(resources.load_list(COMMAND_DENY).unwrap().is_none());
        assert!(resources.load_keys("Alice.key").unwrap().is_none());
        assert!(resources.load_mapping(ALIASES).unwrap().is_none());
    }

    #[test]
    fn test_keys_keep_positions() {
        let (dir, resources) = library();
        fs::write(dir.path().join("Alice.key"), "secretA\n\n#notacomment\nsecretD\n").unwrap();

        let keys = resources.load_keys(&node_key_resource("Alice")).unwrap().unwrap();
        assert_eq!(keys, vec!["secretA", "", "#notacomment", "secretD"]);
    }

    #[test]
    fn test_keys_come_from_key_dir() {
        let lib = tempfile::tempdir().unwrap();
        let keys = tempfile::tempdir().unwrap();
        fs::write(keys.path().join("Bob.key"), "k0\nk1\n").unwrap();
        let resources = LibraryResources::new(lib.path(), keys.path());

        assert_eq!(resources.load_keys("Bob.key").unwrap().unwrap().len(), 2);
        assert!(resources.load_list("Bob.key").unwrap().is_none());
    }

    #[test]
    fn test_mapping_parsing() {
        let (dir, resources) = library();
        fs::write(dir.path().join(ALIASES), "# alias real\nGate   term1\nMotor term2\n").unwrap();

        let pairs = resources.load_mapping(ALIASES).unwrap().unwrap();
        assert_eq!(
            pairs,
            vec![
                ("Gate".to_string(), "term1".to_string()),
                ("Motor".to_string(), "term2".to_string()),
            ]
        );
    }

    #[test]
    fn test_mapping_rejects_single_field_line() {
        let (dir, resources) = library();
        fs::write(dir.path().join(ALIASES), "Gate term1\nlonely\n").unwrap();

        let err = resources.load_mapping(ALIASES).unwrap_err();
        assert!(matches!(err, ServerError::ResourceLoad { .. }));
        assert!(err.to_string().contains("line 2"));
    }
}
