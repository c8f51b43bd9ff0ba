// secretsync-core/src/domain/secret/path.rs

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized secret path. Construction is the only way to get one, so
/// every `SecretPath` in the system already satisfies the invariants:
/// no `..` segment, no NUL byte, no empty segments, no leading or doubled
/// slash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretPath(String);

impl SecretPath {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, DomainError> {
        let raw = raw.as_ref();

        if raw.contains('\0') {
            return Err(DomainError::PathInvalid(format!(
                "path contains a NUL byte: {raw:?}"
            )));
        }

        let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();

        if segments.is_empty() {
            return Err(DomainError::PathInvalid(format!(
                "path has no segments after normalization: {raw:?}"
            )));
        }

        for segment in &segments {
            if *segment == ".." {
                return Err(DomainError::PathInvalid(format!(
                    "path contains '..': {raw:?}"
                )));
            }
        }

        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final path segment, e.g. `"api_key"` for `secret/app/api_key`.
    pub fn leaf(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Returns this path with `prefix/` (normalized) prepended.
    pub fn with_prefix(&self, prefix: &str) -> Result<Self, DomainError> {
        Self::new(format!("{prefix}/{}", self.0))
    }

    pub fn is_directory_child_of(&self, prefix: &SecretPath) -> bool {
        self.0.starts_with(prefix.0.as_str()) && self.0.len() > prefix.0.len()
    }

    /// The synthetic unscoped prefix: a `TargetSpec` carries no path
    /// scoping of its own, so `TargetStore::list` is called with this
    /// when the orchestrator wants every secret under a target.
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for SecretPath {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_leading_and_doubled_slashes() {
        assert_eq!(SecretPath::new("/a/b").unwrap().as_str(), "a/b");
        assert_eq!(SecretPath::new("a//b").unwrap().as_str(), "a/b");
        assert_eq!(SecretPath::new("//a//b//").unwrap().as_str(), "a/b");
    }

    #[test]
    fn rejects_dotdot() {
        assert!(matches!(
            SecretPath::new("a/../b"),
            Err(DomainError::PathInvalid(_))
        ));
    }

    #[test]
    fn rejects_nul_byte() {
        assert!(matches!(
            SecretPath::new("a/\0/b"),
            Err(DomainError::PathInvalid(_))
        ));
    }

    #[test]
    fn rejects_empty_path() {
        assert!(matches!(SecretPath::new(""), Err(DomainError::PathInvalid(_))));
        assert!(matches!(SecretPath::new("///"), Err(DomainError::PathInvalid(_))));
    }

    #[test]
    fn leaf_returns_final_segment() {
        let p = SecretPath::new("secret/app/api_key").unwrap();
        assert_eq!(p.leaf(), "api_key");
    }

    #[test]
    fn root_is_empty_and_recognized() {
        let root = SecretPath::root();
        assert_eq!(root.as_str(), "");
        assert!(root.is_root());
        assert!(!SecretPath::new("a").unwrap().is_root());
    }
}
