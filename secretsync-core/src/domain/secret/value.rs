// secretsync-core/src/domain/secret/value.rs

use super::path::SecretPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A secret's payload: a JSON-like value, opaque to the engine beyond
/// merge and equality. `serde_json::Value` already models
/// `null | bool | number | string | list | nested mapping` exactly as
/// the spec requires, so it is used directly rather than re-invented.
pub type SecretValue = serde_json::Value;

/// A monotonically increasing version number, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    pub const FIRST: Version = Version(1);

    pub fn new(n: u64) -> Option<Self> {
        if n == 0 {
            None
        } else {
            Some(Version(n))
        }
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A secret together with its version, timestamp and the actor that wrote
/// it. Stored by `MergeStore`/`VersionStore` implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedSecret {
    pub path: SecretPath,
    pub value: SecretValue,
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_starts_at_one_and_increments() {
        assert_eq!(Version::FIRST.value(), 1);
        assert_eq!(Version::FIRST.next().value(), 2);
    }

    #[test]
    fn version_zero_is_rejected() {
        assert!(Version::new(0).is_none());
    }
}
