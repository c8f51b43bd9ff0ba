// secretsync-core/src/ports/version_store.rs

use super::merge_store::RetentionPolicy;
use crate::domain::secret::{SecretPath, SecretValue, Version};
use crate::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audit-trail entry, as recorded by a `VersionStore` layered over a
/// `MergeStore` (§4.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    #[serde(default)]
    pub parent_version: Option<Version>,
}

/// Layered over `MergeStore`: an audit trail with rollback lookup and
/// retention enforcement. A rollback reads a specific `(path, version)`
/// and hands it to Phase S as the desired state for one target.
#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn history(&self, stream: &str, path: &SecretPath) -> Result<Vec<VersionRecord>, EngineError>;

    async fn read_for_rollback(
        &self,
        stream: &str,
        path: &SecretPath,
        version: Version,
    ) -> Result<SecretValue, EngineError>;

    async fn enforce_retention(&self, stream: &str, policy: RetentionPolicy) -> Result<(), EngineError>;
}
