// secretsync-core/src/ports/merge_store.rs

use crate::domain::secret::{SecretPath, SecretValue, Version};
use crate::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to a `MergeStore` write: who wrote it, when, and why.
/// Mirrors the sidecar/object-tagging metadata the spec describes for an
/// object-storage backing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteMeta {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A retention policy for `MergeStore::prune` / `VersionStore` cleanup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum RetentionPolicy {
    KeepLastN(usize),
    KeepWithinDays(i64),
    KeepAll,
}

/// The durable substrate for Phase M output and inter-target imports
/// (§4.6). Canonical object-storage layout: `<stream>/<path>/v<N>.json`
/// plus a `latest.json` alias; implementations over other backends may
/// render this differently as long as the contract holds.
///
/// Concurrency: writes are per-`(stream, path)` last-writer-wins; a
/// version is issued by reading the current max and writing `max+1` —
/// on conflict the loser retries. Writes to distinct paths never
/// interfere.
#[async_trait]
pub trait MergeStore: Send + Sync {
    async fn write_secret(
        &self,
        stream: &str,
        path: &SecretPath,
        value: &SecretValue,
        meta: WriteMeta,
    ) -> Result<Version, EngineError>;

    async fn read_secret(&self, stream: &str, path: &SecretPath) -> Result<(SecretValue, Version), EngineError>;

    async fn list_secrets(&self, stream: &str) -> Result<Vec<SecretPath>, EngineError>;

    async fn list_versions(&self, stream: &str, path: &SecretPath) -> Result<Vec<Version>, EngineError>;

    async fn read_version(&self, stream: &str, path: &SecretPath, version: Version) -> Result<SecretValue, EngineError>;

    async fn prune(&self, stream: &str, policy: RetentionPolicy) -> Result<(), EngineError>;
}
