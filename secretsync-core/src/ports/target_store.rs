// secretsync-core/src/ports/target_store.rs

use crate::domain::secret::{SecretPath, SecretValue, Version};
use crate::error::EngineError;
use async_trait::async_trait;

/// Per-call options threaded into `TargetStore::write` (§4.5, §9: these
/// are call-site options, never global toggles).
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetWriteOptions {
    /// Skip the network call entirely when the new value hashes equal to
    /// the last known value.
    pub skip_unchanged: bool,
    /// Skip paths whose value is empty/absent rather than writing them.
    pub no_empty_secrets: bool,
}

/// A listed path paired with the store's notion of its current version,
/// when the backend tracks one (Vault KV does; plain AWS SM ARNs don't).
#[derive(Debug, Clone)]
pub struct ListedSecret {
    pub path: SecretPath,
    pub current_version: Option<Version>,
}

/// The common operation set over AWS Secrets Manager / Vault KV target
/// backends (§4.5). One handle per `TargetSpec` per run; role-assumed
/// credentials (if any) live for the handle's lifetime.
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn list(&self, prefix: &SecretPath) -> Result<Vec<ListedSecret>, EngineError>;

    async fn read(&self, path: &SecretPath) -> Result<SecretValue, EngineError>;

    async fn write(
        &self,
        path: &SecretPath,
        value: &SecretValue,
        options: TargetWriteOptions,
    ) -> Result<Version, EngineError>;

    async fn delete(&self, path: &SecretPath) -> Result<(), EngineError>;
}
