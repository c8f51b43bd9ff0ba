// secretsync-core/src/ports/source_reader.rs

use crate::domain::secret::{SecretPath, SecretValue};
use crate::error::EngineError;
use async_trait::async_trait;

/// Reads the leaf secrets reachable from a mount root. One instance per
/// `SourceSpec` per run (§3 lifecycle): created, used for list+read, then
/// discarded.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Every leaf `SecretPath` under the mount root, in BFS discovery
    /// order. Implementations enforce `max_secrets` and raise
    /// `EngineError::Domain(DomainError::CapExceeded)` on overflow.
    async fn list_paths(&self) -> Result<Vec<SecretPath>, EngineError>;

    async fn read(&self, path: &SecretPath) -> Result<SecretValue, EngineError>;
}
