// secretsync-core/src/ports/target_store_factory.rs
//
// Target backends need per-target credentials (an assumed role, a mount
// scoped to one account) that aren't known until the dependency graph is
// built and dynamic targets are materialized. The orchestrator asks this
// factory for a handle lazily, once per target, rather than requiring
// every handle to exist before Phase S starts.

use crate::domain::target::TargetSpec;
use crate::error::EngineError;
use crate::ports::TargetStore;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait TargetStoreFactory: Send + Sync {
    async fn build(&self, target: &TargetSpec) -> Result<Arc<dyn TargetStore>, EngineError>;
}
