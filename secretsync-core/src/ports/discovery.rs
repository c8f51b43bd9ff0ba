// secretsync-core/src/ports/discovery.rs

use crate::domain::discovery::{Account, AccountAssignment, IdentityCenterFilter, OrganizationsFilter, PermissionSet};
use crate::error::EngineError;
use async_trait::async_trait;

/// AWS Organizations account enumeration, filtered and cached (§4.8).
/// Implementations cache results in memory keyed by the filter tuple.
#[async_trait]
pub trait OrganizationsDiscovery: Send + Sync {
    async fn list_accounts(&self, filter: &OrganizationsFilter) -> Result<Vec<Account>, EngineError>;
}

/// Identity Center permission-set and account-assignment enumeration
/// (§4.8). The instance ARN / identity-store id are auto-discovered on
/// first use if not configured.
#[async_trait]
pub trait IdentityCenterDiscovery: Send + Sync {
    async fn list_permission_sets(&self) -> Result<Vec<PermissionSet>, EngineError>;

    async fn list_assignments(&self, filter: &IdentityCenterFilter) -> Result<Vec<AccountAssignment>, EngineError>;
}
