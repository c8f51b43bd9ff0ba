// secretsync-core/src/infrastructure/aws/mod.rs

pub mod identity_center;
pub mod organizations;
pub mod s3_merge_store;
pub mod secrets_manager;

pub use identity_center::AwsIdentityCenterDiscovery;
pub use organizations::AwsOrganizationsDiscovery;
pub use s3_merge_store::S3MergeStore;
pub use secrets_manager::AwsSecretsManagerTargetStore;

use crate::error::EngineError;
use crate::infrastructure::error::InfrastructureError;

/// Maps any AWS SDK operation error to `EngineError`, classifying 5xx,
/// throttling, and 429 responses as `Transient` so `retrying_call` retries
/// them; every other status (auth, not-found, validation) becomes a plain
/// `Aws` error and fails immediately.
pub fn classify_aws_error<E: std::error::Error>(err: E) -> EngineError {
    EngineError::Infrastructure(InfrastructureError::classify_remote(err.to_string(), InfrastructureError::Aws))
}
