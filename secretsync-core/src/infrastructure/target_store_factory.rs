// secretsync-core/src/infrastructure/target_store_factory.rs
//
// The only concrete `TargetStoreFactory`: resolves a `TargetSpec` into a
// live `AwsSecretsManagerTargetStore` or `VaultKvTargetStore`, handle
// construction deferred until the dependency graph names the target
// (§1, §4.5). Each distinct backend endpoint gets its own `CircuitBreaker`
// (§4.2: "breakers are never shared across endpoints"), cached here so
// targets that share a region or mount share a failure domain instead of
// each opening its own breaker on the first error.

use crate::domain::target::{TargetKind, TargetSpec};
use crate::error::EngineError;
use crate::infrastructure::aws::AwsSecretsManagerTargetStore;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::resilience::CircuitBreaker;
use crate::infrastructure::vault::VaultKvTargetStore;
use crate::metrics::MetricsRegistry;
use crate::ports::{CredentialProvider, TargetStore, TargetStoreFactory};
use async_trait::async_trait;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_secretsmanager::config::Region;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};

const FAILURE_THRESHOLD: u32 = 5;
const OPEN_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REGION: &str = "us-east-1";

/// Builds `TargetStore` handles on demand, one per target per run.
/// `default_vault_addr` is the Vault server address used for every
/// `vault_kv` target; a target's own `endpoint` field names its mount, not
/// a distinct server, so this crate does not support fanning out to more
/// than one Vault cluster in a single pipeline run (§1 non-goal).
pub struct DefaultTargetStoreFactory {
    credentials: Arc<dyn CredentialProvider>,
    metrics: Arc<MetricsRegistry>,
    default_vault_addr: String,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl DefaultTargetStoreFactory {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        metrics: Arc<MetricsRegistry>,
        default_vault_addr: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            metrics,
            default_vault_addr: default_vault_addr.into(),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    async fn breaker_for(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().await.get(endpoint) {
            return existing.clone();
        }
        let mut guard = self.breakers.write().await;
        guard
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    endpoint.to_string(),
                    FAILURE_THRESHOLD,
                    OPEN_TIMEOUT,
                    self.metrics.clone(),
                ))
            })
            .clone()
    }

    async fn build_secrets_manager(&self, target: &TargetSpec) -> Result<Arc<dyn TargetStore>, EngineError> {
        let region = target.region.clone().unwrap_or_else(|| DEFAULT_REGION.to_string());
        let credentials = self.credentials.aws_credentials(target.role_arn.as_deref()).await?;
        let config = aws_config::from_env()
            .region(Region::new(region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .load()
            .await;
        let client = aws_sdk_secretsmanager::Client::new(&config);
        let breaker = self.breaker_for(&format!("aws-secrets-manager:{region}")).await;
        Ok(Arc::new(AwsSecretsManagerTargetStore::new(client, region, breaker, self.metrics.clone())))
    }

    async fn build_vault_kv(&self, target: &TargetSpec) -> Result<Arc<dyn TargetStore>, EngineError> {
        let mount = target.endpoint.clone().ok_or_else(|| {
            EngineError::Fatal(format!(
                "target '{}' is vault_kv but declares no endpoint (mount)",
                target.name
            ))
        })?;
        let token = self.credentials.vault_token().await?;
        let settings = VaultClientSettingsBuilder::default()
            .address(self.default_vault_addr.clone())
            .token(token)
            .build()
            .map_err(|e| EngineError::Infrastructure(InfrastructureError::Vault(e.to_string())))?;
        let client = VaultClient::new(settings).map_err(|e| EngineError::Infrastructure(InfrastructureError::Vault(e.to_string())))?;
        let breaker = self.breaker_for(&format!("vault-kv:{mount}")).await;
        Ok(Arc::new(VaultKvTargetStore::new(client, mount, breaker)))
    }
}

#[async_trait]
impl TargetStoreFactory for DefaultTargetStoreFactory {
    async fn build(&self, target: &TargetSpec) -> Result<Arc<dyn TargetStore>, EngineError> {
        match target.kind {
            TargetKind::AwsSecretsManager => self.build_secrets_manager(target).await,
            TargetKind::VaultKv => self.build_vault_kv(target).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::StaticCredentialProvider;
    use aws_credential_types::Credentials;

    fn factory() -> DefaultTargetStoreFactory {
        let credentials: Arc<dyn CredentialProvider> = Arc::new(StaticCredentialProvider::new(
            "s.test-token",
            Credentials::new("AKIA", "secret", None, None, "test"),
        ));
        DefaultTargetStoreFactory::new(credentials, Arc::new(MetricsRegistry::new()), "http://127.0.0.1:8200")
    }

    #[tokio::test]
    async fn breaker_for_same_endpoint_returns_the_same_instance() {
        let factory = factory();
        let a = factory.breaker_for("aws-secrets-manager:us-east-1").await;
        let b = factory.breaker_for("aws-secrets-manager:us-east-1").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn breaker_for_distinct_endpoints_returns_distinct_instances() {
        let factory = factory();
        let a = factory.breaker_for("aws-secrets-manager:us-east-1").await;
        let b = factory.breaker_for("aws-secrets-manager:eu-west-1").await;
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn vault_kv_target_without_endpoint_is_rejected() {
        let factory = factory();
        let target = TargetSpec {
            name: "no-mount".to_string(),
            kind: TargetKind::VaultKv,
            region: None,
            role_arn: None,
            endpoint: None,
            inherits: None,
            imports: Vec::new(),
            overrides: serde_json::json!({}),
            filter: None,
        };
        let result = factory.build(&target).await;
        assert!(result.is_err());
    }
}
