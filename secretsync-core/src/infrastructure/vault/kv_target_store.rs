// secretsync-core/src/infrastructure/vault/kv_target_store.rs

use crate::context::RequestContext;
use crate::domain::secret::{SecretPath, SecretValue, Version};
use crate::error::EngineError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::resilience::{retrying_call, CircuitBreaker};
use crate::ports::{ListedSecret, TargetStore, TargetWriteOptions};
use async_trait::async_trait;
use std::sync::Arc;
use vaultrs::client::VaultClient;
use vaultrs::kv2;

/// A Vault KV v2 mount used as a sync target (§4.5). Versions come
/// directly from Vault's own per-path version counter, so no local
/// version bookkeeping is needed.
pub struct VaultKvTargetStore {
    client: VaultClient,
    mount: String,
    breaker: Arc<CircuitBreaker>,
}

impl VaultKvTargetStore {
    pub fn new(client: VaultClient, mount: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client,
            mount: mount.into(),
            breaker,
        }
    }
}

#[async_trait]
impl TargetStore for VaultKvTargetStore {
    async fn list(&self, prefix: &SecretPath) -> Result<Vec<ListedSecret>, EngineError> {
        let ctx = RequestContext::new();
        let client = &self.client;
        let mount = self.mount.clone();
        let prefix_str = prefix.as_str().to_string();
        let children = retrying_call(&ctx, &self.breaker, || {
            let mount = mount.clone();
            let prefix_str = prefix_str.clone();
            async move {
                kv2::list(client, &mount, &prefix_str)
                    .await
                    .map_err(|e| EngineError::Infrastructure(InfrastructureError::classify_remote(e.to_string(), InfrastructureError::Vault)))
            }
        })
        .await?;

        let mut listed = Vec::new();
        for child in children {
            if child.ends_with('/') {
                continue;
            }
            let full = format!("{}/{}", prefix.as_str(), child);
            if let Ok(path) = SecretPath::new(&full) {
                listed.push(ListedSecret {
                    path,
                    current_version: None,
                });
            }
        }
        Ok(listed)
    }

    async fn read(&self, path: &SecretPath) -> Result<SecretValue, EngineError> {
        let ctx = RequestContext::new();
        let client = &self.client;
        let mount = self.mount.clone();
        let path_str = path.as_str().to_string();
        retrying_call(&ctx, &self.breaker, || {
            let mount = mount.clone();
            let path_str = path_str.clone();
            async move {
                kv2::read::<SecretValue>(client, &mount, &path_str)
                    .await
                    .map_err(|e| EngineError::Infrastructure(InfrastructureError::classify_remote(e.to_string(), InfrastructureError::Vault)))
            }
        })
        .await
    }

    async fn write(
        &self,
        path: &SecretPath,
        value: &SecretValue,
        options: TargetWriteOptions,
    ) -> Result<Version, EngineError> {
        if options.no_empty_secrets && is_empty(value) {
            return Err(EngineError::Fatal(format!("refusing to write empty secret at {path}")));
        }
        if options.skip_unchanged {
            if let Ok(existing) = self.read(path).await {
                if &existing == value {
                    return Ok(Version::FIRST);
                }
            }
        }

        let ctx = RequestContext::new();
        let client = &self.client;
        let mount = self.mount.clone();
        let path_str = path.as_str().to_string();
        let value = value.clone();
        let response = retrying_call(&ctx, &self.breaker, || {
            let mount = mount.clone();
            let path_str = path_str.clone();
            let value = value.clone();
            async move {
                kv2::set(client, &mount, &path_str, &value)
                    .await
                    .map_err(|e| EngineError::Infrastructure(InfrastructureError::classify_remote(e.to_string(), InfrastructureError::Vault)))
            }
        })
        .await?;

        Version::new(response.version).ok_or_else(|| {
            EngineError::Domain(crate::domain::error::DomainError::ConsistencyError(
                "vault returned version 0".to_string(),
            ))
        })
    }

    async fn delete(&self, path: &SecretPath) -> Result<(), EngineError> {
        let ctx = RequestContext::new();
        let client = &self.client;
        let mount = self.mount.clone();
        let path_str = path.as_str().to_string();
        retrying_call(&ctx, &self.breaker, || {
            let mount = mount.clone();
            let path_str = path_str.clone();
            async move {
                kv2::delete_latest(client, &mount, &path_str)
                    .await
                    .map_err(|e| EngineError::Infrastructure(InfrastructureError::classify_remote(e.to_string(), InfrastructureError::Vault)))
            }
        })
        .await
    }
}

fn is_empty(value: &SecretValue) -> bool {
    match value {
        SecretValue::Null => true,
        SecretValue::String(s) => s.is_empty(),
        SecretValue::Object(m) => m.is_empty(),
        SecretValue::Array(a) => a.is_empty(),
        _ => false,
    }
}
