// secretsync-core/src/infrastructure/vault/kv_merge_store.rs
//
// Vault-KV backed alternative to S3MergeStore (§4.6: "MergeStore (S3 or
// Vault-KV backed)"). Unlike the S3 implementation this one doesn't need
// to invent a version counter: KV v2 already keeps one per path, so
// `write_secret` is a plain `kv2::set` and the returned version is
// whatever Vault assigns.

use crate::domain::secret::{SecretPath, SecretValue, Version};
use crate::error::EngineError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::resilience::CircuitBreaker;
use crate::ports::{MergeStore, RetentionPolicy, WriteMeta};
use async_trait::async_trait;
use std::sync::Arc;
use vaultrs::client::VaultClient;
use vaultrs::kv2;

pub struct VaultKvMergeStore {
    client: VaultClient,
    mount: String,
    breaker: Arc<CircuitBreaker>,
}

impl VaultKvMergeStore {
    pub fn new(client: VaultClient, mount: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client,
            mount: mount.into(),
            breaker,
        }
    }

    fn full_path(&self, stream: &str, path: &SecretPath) -> String {
        format!("{stream}/{}", path.as_str())
    }
}

#[async_trait]
impl MergeStore for VaultKvMergeStore {
    async fn write_secret(&self, stream: &str, path: &SecretPath, value: &SecretValue, meta: WriteMeta) -> Result<Version, EngineError> {
        let full_path = self.full_path(stream, path);
        let client = &self.client;
        let mount = self.mount.clone();
        let path_str = full_path.clone();
        // meta travels as a sidecar field alongside the payload, same
        // shape a MergeStore consumer expects when reading it back.
        let envelope = serde_json::json!({ "value": value, "meta": meta });
        let response = self
            .breaker
            .call(|| async move {
                kv2::set(client, &mount, &path_str, &envelope)
                    .await
                    .map_err(|e| EngineError::Infrastructure(InfrastructureError::Vault(e.to_string())))
            })
            .await?;

        Version::new(response.version).ok_or_else(|| {
            EngineError::Domain(crate::domain::error::DomainError::ConsistencyError(
                "vault returned version 0".to_string(),
            ))
        })
    }

    async fn read_secret(&self, stream: &str, path: &SecretPath) -> Result<(SecretValue, Version), EngineError> {
        let full_path = self.full_path(stream, path);
        let client = &self.client;
        let mount = self.mount.clone();
        let path_str = full_path.clone();
        let envelope: SecretValue = self
            .breaker
            .call(|| async move {
                kv2::read::<SecretValue>(client, &mount, &path_str)
                    .await
                    .map_err(|e| EngineError::Infrastructure(InfrastructureError::Vault(e.to_string())))
            })
            .await?;

        let client = &self.client;
        let mount = self.mount.clone();
        let path_str = full_path.clone();
        let metadata = self
            .breaker
            .call(|| async move {
                kv2::read_metadata(client, &mount, &path_str)
                    .await
                    .map_err(|e| EngineError::Infrastructure(InfrastructureError::Vault(e.to_string())))
            })
            .await?;

        let version = Version::new(metadata.current_version).unwrap_or(Version::FIRST);
        let value = envelope.get("value").cloned().unwrap_or(envelope);
        Ok((value, version))
    }

    async fn list_secrets(&self, stream: &str) -> Result<Vec<SecretPath>, EngineError> {
        // Recursive BFS over the stream's subtree, same shape as
        // VaultSourceReader::list_paths: KV v2's `list` is single-level.
        let mut queue: Vec<String> = vec![stream.to_string()];
        let mut head = 0;
        let mut paths = Vec::new();

        while head < queue.len() {
            let current = queue[head].clone();
            head += 1;

            let client = &self.client;
            let mount = self.mount.clone();
            let current_owned = current.clone();
            let children = self
                .breaker
                .call(|| async move {
                    kv2::list(client, &mount, &current_owned)
                        .await
                        .map_err(|e| EngineError::Infrastructure(InfrastructureError::Vault(e.to_string())))
                })
                .await;

            let children = match children {
                Ok(c) => c,
                Err(EngineError::Infrastructure(InfrastructureError::Vault(msg))) if msg.contains("404") => Vec::new(),
                Err(err) => return Err(err),
            };

            for child in children {
                if child.ends_with('/') {
                    queue.push(format!("{current}/{}", child.trim_end_matches('/')));
                } else {
                    let full = format!("{current}/{child}");
                    if let Some(relative) = full.strip_prefix(&format!("{stream}/")) {
                        if let Ok(path) = SecretPath::new(relative) {
                            paths.push(path);
                        }
                    }
                }
            }
        }
        Ok(paths)
    }

    async fn list_versions(&self, stream: &str, path: &SecretPath) -> Result<Vec<Version>, EngineError> {
        let full_path = self.full_path(stream, path);
        let client = &self.client;
        let mount = self.mount.clone();
        let path_str = full_path.clone();
        let metadata = self
            .breaker
            .call(|| async move {
                kv2::read_metadata(client, &mount, &path_str)
                    .await
                    .map_err(|e| EngineError::Infrastructure(InfrastructureError::Vault(e.to_string())))
            })
            .await?;

        let mut versions: Vec<Version> = metadata
            .versions
            .keys()
            .filter_map(|v| v.parse::<u64>().ok())
            .filter_map(Version::new)
            .collect();
        versions.sort();
        Ok(versions)
    }

    async fn read_version(&self, stream: &str, path: &SecretPath, version: Version) -> Result<SecretValue, EngineError> {
        let full_path = self.full_path(stream, path);
        let client = &self.client;
        let mount = self.mount.clone();
        let path_str = full_path.clone();
        let envelope: SecretValue = self
            .breaker
            .call(|| async move {
                kv2::read_version::<SecretValue>(client, &mount, &path_str, version.value())
                    .await
                    .map_err(|e| EngineError::Infrastructure(InfrastructureError::Vault(e.to_string())))
            })
            .await?;
        Ok(envelope.get("value").cloned().unwrap_or(envelope))
    }

    async fn prune(&self, stream: &str, policy: RetentionPolicy) -> Result<(), EngineError> {
        let RetentionPolicy::KeepLastN(n) = policy else {
            // Vault KV v2 has no built-in age-based prune; `KeepWithinDays`
            // is honored by VersionStore's own bookkeeping layer instead.
            return Ok(());
        };

        for path in self.list_secrets(stream).await? {
            let mut versions = self.list_versions(stream, &path).await?;
            versions.sort();
            if versions.len() <= n {
                continue;
            }
            let to_destroy: Vec<u64> = versions[..versions.len() - n].iter().map(|v| v.value()).collect();
            let full_path = self.full_path(stream, &path);
            let client = &self.client;
            let mount = self.mount.clone();
            let path_str = full_path.clone();
            self.breaker
                .call(|| async move {
                    kv2::destroy(client, &mount, &path_str, to_destroy)
                        .await
                        .map_err(|e| EngineError::Infrastructure(InfrastructureError::Vault(e.to_string())))
                })
                .await?;
        }
        Ok(())
    }
}
