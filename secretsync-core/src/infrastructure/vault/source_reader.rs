// secretsync-core/src/infrastructure/vault/source_reader.rs

use crate::context::{ErrorBuilder, RequestContext};
use crate::domain::error::DomainError;
use crate::domain::secret::{SecretPath, SecretValue};
use crate::domain::source::SourceSpec;
use crate::error::EngineError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::resilience::{retrying_call, CircuitBreaker};
use crate::metrics::{names, Labels, MetricsRegistry};
use crate::ports::SourceReader;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use vaultrs::client::VaultClient;
use vaultrs::kv2;

/// Recursive Vault KV v2 listing, bounded by `SourceSpec.max_secrets`
/// (§4.4). Breadth-first: a slice-backed FIFO queue of directory
/// prefixes, with a monotonically advancing head index and periodic
/// compaction so steady-state memory is O(frontier), not O(total
/// visited).
pub struct VaultSourceReader {
    client: VaultClient,
    spec: SourceSpec,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsRegistry>,
}

impl VaultSourceReader {
    pub fn new(client: VaultClient, spec: SourceSpec, breaker: Arc<CircuitBreaker>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            client,
            spec,
            breaker,
            metrics,
        }
    }

    async fn list_children(&self, prefix: &str) -> Result<Vec<String>, EngineError> {
        let ctx = RequestContext::new();
        let client = &self.client;
        let mount = self.spec.mount.clone();
        let prefix = prefix.to_string();
        let result = retrying_call(&ctx, &self.breaker, || {
            let mount = mount.clone();
            let prefix = prefix.clone();
            async move {
                kv2::list(client, &mount, &prefix).await.map_err(|e| match e {
                    vaultrs::error::ClientError::APIError { code: 404, .. } => {
                        EngineError::Infrastructure(InfrastructureError::Vault("not found".to_string()))
                    }
                    vaultrs::error::ClientError::APIError { code: 401, .. }
                    | vaultrs::error::ClientError::APIError { code: 403, .. } => {
                        EngineError::Infrastructure(InfrastructureError::Unauthorized(format!(
                            "vault list denied at {prefix}"
                        )))
                    }
                    vaultrs::error::ClientError::APIError { code: 429, .. } => {
                        EngineError::Infrastructure(InfrastructureError::Transient(format!("vault list rate-limited at {prefix}")))
                    }
                    vaultrs::error::ClientError::APIError { code, .. } if (500..600).contains(&code) => {
                        EngineError::Infrastructure(InfrastructureError::Transient(format!("vault list failed with {code} at {prefix}")))
                    }
                    other => EngineError::Infrastructure(InfrastructureError::classify_remote(other.to_string(), InfrastructureError::Vault)),
                })
            }
        })
        .await;

        match result {
            Ok(children) => Ok(children),
            Err(EngineError::Infrastructure(InfrastructureError::Vault(msg))) if msg == "not found" => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl SourceReader for VaultSourceReader {
    async fn list_paths(&self) -> Result<Vec<SecretPath>, EngineError> {
        let ctx = RequestContext::new();
        let compaction_threshold = self.spec.effective_compaction_threshold();

        let mut queue: Vec<String> = vec![String::new()];
        let mut head: usize = 0;
        let mut visited: HashSet<String> = HashSet::new();
        let mut leaves: Vec<SecretPath> = Vec::new();

        while head < queue.len() {
            let current = queue[head].clone();
            head += 1;

            if !visited.insert(current.clone()) {
                continue;
            }

            let labels: Labels = vec![("path", current.clone())];
            self.metrics.set_gauge(names::VAULT_QUEUE_SIZE, &labels, (queue.len() - head) as u64);

            let children = self.list_children(&current).await?;

            for child in children {
                if child.ends_with('/') {
                    let mut next_prefix = current.clone();
                    if !next_prefix.is_empty() {
                        next_prefix.push('/');
                    }
                    next_prefix.push_str(child.trim_end_matches('/'));
                    queue.push(next_prefix);
                } else {
                    let mut full = current.clone();
                    if !full.is_empty() {
                        full.push('/');
                    }
                    full.push_str(&child);

                    let path = SecretPath::new(&full).map_err(|err| {
                        EngineError::Domain(DomainError::PathInvalid(
                            ErrorBuilder::new(&ctx, "vault.list").path(&full).build_message(err.to_string()),
                        ))
                    })?;

                    if !self.spec.is_unbounded() && leaves.len() >= self.spec.max_secrets {
                        return Err(EngineError::Domain(DomainError::CapExceeded {
                            max: self.spec.max_secrets,
                        }));
                    }
                    self.metrics.incr_counter(names::VAULT_SECRETS_LISTED, &vec![("path", self.spec.mount.clone())]);
                    leaves.push(path);
                }
            }

            // Queue compaction: reclaim the consumed prefix once it dominates
            // the live queue, per §4.4.
            if head > compaction_threshold && head > queue.len() / 2 {
                queue = queue[head..].to_vec();
                head = 0;
            }
        }

        Ok(leaves)
    }

    async fn read(&self, path: &SecretPath) -> Result<SecretValue, EngineError> {
        let ctx = RequestContext::new();
        let client = &self.client;
        let mount = self.spec.mount.clone();
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
}
