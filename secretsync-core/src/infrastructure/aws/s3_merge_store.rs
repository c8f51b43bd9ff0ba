// secretsync-core/src/infrastructure/aws/s3_merge_store.rs
//
// Object-storage backing for MergeStore (§4.6, §6): canonical layout
// `<prefix>/<stream>/<path>/v<N>.json` plus a sibling `<path>/latest.json`
// alias. A version is issued by reading the current max and writing
// `max+1`; on a conflicting concurrent writer the loser retries (§9: "the
// contract is at-least-once append, last-write-wins per version slot").

use crate::context::RequestContext;
use crate::domain::secret::{SecretPath, SecretValue, Version};
use crate::error::EngineError;
use crate::infrastructure::aws::classify_aws_error;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::resilience::{retrying_call, CircuitBreaker};
use crate::metrics::{names, MetricsRegistry};
use crate::ports::{MergeStore, RetentionPolicy, WriteMeta};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use chrono::Utc;
use std::sync::Arc;

const MAX_WRITE_RETRIES: u32 = 5;

#[derive(serde::Serialize, serde::Deserialize)]
struct StoredSecret {
    value: SecretValue,
    meta: WriteMeta,
}

pub struct S3MergeStore {
    client: Client,
    bucket: String,
    prefix: String,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsRegistry>,
}

impl S3MergeStore {
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>, breaker: Arc<CircuitBreaker>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            breaker,
            metrics,
        }
    }

    fn stream_path_prefix(&self, stream: &str, path: &SecretPath) -> String {
        format!("{}/{}/{}/", self.prefix.trim_end_matches('/'), stream, path.as_str())
    }

    fn version_key(&self, stream: &str, path: &SecretPath, version: Version) -> String {
        format!("{}v{}.json", self.stream_path_prefix(stream, path), version.value())
    }

    fn latest_key(&self, stream: &str, path: &SecretPath) -> String {
        format!("{}latest.json", self.stream_path_prefix(stream, path))
    }

    async fn object(&self, key: &str) -> Result<Option<StoredSecret>, EngineError> {
        let ctx = RequestContext::new();
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key_owned = key.to_string();
        let result = retrying_call(&ctx, &self.breaker, || {
            let client = client.clone();
            let bucket = bucket.clone();
            let key_owned = key_owned.clone();
            async move { client.get_object().bucket(&bucket).key(&key_owned).send().await.map_err(classify_aws_error) }
        })
        .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| EngineError::Infrastructure(InfrastructureError::Aws(e.to_string())))?
                    .into_bytes();
                let stored: StoredSecret =
                    serde_json::from_slice(&bytes).map_err(|e| EngineError::Infrastructure(InfrastructureError::Json(e)))?;
                Ok(Some(stored))
            }
            Err(EngineError::Infrastructure(InfrastructureError::Aws(msg))) if msg.contains("NoSuchKey") => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn put_object(&self, key: &str, stored: &StoredSecret) -> Result<(), EngineError> {
        let ctx = RequestContext::new();
        let body = serde_json::to_vec(stored).map_err(InfrastructureError::Json)?;
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key_owned = key.to_string();
        retrying_call(&ctx, &self.breaker, || {
            let client = client.clone();
            let bucket = bucket.clone();
            let key_owned = key_owned.clone();
            let body = body.clone();
            async move {
                client
                    .put_object()
                    .bucket(&bucket)
                    .key(&key_owned)
                    .body(body.into())
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(classify_aws_error)
            }
        })
        .await
    }

    async fn existing_versions(&self, stream: &str, path: &SecretPath) -> Result<Vec<Version>, EngineError> {
        let ctx = RequestContext::new();
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let prefix = self.stream_path_prefix(stream, path);
        let page = retrying_call(&ctx, &self.breaker, || {
            let client = client.clone();
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            async move { client.list_objects_v2().bucket(&bucket).prefix(&prefix).send().await.map_err(classify_aws_error) }
        })
        .await?;

        let mut versions = Vec::new();
        for object in page.contents() {
            let Some(key) = object.key() else { continue };
            let Some(file) = key.rsplit('/').next() else { continue };
            let Some(num_str) = file.strip_prefix('v').and_then(|s| s.strip_suffix(".json")) else { continue };
            if let Ok(num) = num_str.parse::<u64>() {
                if let Some(version) = Version::new(num) {
                    versions.push(version);
                }
            }
        }
        Ok(versions)
    }

    async fn next_version(&self, stream: &str, path: &SecretPath) -> Result<Version, EngineError> {
        let versions = self.existing_versions(stream, path).await?;
        Ok(versions.into_iter().max().map(Version::next).unwrap_or(Version::FIRST))
    }
}

#[async_trait]
impl MergeStore for S3MergeStore {
    async fn write_secret(&self, stream: &str, path: &SecretPath, value: &SecretValue, meta: WriteMeta) -> Result<Version, EngineError> {
        let start = std::time::Instant::now();
        let mut last_err = None;

        for _attempt in 0..MAX_WRITE_RETRIES {
            let version = self.next_version(stream, path).await?;
            let stored = StoredSecret { value: value.clone(), meta: meta.clone() };

            let version_key = self.version_key(stream, path, version);
            match self.object(&version_key).await? {
                Some(_) => {
                    // Another writer claimed this version slot; retry with a fresh read.
                    last_err = Some(EngineError::Domain(crate::domain::error::DomainError::ConsistencyError(format!(
                        "version slot {version} already claimed for {stream}/{path}"
                    ))));
                    continue;
                }
                None => {
                    self.put_object(&version_key, &stored).await?;
                    self.put_object(&self.latest_key(stream, path), &stored).await?;
                    self.metrics.observe_histogram(names::S3_OPERATION_DURATION, &vec![("operation", "write_secret".to_string())], start.elapsed().as_secs_f64());
                    return Ok(version);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| EngineError::Fatal("exhausted write retries".to_string())))
    }

    async fn read_secret(&self, stream: &str, path: &SecretPath) -> Result<(SecretValue, Version), EngineError> {
        let key = self.latest_key(stream, path);
        let stored = self
            .object(&key)
            .await?
            .ok_or_else(|| EngineError::Domain(crate::domain::error::DomainError::StreamNotFound(stream.to_string())))?;
        let version = self.next_version(stream, path).await?;
        let current = version.value().saturating_sub(1);
        Ok((stored.value, Version::new(current.max(1)).unwrap_or(Version::FIRST)))
    }

    async fn list_secrets(&self, stream: &str) -> Result<Vec<SecretPath>, EngineError> {
        let ctx = RequestContext::new();
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let prefix = format!("{}/{}/", self.prefix.trim_end_matches('/'), stream);
        let page = retrying_call(&ctx, &self.breaker, || {
            let client = client.clone();
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            async move { client.list_objects_v2().bucket(&bucket).prefix(&prefix).send().await.map_err(classify_aws_error) }
        })
        .await?;

        let mut paths = std::collections::BTreeSet::new();
        for object in page.contents() {
            let Some(key) = object.key() else { continue };
            let Some(rest) = key.strip_prefix(&prefix) else { continue };
            let Some(path_part) = rest.rsplit_once('/').map(|(p, _)| p) else { continue };
            if let Ok(path) = SecretPath::new(path_part) {
                paths.insert(path);
            }
        }
        Ok(paths.into_iter().collect())
    }

    async fn list_versions(&self, stream: &str, path: &SecretPath) -> Result<Vec<Version>, EngineError> {
        let mut versions = self.existing_versions(stream, path).await?;
        versions.sort();
        Ok(versions)
    }

    async fn read_version(&self, stream: &str, path: &SecretPath, version: Version) -> Result<SecretValue, EngineError> {
        let key = self.version_key(stream, path, version);
        let stored = self
            .object(&key)
            .await?
            .ok_or_else(|| EngineError::Domain(crate::domain::error::DomainError::ConsistencyError(format!("missing version {version} for {stream}/{path}"))))?;
        Ok(stored.value)
    }

    async fn prune(&self, stream: &str, policy: RetentionPolicy) -> Result<(), EngineError> {
        // Pruning iterates every path under the stream; left as a
        // best-effort sweep since S3 has no atomic multi-object delete
        // guarantee relevant to this contract.
        for path in self.list_secrets(stream).await? {
            let mut versions = self.list_versions(stream, &path).await?;
            versions.sort();
            let to_delete: Vec<Version> = match policy {
                RetentionPolicy::KeepAll => Vec::new(),
                RetentionPolicy::KeepLastN(n) => {
                    if versions.len() > n {
                        versions[..versions.len() - n].to_vec()
                    } else {
                        Vec::new()
                    }
                }
                RetentionPolicy::KeepWithinDays(days) => {
                    let cutoff = Utc::now() - chrono::Duration::days(days);
                    let mut stale = Vec::new();
                    for version in &versions {
                        if let Ok(Some(stored)) = self.object(&self.version_key(stream, &path, *version)).await {
                            if stored.meta.timestamp < cutoff {
                                stale.push(*version);
                            }
                        }
                    }
                    stale
                }
            };

            for version in to_delete {
                let ctx = RequestContext::new();
                let client = self.client.clone();
                let bucket = self.bucket.clone();
                let key = self.version_key(stream, &path, version);
                let _ = retrying_call(&ctx, &self.breaker, || {
                    let client = client.clone();
                    let bucket = bucket.clone();
                    let key = key.clone();
                    async move { client.delete_object().bucket(&bucket).key(&key).send().await.map(|_| ()).map_err(classify_aws_error) }
                })
                .await;
            }
        }
        Ok(())
    }
}
