// secretsync-core/src/infrastructure/aws/secrets_manager.rs

use crate::context::RequestContext;
use crate::domain::error::DomainError;
use crate::domain::secret::{SecretPath, SecretValue, Version};
use crate::error::EngineError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::resilience::{retrying_call, CircuitBreaker};
use crate::metrics::{names, Labels, MetricsRegistry};
use crate::ports::{ListedSecret, TargetStore, TargetWriteOptions};
use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// AWS Secrets Manager as a sync target (§4.5). Maintains a
/// `path -> ARN` cache so repeated writes skip the name-to-ARN lookup;
/// the cache is invalidated on write and delete for the affected path to
/// avoid reusing a stale ARN after an external recreate.
pub struct AwsSecretsManagerTargetStore {
    client: Client,
    region: String,
    arn_cache: RwLock<HashMap<String, String>>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsRegistry>,
}

impl AwsSecretsManagerTargetStore {
    pub fn new(client: Client, region: impl Into<String>, breaker: Arc<CircuitBreaker>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            client,
            region: region.into(),
            arn_cache: RwLock::new(HashMap::new()),
            breaker,
            metrics,
        }
    }

    async fn resolve_arn(&self, path: &SecretPath) -> Option<String> {
        if let Some(arn) = self.arn_cache.read().await.get(path.as_str()) {
            self.record_cache(names::AWS_CACHE_HITS, "resolve_arn");
            return Some(arn.clone());
        }
        self.record_cache(names::AWS_CACHE_MISSES, "resolve_arn");
        None
    }

    async fn invalidate(&self, path: &SecretPath) {
        self.arn_cache.write().await.remove(path.as_str());
    }

    fn record_cache(&self, metric: &str, operation: &str) {
        self.metrics.incr_counter(metric, &vec![("operation", operation.to_string())]);
    }

    fn record_operation(&self, operation: &str, status: &str) {
        self.metrics.incr_counter(
            names::AWS_SECRETS_OPERATIONS,
            &vec![("operation", operation.to_string()), ("status", status.to_string())],
        );
    }
}

#[async_trait]
impl TargetStore for AwsSecretsManagerTargetStore {
    async fn list(&self, prefix: &SecretPath) -> Result<Vec<ListedSecret>, EngineError> {
        let ctx = RequestContext::new();
        let client = self.client.clone();
        let mut listed = Vec::new();
        let mut next_token: Option<String> = None;
        let mut pages = 0u64;

        loop {
            let client = client.clone();
            let token = next_token.clone();
            let page = retrying_call(&ctx, &self.breaker, || {
                let client = client.clone();
                let token = token.clone();
                async move {
                    client
                        .list_secrets()
                        .set_next_token(token)
                        .send()
                        .await
                        .map_err(crate::infrastructure::aws::classify_aws_error)
                }
            })
            .await?;

            pages += 1;
            for entry in page.secret_list() {
                if let Some(name) = entry.name() {
                    if !name.starts_with(prefix.as_str()) {
                        continue;
                    }
                    if let Ok(path) = SecretPath::new(name) {
                        if let Some(arn) = entry.arn() {
                            self.arn_cache.write().await.insert(path.as_str().to_string(), arn.to_string());
                        }
                        listed.push(ListedSecret {
                            path,
                            current_version: None,
                        });
                    }
                }
            }

            next_token = page.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        self.metrics.observe_histogram(names::AWS_PAGINATION_PAGES, &Labels::new(), pages as f64);
        Ok(listed)
    }

    async fn read(&self, path: &SecretPath) -> Result<SecretValue, EngineError> {
        let ctx = RequestContext::new();
        let client = self.client.clone();
        let secret_id = self.resolve_arn(path).await.unwrap_or_else(|| path.as_str().to_string());
        let result = retrying_call(&ctx, &self.breaker, || {
            let client = client.clone();
            let secret_id = secret_id.clone();
            async move {
                client
                    .get_secret_value()
                    .secret_id(secret_id)
                    .send()
                    .await
                    .map_err(crate::infrastructure::aws::classify_aws_error)
            }
        })
        .await;

        self.record_operation("get_secret_value", if result.is_ok() { "ok" } else { "error" });
        let output = result?;
        let raw = output.secret_string().unwrap_or("{}");
        serde_json::from_str(raw).map_err(|e| EngineError::Infrastructure(InfrastructureError::Json(e)))
    }

    async fn write(
        &self,
        path: &SecretPath,
        value: &SecretValue,
        options: TargetWriteOptions,
    ) -> Result<Version, EngineError> {
        if options.no_empty_secrets && is_empty(value) {
            return Ok(Version::FIRST);
        }
        if options.skip_unchanged {
            if let Ok(existing) = self.read(path).await {
                if &existing == value {
                    return Ok(Version::FIRST);
                }
            }
        }

        let ctx = RequestContext::new();
        let payload = serde_json::to_string(value).map_err(InfrastructureError::Json)?;
        let client = self.client.clone();
        let secret_id = path.as_str().to_string();
        let payload_for_create = payload.clone();

        let result = retrying_call(&ctx, &self.breaker, || {
            let client = client.clone();
            let secret_id = secret_id.clone();
            let payload = payload.clone();
            async move {
                client
                    .put_secret_value()
                    .secret_id(&secret_id)
                    .secret_string(&payload)
                    .send()
                    .await
                    .map_err(crate::infrastructure::aws::classify_aws_error)
            }
        })
        .await;

        let result = match result {
            Ok(output) => Ok(output),
            Err(_not_found_or_other) => {
                let client = self.client.clone();
                let secret_id = path.as_str().to_string();
                retrying_call(&ctx, &self.breaker, || {
                    let client = client.clone();
                    let secret_id = secret_id.clone();
                    let payload_for_create = payload_for_create.clone();
                    async move {
                        client
                            .create_secret()
                            .name(&secret_id)
                            .secret_string(&payload_for_create)
                            .send()
                            .await
                            .map_err(crate::infrastructure::aws::classify_aws_error)
                            .map(|_| aws_sdk_secretsmanager::operation::put_secret_value::PutSecretValueOutput::builder().build())
                    }
                })
                .await
            }
        };

        self.invalidate(path).await;
        self.record_operation("write", if result.is_ok() { "ok" } else { "error" });
        result?;
        Version::new(1).ok_or_else(|| EngineError::Domain(DomainError::ConsistencyError("version zero".to_string())))
    }

    async fn delete(&self, path: &SecretPath) -> Result<(), EngineError> {
        let ctx = RequestContext::new();
        let client = self.client.clone();
        let secret_id = self.resolve_arn(path).await.unwrap_or_else(|| path.as_str().to_string());
        let result = retrying_call(&ctx, &self.breaker, || {
            let client = client.clone();
            let secret_id = secret_id.clone();
            async move {
                client
                    .delete_secret()
                    .secret_id(secret_id)
                    .send()
                    .await
                    .map_err(crate::infrastructure::aws::classify_aws_error)
            }
        })
        .await;
        self.invalidate(path).await;
        self.record_operation("delete_secret", if result.is_ok() { "ok" } else { "error" });
        result.map(|_| ())
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
