// secretsync-core/src/infrastructure/aws/organizations.rs

use crate::context::RequestContext;
use crate::domain::discovery::{Account, AccountStatus, OrganizationsFilter};
use crate::error::EngineError;
use crate::infrastructure::aws::classify_aws_error;
use crate::infrastructure::resilience::{retrying_call, CircuitBreaker, TtlCache};
use crate::metrics::MetricsRegistry;
use crate::ports::OrganizationsDiscovery;
use async_trait::async_trait;
use aws_sdk_organizations::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Organizations account enumeration (§4.8): walks the OU tree from each
/// root, classifying every account it finds, then applies `filter` in
/// memory. Results are cached in memory keyed by the filter tuple with a
/// 1-hour default TTL.
pub struct AwsOrganizationsDiscovery {
    client: Client,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsRegistry>,
    cache: TtlCache<String, Vec<Account>>,
}

impl AwsOrganizationsDiscovery {
    pub fn new(client: Client, breaker: Arc<CircuitBreaker>, metrics: Arc<MetricsRegistry>) -> Self {
        Self::with_ttl(client, breaker, metrics, DEFAULT_TTL)
    }

    pub fn with_ttl(client: Client, breaker: Arc<CircuitBreaker>, metrics: Arc<MetricsRegistry>, ttl: Duration) -> Self {
        Self {
            client,
            breaker,
            metrics,
            cache: TtlCache::new(ttl),
        }
    }

    async fn list_roots(&self) -> Result<Vec<String>, EngineError> {
        let ctx = RequestContext::new();
        let client = self.client.clone();
        let page = retrying_call(&ctx, &self.breaker, || {
            let client = client.clone();
            async move { client.list_roots().send().await.map_err(classify_aws_error) }
        })
        .await?;
        Ok(page.roots().iter().filter_map(|r| r.id().map(str::to_string)).collect())
    }

    async fn list_child_ous(&self, parent_id: &str) -> Result<Vec<(String, String)>, EngineError> {
        let ctx = RequestContext::new();
        let client = self.client.clone();
        let parent = parent_id.to_string();
        let page = retrying_call(&ctx, &self.breaker, || {
            let client = client.clone();
            let parent = parent.clone();
            async move {
                client
                    .list_organizational_units_for_parent()
                    .parent_id(parent)
                    .send()
                    .await
                    .map_err(classify_aws_error)
            }
        })
        .await?;
        Ok(page
            .organizational_units()
            .iter()
            .filter_map(|ou| Some((ou.id()?.to_string(), ou.name()?.to_string())))
            .collect())
    }

    async fn list_child_accounts(&self, parent_id: &str) -> Result<Vec<aws_sdk_organizations::types::Account>, EngineError> {
        let ctx = RequestContext::new();
        let client = self.client.clone();
        let parent = parent_id.to_string();
        let page = retrying_call(&ctx, &self.breaker, || {
            let client = client.clone();
            let parent = parent.clone();
            async move { client.list_accounts_for_parent().parent_id(parent).send().await.map_err(classify_aws_error) }
        })
        .await?;
        Ok(page.accounts().to_vec())
    }

    async fn list_tags(&self, resource_id: &str) -> Result<HashMap<String, String>, EngineError> {
        let ctx = RequestContext::new();
        let client = self.client.clone();
        let resource = resource_id.to_string();
        let page = retrying_call(&ctx, &self.breaker, || {
            let client = client.clone();
            let resource = resource.clone();
            async move { client.list_tags_for_resource().resource_id(resource).send().await.map_err(classify_aws_error) }
        })
        .await?;
        Ok(page.tags().iter().filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string()))).collect())
    }

    /// DFS from `parent_id` (an OU or root), collecting accounts and
    /// descending into child OUs when `recursive` or when we haven't yet
    /// matched the filter's named OU (so a non-recursive filter still
    /// finds the named OU however deep it sits).
    fn walk<'a>(
        &'a self,
        parent_id: String,
        ou_chain: Vec<String>,
        recursive: bool,
        accounts_out: &'a mut Vec<Account>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), EngineError>> + Send + 'a>> {
        Box::pin(async move {
            for raw in self.list_child_accounts(&parent_id).await? {
                let account_id = raw.id().unwrap_or_default().to_string();
                if account_id.is_empty() {
                    continue;
                }
                let tags = self.list_tags(&account_id).await.unwrap_or_default();
                accounts_out.push(Account {
                    account_id,
                    name: raw.name().unwrap_or_default().to_string(),
                    status: map_status(raw.status()),
                    tags,
                    ou_chain: ou_chain.clone(),
                });
            }

            if recursive {
                for (ou_id, ou_name) in self.list_child_ous(&parent_id).await? {
                    let mut next_chain = ou_chain.clone();
                    next_chain.push(ou_name);
                    self.walk(ou_id, next_chain, recursive, accounts_out).await?;
                }
            }
            Ok(())
        })
    }
}

fn map_status(status: Option<&aws_sdk_organizations::types::AccountStatus>) -> AccountStatus {
    use aws_sdk_organizations::types::AccountStatus as Raw;
    match status {
        Some(Raw::Suspended) => AccountStatus::Suspended,
        Some(Raw::PendingClosure) => AccountStatus::PendingClosure,
        _ => AccountStatus::Active,
    }
}

fn cache_key(filter: &OrganizationsFilter) -> String {
    serde_json::to_string(filter).unwrap_or_default()
}

#[async_trait]
impl OrganizationsDiscovery for AwsOrganizationsDiscovery {
    async fn list_accounts(&self, filter: &OrganizationsFilter) -> Result<Vec<Account>, EngineError> {
        let key = cache_key(filter);
        if let Some(cached) = self.cache.get(&key).await {
            self.metrics.incr_counter("aws_cache_hits", &vec![("operation", "list_accounts".to_string())]);
            return Ok(cached);
        }
        self.metrics.incr_counter("aws_cache_misses", &vec![("operation", "list_accounts".to_string())]);

        let roots = self.list_roots().await?;
        let mut all = Vec::new();
        for root in roots {
            self.walk(root.clone(), vec![root], true, &mut all).await?;
        }

        let matched: Vec<Account> = all.into_iter().filter(|a| filter.matches(a)).collect();
        self.cache.put(key, matched.clone()).await;
        Ok(matched)
    }
}
