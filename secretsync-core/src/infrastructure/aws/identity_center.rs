// secretsync-core/src/infrastructure/aws/identity_center.rs

use crate::context::RequestContext;
use crate::domain::discovery::{email_matches, AccountAssignment, IdentityCenterFilter, PermissionSet, PrincipalType};
use crate::error::EngineError;
use crate::infrastructure::aws::classify_aws_error;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::resilience::{retrying_call, CircuitBreaker, TtlCache};
use crate::metrics::MetricsRegistry;
use crate::ports::IdentityCenterDiscovery;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const DEFAULT_TTL: Duration = Duration::from_secs(1800);

/// Identity Center permission-set / account-assignment enumeration
/// (§4.8). The instance ARN and identity-store id are auto-discovered via
/// `ListInstances` on first use if not configured. Permission sets are
/// cached per-ARN with a 30-minute default TTL.
pub struct AwsIdentityCenterDiscovery {
    sso: aws_sdk_ssoadmin::Client,
    identitystore: aws_sdk_identitystore::Client,
    instance_arn: RwLock<Option<String>>,
    identity_store_id: RwLock<Option<String>>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsRegistry>,
    permission_set_cache: TtlCache<String, PermissionSet>,
}

impl AwsIdentityCenterDiscovery {
    pub fn new(
        sso: aws_sdk_ssoadmin::Client,
        identitystore: aws_sdk_identitystore::Client,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            sso,
            identitystore,
            instance_arn: RwLock::new(None),
            identity_store_id: RwLock::new(None),
            breaker,
            metrics,
            permission_set_cache: TtlCache::new(DEFAULT_TTL),
        }
    }

    pub fn with_instance(mut self, instance_arn: impl Into<String>, identity_store_id: impl Into<String>) -> Self {
        self.instance_arn = RwLock::new(Some(instance_arn.into()));
        self.identity_store_id = RwLock::new(Some(identity_store_id.into()));
        self
    }

    async fn instance_and_store(&self) -> Result<(String, String), EngineError> {
        if let (Some(instance), Some(store)) = (self.instance_arn.read().await.clone(), self.identity_store_id.read().await.clone()) {
            return Ok((instance, store));
        }

        let ctx = RequestContext::new();
        let sso = self.sso.clone();
        let page = retrying_call(&ctx, &self.breaker, || {
            let sso = sso.clone();
            async move { sso.list_instances().send().await.map_err(classify_aws_error) }
        })
        .await?;

        let instance = page.instances().first().ok_or_else(|| {
            EngineError::Infrastructure(InfrastructureError::Aws("no Identity Center instance found".to_string()))
        })?;
        let instance_arn = instance.instance_arn().unwrap_or_default().to_string();
        let identity_store_id = instance.identity_store_id().unwrap_or_default().to_string();

        *self.instance_arn.write().await = Some(instance_arn.clone());
        *self.identity_store_id.write().await = Some(identity_store_id.clone());
        Ok((instance_arn, identity_store_id))
    }

    /// Resolves a group's DisplayName to its member emails, for
    /// group-based account discovery (§4.8). Not part of the port
    /// trait: it feeds target-expansion templates, not account/assignment
    /// enumeration directly.
    pub async fn resolve_group_member_emails(&self, display_name_pattern: &str) -> Result<Vec<String>, EngineError> {
        let ctx = RequestContext::new();
        let (_, identity_store_id) = self.instance_and_store().await?;
        let store = self.identitystore.clone();
        let store_id = identity_store_id.clone();

        let groups_page = retrying_call(&ctx, &self.breaker, || {
            let store = store.clone();
            let store_id = store_id.clone();
            async move { store.list_groups().identity_store_id(&store_id).send().await.map_err(classify_aws_error) }
        })
        .await?;

        let mut emails = Vec::new();
        for group in groups_page.groups() {
            let Some(display_name) = group.display_name() else { continue };
            if !email_matches(display_name_pattern, display_name) && display_name_pattern != "*" {
                continue;
            }
            let Some(group_id) = group.group_id() else { continue };

            let store = self.identitystore.clone();
            let store_id = identity_store_id.clone();
            let group_id = group_id.to_string();
            let memberships = retrying_call(&ctx, &self.breaker, || {
                let store = store.clone();
                let store_id = store_id.clone();
                let group_id = group_id.clone();
                async move {
                    store
                        .list_group_memberships()
                        .identity_store_id(&store_id)
                        .group_id(group_id)
                        .send()
                        .await
                        .map_err(classify_aws_error)
                }
            })
            .await?;

            for membership in memberships.group_memberships() {
                let Some(member_id) = membership.member_id() else { continue };
                let Some(user_id) = member_id.as_user_id().ok() else { continue };
                let store = self.identitystore.clone();
                let store_id = identity_store_id.clone();
                let user_id = user_id.to_string();
                let user = retrying_call(&ctx, &self.breaker, || {
                    let store = store.clone();
                    let store_id = store_id.clone();
                    let user_id = user_id.clone();
                    async move {
                        store
                            .describe_user()
                            .identity_store_id(&store_id)
                            .user_id(user_id)
                            .send()
                            .await
                            .map_err(classify_aws_error)
                    }
                })
                .await?;
                if let Some(email) = user.emails().iter().find_map(|e| e.value()) {
                    emails.push(email.to_string());
                }
            }
        }
        Ok(emails)
    }
}

#[async_trait]
impl IdentityCenterDiscovery for AwsIdentityCenterDiscovery {
    async fn list_permission_sets(&self) -> Result<Vec<PermissionSet>, EngineError> {
        let ctx = RequestContext::new();
        let (instance_arn, _) = self.instance_and_store().await?;
        let sso = self.sso.clone();
        let instance = instance_arn.clone();
        let page = retrying_call(&ctx, &self.breaker, || {
            let sso = sso.clone();
            let instance = instance.clone();
            async move { sso.list_permission_sets().instance_arn(instance).send().await.map_err(classify_aws_error) }
        })
        .await?;

        let mut result = Vec::new();
        for arn in page.permission_sets() {
            if let Some(cached) = self.permission_set_cache.get(&arn.to_string()).await {
                result.push(cached);
                continue;
            }
            let sso = self.sso.clone();
            let instance = instance_arn.clone();
            let arn_owned = arn.to_string();
            let described = retrying_call(&ctx, &self.breaker, || {
                let sso = sso.clone();
                let instance = instance.clone();
                let arn_owned = arn_owned.clone();
                async move {
                    sso.describe_permission_set()
                        .instance_arn(instance)
                        .permission_set_arn(arn_owned)
                        .send()
                        .await
                        .map_err(classify_aws_error)
                }
            })
            .await?;
            let Some(details) = described.permission_set() else { continue };
            let permission_set = PermissionSet {
                arn: details.permission_set_arn().unwrap_or(arn).to_string(),
                name: details.name().unwrap_or_default().to_string(),
                description: details.description().map(str::to_string),
            };
            self.permission_set_cache.put(arn.to_string(), permission_set.clone()).await;
            result.push(permission_set);
        }
        Ok(result)
    }

    async fn list_assignments(&self, filter: &IdentityCenterFilter) -> Result<Vec<AccountAssignment>, EngineError> {
        let ctx = RequestContext::new();
        let (instance_arn, _) = self.instance_and_store().await?;
        let permission_sets = self.list_permission_sets().await?;
        let mut assignments = Vec::new();

        for permission_set in permission_sets {
            if let Some(pattern) = &filter.permission_set_pattern {
                if !crate::domain::discovery::glob::glob_match(pattern, &permission_set.name) {
                    continue;
                }
            }

            let sso = self.sso.clone();
            let instance = instance_arn.clone();
            let arn = permission_set.arn.clone();
            let accounts_page = retrying_call(&ctx, &self.breaker, || {
                let sso = sso.clone();
                let instance = instance.clone();
                let arn = arn.clone();
                async move {
                    sso.list_accounts_for_provisioned_permission_set()
                        .instance_arn(instance)
                        .permission_set_arn(arn)
                        .send()
                        .await
                        .map_err(classify_aws_error)
                }
            })
            .await?;

            for account_id in accounts_page.account_ids() {
                let sso = self.sso.clone();
                let instance = instance_arn.clone();
                let arn = permission_set.arn.clone();
                let account_id = account_id.to_string();
                let account_id_for_assignment = account_id.clone();
                let assignments_page = retrying_call(&ctx, &self.breaker, || {
                    let sso = sso.clone();
                    let instance = instance.clone();
                    let arn = arn.clone();
                    let account_id = account_id.clone();
                    async move {
                        sso.list_account_assignments()
                            .instance_arn(instance)
                            .account_id(account_id)
                            .permission_set_arn(arn)
                            .send()
                            .await
                            .map_err(classify_aws_error)
                    }
                })
                .await?;

                for entry in assignments_page.account_assignments() {
                    let Some(principal_id) = entry.principal_id() else { continue };
                    let principal_type = match entry.principal_type().map(|t| t.as_str()) {
                        Some("GROUP") => PrincipalType::Group,
                        _ => PrincipalType::User,
                    };
                    let assignment = AccountAssignment {
                        account_id: account_id_for_assignment.clone(),
                        permission_set: permission_set.clone(),
                        principal_id: principal_id.to_string(),
                        principal_type,
                    };
                    if filter.matches(&assignment) {
                        assignments.push(assignment);
                    }
                }
            }
        }
        Ok(assignments)
    }
}
