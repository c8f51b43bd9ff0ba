// secretsync-core/src/ports/credentials.rs

use crate::error::EngineError;
use crate::infrastructure::error::InfrastructureError;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials as AwsCredentials;
use aws_sdk_sts::Client as StsClient;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The opaque credential boundary (§1, §6): the engine never reads
/// credential material from logs and never writes it to disk, so this
/// trait is the only seam through which Vault tokens and AWS session
/// credentials enter the system. Authentication mechanics (AppRole, role
/// assumption, OIDC, IRSA) are out of scope; implementations own them.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn vault_token(&self) -> Result<String, EngineError>;

    async fn aws_credentials(&self, role_arn: Option<&str>) -> Result<AwsCredentials, EngineError>;
}

/// A fixed-credential implementation for tests and local/CI runs where
/// role assumption and token renewal aren't exercised.
pub struct StaticCredentialProvider {
    vault_token: String,
    aws_credentials: AwsCredentials,
}

impl StaticCredentialProvider {
    pub fn new(vault_token: impl Into<String>, aws_credentials: AwsCredentials) -> Self {
        Self {
            vault_token: vault_token.into(),
            aws_credentials,
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn vault_token(&self) -> Result<String, EngineError> {
        Ok(self.vault_token.clone())
    }

    async fn aws_credentials(&self, _role_arn: Option<&str>) -> Result<AwsCredentials, EngineError> {
        Ok(self.aws_credentials.clone())
    }
}

/// Name of the environment variable `EnvCredentialProvider` reads the
/// Vault token from. Kept as a named constant rather than inlined so the
/// CLI's `--help` output and this implementation can't drift apart.
pub const VAULT_TOKEN_ENV_VAR: &str = "SECRETSYNC_VAULT_TOKEN";

/// One cached assumed-role session, re-used until it's within
/// `ASSUME_ROLE_REFRESH_SKEW` of expiring.
struct CachedSession {
    credentials: AwsCredentials,
}

/// Production `CredentialProvider`: the Vault token comes from
/// `SECRETSYNC_VAULT_TOKEN`, AWS credentials from the ambient chain
/// (environment, shared config, IMDS/IRSA) via `aws_config`, optionally
/// assumed into `role_arn` through STS when a target declares one.
/// Assumed-role sessions are cached per ARN so a pipeline run with many
/// targets sharing a role doesn't re-assume it on every `TargetStore`
/// construction.
pub struct EnvCredentialProvider {
    base: AwsCredentials,
    sts: StsClient,
    session_name: String,
    cache: RwLock<std::collections::HashMap<String, CachedSession>>,
}

impl EnvCredentialProvider {
    /// Builds from the ambient AWS config (region + base credentials
    /// resolved the way `aws_config::load_from_env` always does: env vars,
    /// shared config/credentials files, then IMDS/IRSA).
    pub async fn from_env() -> Result<Self, EngineError> {
        let region_provider = RegionProviderChain::default_provider().or_else("us-east-1");
        let config = aws_config::from_env().region(region_provider).load().await;

        let base = config
            .credentials_provider()
            .ok_or_else(|| {
                EngineError::Infrastructure(InfrastructureError::AuthFailed(
                    "no AWS credentials provider resolved from the environment".to_string(),
                ))
            })?
            .provide_credentials()
            .await
            .map_err(|e| EngineError::Infrastructure(InfrastructureError::AuthFailed(e.to_string())))?;

        Ok(Self {
            base,
            sts: StsClient::new(&config),
            session_name: "secretsync".to_string(),
            cache: RwLock::new(std::collections::HashMap::new()),
        })
    }

    async fn assume(&self, role_arn: &str) -> Result<AwsCredentials, EngineError> {
        if let Some(cached) = self.cache.read().await.get(role_arn) {
            if !is_near_expiry(&cached.credentials) {
                return Ok(cached.credentials.clone());
            }
        }

        let output = self
            .sts
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(&self.session_name)
            .send()
            .await
            .map_err(|e| EngineError::Infrastructure(InfrastructureError::AuthFailed(e.to_string())))?;

        let creds = output
            .credentials()
            .ok_or_else(|| EngineError::Infrastructure(InfrastructureError::AuthFailed(format!("sts assume-role for {role_arn} returned no credentials"))))?;

        let expiry = std::time::SystemTime::try_from(*creds.expiration()).ok();
        let assumed = AwsCredentials::new(
            creds.access_key_id(),
            creds.secret_access_key(),
            Some(creds.session_token().to_string()),
            expiry,
            "secretsync-assume-role",
        );

        self.cache.write().await.insert(
            role_arn.to_string(),
            CachedSession {
                credentials: assumed.clone(),
            },
        );
        Ok(assumed)
    }
}

/// STS sessions are refreshed once fewer than this much slack remains
/// before expiry, so a long-running pipeline never hands a `TargetStore`
/// credentials that expire mid-call.
const ASSUME_ROLE_REFRESH_SKEW: std::time::Duration = std::time::Duration::from_secs(120);

fn is_near_expiry(credentials: &AwsCredentials) -> bool {
    match credentials.expiry() {
        Some(expiry) => expiry
            .duration_since(std::time::SystemTime::now())
            .map(|remaining| remaining < ASSUME_ROLE_REFRESH_SKEW)
            .unwrap_or(true),
        None => false,
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn vault_token(&self) -> Result<String, EngineError> {
        std::env::var(VAULT_TOKEN_ENV_VAR).map_err(|_| {
            EngineError::Infrastructure(InfrastructureError::AuthFailed(format!(
                "{VAULT_TOKEN_ENV_VAR} is not set"
            )))
        })
    }

    async fn aws_credentials(&self, role_arn: Option<&str>) -> Result<AwsCredentials, EngineError> {
        match role_arn {
            Some(arn) => self.assume(arn).await,
            None => Ok(self.base.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn is_near_expiry_treats_missing_expiry_as_never_near() {
        let creds = AwsCredentials::new("AKIA", "secret", None, None, "test");
        assert!(!is_near_expiry(&creds));
    }

    #[test]
    fn is_near_expiry_flags_credentials_expiring_within_the_skew() {
        let soon = std::time::SystemTime::now() + std::time::Duration::from_secs(30);
        let creds = AwsCredentials::new("AKIA", "secret", None, Some(soon), "test");
        assert!(is_near_expiry(&creds));
    }

    #[test]
    fn is_near_expiry_leaves_comfortably_valid_credentials_alone() {
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(3600);
        let creds = AwsCredentials::new("AKIA", "secret", None, Some(later), "test");
        assert!(!is_near_expiry(&creds));
    }

    #[tokio::test]
    async fn static_provider_returns_fixed_token() {
        let provider = StaticCredentialProvider::new(
            "s.fixed-token",
            AwsCredentials::new("AKIA", "secret", None, None, "test"),
        );
        assert_eq!(provider.vault_token().await.unwrap(), "s.fixed-token");
    }
}
