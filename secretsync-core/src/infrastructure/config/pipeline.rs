// secretsync-core/src/infrastructure/config/pipeline.rs
//
// The pipeline-definition YAML: sources, targets, dynamic target
// generators, merge-store backend choice and retention policy (§3
// SUPPLEMENTED: PipelineConfig). Loading follows the same
// discover-main-file / hydrate-satellites / env-override layering as
// `load_project_config`, scaled down to this crate's single-file shape.

use crate::domain::source::SourceSpec;
use crate::domain::target::{DynamicTargetGenerator, TargetSpec};
use crate::infrastructure::error::InfrastructureError;
use crate::ports::RetentionPolicy;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, instrument};

/// A declared Phase-M source, named so targets can `imports:` it as a
/// MergeStream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(flatten)]
    pub spec: SourceSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStoreBackend {
    S3,
    VaultKv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeStoreConfig {
    pub backend: MergeStoreBackend,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub mount: Option<String>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "secretsync".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default)]
    pub keep_last_n: Option<usize>,
    #[serde(default)]
    pub keep_within_days: Option<i64>,
    #[serde(default)]
    pub keep_all: bool,
}

impl RetentionConfig {
    pub fn to_policy(&self) -> RetentionPolicy {
        if self.keep_all {
            return RetentionPolicy::KeepAll;
        }
        if let Some(n) = self.keep_last_n {
            return RetentionPolicy::KeepLastN(n);
        }
        if let Some(days) = self.keep_within_days {
            return RetentionPolicy::KeepWithinDays(days);
        }
        RetentionPolicy::KeepAll
    }
}

fn default_worker_pool_size() -> usize {
    10
}

/// The full pipeline definition a `secretsync` run is configured from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
    #[serde(default)]
    pub dynamic_targets: Vec<DynamicTargetGenerator>,
    pub merge_store: MergeStoreConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default)]
    pub strict: bool,
}

impl PipelineConfig {
    /// Static validation beyond what serde already enforces: every
    /// `imports`/`inherits` reference must name a declared source or
    /// target, `worker_pool_size` must be nonzero. The dependency graph's
    /// own cycle check happens downstream, in the application layer.
    pub fn validate(&self) -> Result<(), InfrastructureError> {
        if self.worker_pool_size == 0 {
            return Err(InfrastructureError::ConfigInvalid(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }

        let source_names: std::collections::HashSet<&str> = self.sources.iter().map(|s| s.name.as_str()).collect();
        let mut target_names: std::collections::HashSet<&str> = self.targets.iter().map(|t| t.name.as_str()).collect();
        target_names.extend(self.dynamic_targets.iter().map(|g| g.name.as_str()));

        for target in &self.targets {
            if let Some(parent) = &target.inherits {
                if !target_names.contains(parent.as_str()) {
                    return Err(InfrastructureError::ConfigInvalid(format!(
                        "target '{}' inherits unknown target '{parent}'",
                        target.name
                    )));
                }
            }
            for import in &target.imports {
                if !source_names.contains(import.as_str()) && !target_names.contains(import.as_str()) {
                    return Err(InfrastructureError::ConfigInvalid(format!(
                        "target '{}' imports unknown stream or target '{import}'",
                        target.name
                    )));
                }
            }
        }

        for generator in &self.dynamic_targets {
            if let Some(parent) = &generator.inherits {
                if !target_names.contains(parent.as_str()) {
                    return Err(InfrastructureError::ConfigInvalid(format!(
                        "dynamic target generator '{}' inherits unknown target '{parent}'",
                        generator.name
                    )));
                }
            }
            for import in &generator.imports {
                if !source_names.contains(import.as_str()) && !target_names.contains(import.as_str()) {
                    return Err(InfrastructureError::ConfigInvalid(format!(
                        "dynamic target generator '{}' imports unknown stream or target '{import}'",
                        generator.name
                    )));
                }
            }
        }

        match self.merge_store.backend {
            MergeStoreBackend::S3 if self.merge_store.bucket.is_none() => {
                return Err(InfrastructureError::ConfigInvalid(
                    "merge_store.backend = s3 requires merge_store.bucket".to_string(),
                ));
            }
            MergeStoreBackend::VaultKv if self.merge_store.mount.is_none() => {
                return Err(InfrastructureError::ConfigInvalid(
                    "merge_store.backend = vault_kv requires merge_store.mount".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }
}

#[instrument(skip(path))]
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig, InfrastructureError> {
    if !path.exists() {
        return Err(InfrastructureError::ConfigNotFound(path.display().to_string()));
    }

    info!(path = %path.display(), "loading pipeline configuration");
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pipeline config at {}", path.display()))
        .map_err(|e| InfrastructureError::ConfigInvalid(e.to_string()))?;

    let mut config: PipelineConfig = serde_yaml::from_str(&content)?;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn apply_env_overrides(config: &mut PipelineConfig) {
    if let Ok(val) = std::env::var("SECRETSYNC_WORKER_POOL_SIZE") {
        if let Ok(parsed) = val.parse() {
            info!(old = config.worker_pool_size, new = parsed, "overriding worker_pool_size via env");
            config.worker_pool_size = parsed;
        }
    }
    if let Ok(val) = std::env::var("SECRETSYNC_STRICT") {
        config.strict = matches!(val.as_str(), "1" | "true" | "yes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> PipelineConfig {
        PipelineConfig {
            sources: vec![SourceConfig {
                name: "app".to_string(),
                spec: SourceSpec::new("secret/app", 0),
            }],
            targets: Vec::new(),
            dynamic_targets: Vec::new(),
            merge_store: MergeStoreConfig {
                backend: MergeStoreBackend::S3,
                bucket: Some("my-bucket".to_string()),
                mount: None,
                prefix: default_prefix(),
            },
            retention: RetentionConfig::default(),
            worker_pool_size: 10,
            strict: false,
        }
    }

    #[test]
    fn validates_minimal_config() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn rejects_zero_worker_pool_size() {
        let mut config = minimal_config();
        config.worker_pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_s3_backend_without_bucket() {
        let mut config = minimal_config();
        config.merge_store.bucket = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_target_importing_unknown_stream() {
        let mut config = minimal_config();
        config.targets.push(TargetSpec {
            name: "t1".to_string(),
            kind: crate::domain::target::TargetKind::AwsSecretsManager,
            region: None,
            role_arn: None,
            endpoint: None,
            inherits: None,
            imports: vec!["nonexistent".to_string()],
            overrides: serde_json::Value::Object(serde_json::Map::new()),
            filter: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn retention_config_prefers_explicit_keep_all() {
        let config = RetentionConfig {
            keep_last_n: Some(5),
            keep_within_days: None,
            keep_all: true,
        };
        assert!(matches!(config.to_policy(), RetentionPolicy::KeepAll));
    }
}
