// secretsync-core/src/application/sync_phase.rs
//
// Phase S (§4.11): resolve each target's effective state from its
// dependency graph position, diff it against the target's live state, and
// (unless dry-run) apply the difference. Every applied write is also
// recorded into `merge_store` under a stream named for the target, so a
// later rollback (§4.12) can read back "what was last synced to this
// target at path P".

use crate::domain::diff::{ChangeType, DiffEngine, TargetDiff};
use crate::domain::graph::DependencyGraph;
use crate::domain::secret::{SecretPath, SecretValue, Version};
use crate::domain::target::TargetSpec;
use crate::error::EngineError;
use crate::metrics::{names, MetricsRegistry};
use crate::ports::{MergeStore, TargetStore, TargetStoreFactory, TargetWriteOptions, VersionStore, WriteMeta};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Resolves, diffs, and (unless `dry_run`) applies one target's state.
/// `resolved` carries every already-synced target's resolved state (from
/// earlier dependency-graph levels) so this target's `inherits`/`imports`
/// can reference them; this target's own resolved state is returned
/// alongside its diff so the caller can fold it back in for later levels.
/// Read-only on `resolved`: two targets in the same level never depend on
/// each other, so they can run concurrently against one shared snapshot.
#[instrument(skip(graph, resolved, stream_contents, target_store_factory, merge_store, metrics), fields(target = %target_name))]
#[allow(clippy::too_many_arguments)]
pub async fn sync_one_target(
    graph: &DependencyGraph,
    target_name: &str,
    resolved: &HashMap<String, SecretValue>,
    stream_contents: &HashMap<String, SecretValue>,
    target_store_factory: &dyn TargetStoreFactory,
    merge_store: &dyn MergeStore,
    metrics: &Arc<MetricsRegistry>,
    actor: &str,
    dry_run: bool,
) -> Result<(TargetDiff, SecretValue), EngineError> {
    let target = graph
        .get(target_name)
        .ok_or_else(|| EngineError::Domain(crate::domain::error::DomainError::TargetNotFound(target_name.to_string())))?
        .clone();

    let resolved_state = graph.resolve_target(target_name, resolved, stream_contents)?;

    let desired = scoped_desired_state(&target, &resolved_state)?;
    let target_store = target_store_factory.build(&target).await?;

    let listed = target_store.list(&SecretPath::root()).await?;
    let mut current = HashMap::new();
    let mut current_versions = HashMap::new();
    for entry in listed {
        let value = target_store.read(&entry.path).await?;
        if let Some(version) = entry.current_version {
            current_versions.insert(entry.path.clone(), version);
        }
        current.insert(entry.path, value);
    }

    let changes = DiffEngine::compute(&current, &desired, &current_versions, &HashMap::new());

    if !dry_run {
        apply_changes(&target, target_store.as_ref(), merge_store, &desired, &changes, actor).await?;
    }

    let summary = crate::domain::diff::ChangeSummary::from_changes(&changes);
    metrics.incr_counter(
        names::PIPELINE_TARGETS_PROCESSED,
        &vec![("phase", "sync".to_string()), ("target", target.name.clone())],
    );
    info!(target = %target.name, added = summary.added, removed = summary.removed, modified = summary.modified, "synced target");

    Ok((
        TargetDiff {
            target: target.name.clone(),
            summary,
            changes,
        },
        resolved_state,
    ))
}

/// Flattens `resolved_state` (a JSON object keyed by path string) into a
/// `(SecretPath -> SecretValue)` map, applying the target's path filter
/// (if any).
fn scoped_desired_state(
    target: &TargetSpec,
    resolved_state: &SecretValue,
) -> Result<HashMap<SecretPath, SecretValue>, EngineError> {
    let SecretValue::Object(map) = resolved_state else {
        return Ok(HashMap::new());
    };

    let mut desired = HashMap::new();
    for (path_str, value) in map {
        let path = SecretPath::new(path_str)?;
        if let Some(filter) = &target.filter {
            if !filter.matches(&path) {
                continue;
            }
        }
        desired.insert(path, value.clone());
    }
    Ok(desired)
}

async fn apply_changes(
    target: &TargetSpec,
    target_store: &dyn TargetStore,
    merge_store: &dyn MergeStore,
    desired: &HashMap<SecretPath, SecretValue>,
    changes: &[crate::domain::diff::SecretChange],
    actor: &str,
) -> Result<(), EngineError> {
    let options = TargetWriteOptions {
        skip_unchanged: true,
        no_empty_secrets: true,
    };

    for change in changes {
        match change.change_type {
            ChangeType::Added | ChangeType::Modified => {
                let Some(value) = desired.get(&change.path) else { continue };
                target_store.write(&change.path, value, options).await?;
                let meta = WriteMeta {
                    timestamp: chrono::Utc::now(),
                    actor: actor.to_string(),
                    comment: None,
                };
                merge_store.write_secret(&target.name, &change.path, value, meta).await?;
            }
            ChangeType::Removed => {
                target_store.delete(&change.path).await?;
            }
            ChangeType::Unchanged => {}
        }
    }
    Ok(())
}

/// Reads a prior version of a target's previously-applied state from its
/// `VersionStore`-backed audit trail and re-applies it as the new desired
/// value for that one path (§4.12 rollback). Bypasses dependency
/// resolution entirely: the requested version IS the desired state.
#[instrument(skip(version_store, target_store))]
pub async fn rollback_one_path(
    version_store: &dyn VersionStore,
    target_store: &dyn TargetStore,
    target_name: &str,
    path: &SecretPath,
    version: Version,
) -> Result<Version, EngineError> {
    let value = version_store.read_for_rollback(target_name, path, version).await?;
    target_store.write(path, &value, TargetWriteOptions::default()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::target::TargetKind;
    use async_trait::async_trait;
    use serde_json::json;

    fn target(name: &str) -> TargetSpec {
        TargetSpec {
            name: name.to_string(),
            kind: TargetKind::AwsSecretsManager,
            region: None,
            role_arn: None,
            endpoint: None,
            inherits: None,
            imports: vec!["app".to_string()],
            overrides: json!({}),
            filter: None,
        }
    }

    struct FakeTargetStore {
        current: HashMap<SecretPath, SecretValue>,
    }

    #[async_trait]
    impl TargetStore for FakeTargetStore {
        async fn list(&self, _prefix: &SecretPath) -> Result<Vec<crate::ports::ListedSecret>, EngineError> {
            Ok(self
                .current
                .keys()
                .map(|p| crate::ports::ListedSecret { path: p.clone(), current_version: None })
                .collect())
        }

        async fn read(&self, path: &SecretPath) -> Result<SecretValue, EngineError> {
            Ok(self.current.get(path).cloned().unwrap_or(SecretValue::Null))
        }

        async fn write(&self, _path: &SecretPath, _value: &SecretValue, _options: TargetWriteOptions) -> Result<Version, EngineError> {
            Ok(Version::FIRST)
        }

        async fn delete(&self, _path: &SecretPath) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct FakeFactory {
        current: HashMap<SecretPath, SecretValue>,
    }

    #[async_trait]
    impl TargetStoreFactory for FakeFactory {
        async fn build(&self, _target: &TargetSpec) -> Result<Arc<dyn TargetStore>, EngineError> {
            Ok(Arc::new(FakeTargetStore { current: self.current.clone() }))
        }
    }

    #[derive(Default)]
    struct FakeMergeStore;

    #[async_trait]
    impl MergeStore for FakeMergeStore {
        async fn write_secret(&self, _stream: &str, _path: &SecretPath, _value: &SecretValue, _meta: WriteMeta) -> Result<Version, EngineError> {
            Ok(Version::FIRST)
        }
        async fn read_secret(&self, _stream: &str, _path: &SecretPath) -> Result<(SecretValue, Version), EngineError> {
            unimplemented!()
        }
        async fn list_secrets(&self, _stream: &str) -> Result<Vec<SecretPath>, EngineError> {
            unimplemented!()
        }
        async fn list_versions(&self, _stream: &str, _path: &SecretPath) -> Result<Vec<Version>, EngineError> {
            unimplemented!()
        }
        async fn read_version(&self, _stream: &str, _path: &SecretPath, _version: Version) -> Result<SecretValue, EngineError> {
            unimplemented!()
        }
        async fn prune(&self, _stream: &str, _policy: crate::ports::RetentionPolicy) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn sync_one_target_reports_added_secret() {
        let graph = DependencyGraph::build(vec![target("sm-1")]).unwrap();
        let resolved = HashMap::new();
        let mut streams = HashMap::new();
        streams.insert("app".to_string(), json!({"app/k1": {"v": 1}}));

        let factory = FakeFactory { current: HashMap::new() };
        let merge_store = FakeMergeStore;
        let metrics = Arc::new(MetricsRegistry::new());

        let (diff, resolved_state) = sync_one_target(&graph, "sm-1", &resolved, &streams, &factory, &merge_store, &metrics, "test-actor", false)
            .await
            .expect("sync succeeds");

        assert_eq!(diff.summary.added, 1);
        assert_eq!(resolved_state, json!({"app/k1": {"v": 1}}));
    }

    #[tokio::test]
    async fn dry_run_does_not_suppress_the_diff() {
        let graph = DependencyGraph::build(vec![target("sm-1")]).unwrap();
        let resolved = HashMap::new();
        let mut streams = HashMap::new();
        streams.insert("app".to_string(), json!({"app/k1": {"v": 1}}));

        let factory = FakeFactory { current: HashMap::new() };
        let merge_store = FakeMergeStore;
        let metrics = Arc::new(MetricsRegistry::new());

        let (diff, _) = sync_one_target(&graph, "sm-1", &resolved, &streams, &factory, &merge_store, &metrics, "test-actor", true)
            .await
            .expect("sync succeeds");

        assert_eq!(diff.summary.added, 1);
    }

    #[tokio::test]
    async fn path_filter_excludes_non_matching_secrets() {
        let mut filtered_target = target("sm-1");
        filtered_target.filter = Some(crate::domain::target::TargetPathFilter {
            include: vec!["app/allowed*".to_string()],
            exclude: Vec::new(),
        });
        let graph = DependencyGraph::build(vec![filtered_target]).unwrap();
        let resolved = HashMap::new();
        let mut streams = HashMap::new();
        streams.insert(
            "app".to_string(),
            json!({"app/allowed_key": {"v": 1}, "app/other_key": {"v": 2}}),
        );

        let factory = FakeFactory { current: HashMap::new() };
        let merge_store = FakeMergeStore;
        let metrics = Arc::new(MetricsRegistry::new());

        let (diff, _) = sync_one_target(&graph, "sm-1", &resolved, &streams, &factory, &merge_store, &metrics, "test-actor", true)
            .await
            .expect("sync succeeds");

        assert_eq!(diff.summary.total, 1);
        assert_eq!(diff.changes[0].path, SecretPath::new("app/allowed_key").unwrap());
    }
}
