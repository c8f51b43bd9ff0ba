// secretsync-core/src/application/pipeline.rs
//
// The top-level orchestrator (§2, §4.11, §6, §8): drives Phase M then
// Phase S across the target dependency graph, one wave (topological
// level) at a time, with bounded parallelism within a wave. Mirrors the
// shape of a dbt-style `run_pipeline` — discover, plan, execute layer by
// layer, accumulate results — generalized to the merge/sync two-phase
// model instead of single-phase model materialization.

use crate::application::merge_phase::{flatten_stream, run_merge_phase, StreamTable};
use crate::application::sync_phase::sync_one_target;
use crate::domain::diff::TargetDiff;
use crate::domain::graph::DependencyGraph;
use crate::domain::secret::SecretValue;
use crate::domain::target::{DiscoverySource, TargetSpec};
use crate::error::EngineError;
use crate::infrastructure::config::PipelineConfig;
use crate::metrics::{names, MetricsRegistry};
use crate::ports::{IdentityCenterDiscovery, MergeStore, OrganizationsDiscovery, SourceReader, TargetStoreFactory};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// One target's outcome: either a diff, or the error that stopped it.
#[derive(Debug, Clone)]
pub struct TargetFailure {
    pub target: String,
    pub message: String,
}

/// What a full or partial pipeline run produced, aggregated across every
/// target the run touched.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    pub diffs: Vec<TargetDiff>,
    pub failures: Vec<TargetFailure>,
    pub dry_run: bool,
}

impl PipelineOutcome {
    /// §6/§8 exit codes: 2 on any target failure, 1 if every target
    /// succeeded but at least one reported a non-zero-sum diff, else 0.
    pub fn exit_code(&self) -> i32 {
        if !self.failures.is_empty() {
            return 2;
        }
        if self.diffs.iter().any(|d| !d.summary.is_zero_sum()) {
            return 1;
        }
        0
    }
}

/// Everything the orchestrator needs from the outside world, bundled so
/// the run functions below don't carry an unwieldy parameter list.
pub struct PipelineContext<'a> {
    pub config: &'a PipelineConfig,
    pub sources: &'a [(crate::infrastructure::config::SourceConfig, Arc<dyn SourceReader>)],
    pub merge_store: &'a dyn MergeStore,
    pub target_store_factory: &'a dyn TargetStoreFactory,
    pub organizations_discovery: Option<&'a dyn OrganizationsDiscovery>,
    pub identity_center_discovery: Option<&'a dyn IdentityCenterDiscovery>,
    pub metrics: &'a Arc<MetricsRegistry>,
    pub actor: &'a str,
}

/// Runs Phase M, Phase S, or both, depending on `merge_only`/`sync_only`.
/// When both run, Phase S reads Phase M's freshly-produced `StreamTable`
/// directly rather than round-tripping through `MergeStore` reads.
#[instrument(skip(ctx))]
pub async fn run_pipeline(
    ctx: &PipelineContext<'_>,
    merge_only: bool,
    sync_only: bool,
    target_selector: Option<&[String]>,
    dry_run: bool,
) -> Result<PipelineOutcome, EngineError> {
    let timer = std::time::Instant::now();

    let stream_table = if sync_only {
        StreamTable::new()
    } else {
        run_merge_phase(ctx.sources, ctx.merge_store, ctx.metrics, ctx.actor, ctx.config.worker_pool_size).await?
    };

    let mut outcome = PipelineOutcome {
        dry_run,
        ..Default::default()
    };

    if merge_only {
        ctx.metrics.observe_histogram(
            names::PIPELINE_EXECUTION_DURATION,
            &vec![("phase", "merge".to_string())],
            timer.elapsed().as_secs_f64(),
        );
        return Ok(outcome);
    }

    let all_targets = materialize_targets(ctx).await?;
    let selected = filter_targets(all_targets, target_selector);

    let graph = DependencyGraph::build(selected)?;
    let levels = graph.topological_levels()?;

    let stream_contents: HashMap<String, SecretValue> =
        stream_table.iter().map(|(name, paths)| (name.clone(), flatten_stream(paths))).collect();

    let mut resolved: HashMap<String, SecretValue> = HashMap::new();

    for level in levels {
        ctx.metrics.set_gauge(
            names::PIPELINE_PARALLEL_WORKERS,
            &vec![("phase", "sync".to_string())],
            level.len() as u64,
        );

        // No node in `level` depends on another node in the same level, so
        // every target here reads the same `resolved` snapshot from prior
        // levels; each target's own resolved state is folded back in only
        // after the whole level finishes.
        let results: Vec<Result<(String, TargetDiff, SecretValue), (String, EngineError)>> = stream::iter(level.into_iter())
            .map(|target_name| {
                let graph = &graph;
                let resolved = &resolved;
                let stream_contents = &stream_contents;
                async move {
                    sync_one_target(
                        graph,
                        &target_name,
                        resolved,
                        stream_contents,
                        ctx.target_store_factory,
                        ctx.merge_store,
                        ctx.metrics,
                        ctx.actor,
                        dry_run,
                    )
                    .await
                    .map(|(diff, state)| (target_name.clone(), diff, state))
                    .map_err(|e| (target_name, e))
                }
            })
            .buffer_unordered(ctx.config.worker_pool_size.max(1))
            .collect()
            .await;

        let mut level_failed = false;
        for result in results {
            match result {
                Ok((target_name, diff, state)) => {
                    resolved.insert(target_name, state);
                    outcome.diffs.push(diff);
                }
                Err((target_name, err)) => {
                    warn!(target = %target_name, error = %err, "target sync failed");
                    ctx.metrics.incr_counter(
                        names::PIPELINE_ERRORS,
                        &vec![("phase", "sync".to_string()), ("target", target_name.clone())],
                    );
                    outcome.failures.push(TargetFailure { target: target_name, message: err.to_string() });
                    level_failed = true;
                }
            }
        }

        // §4.11: fail-fast per layer. A failure in one wave does not
        // prevent independent targets in the same wave from finishing,
        // but no later wave starts once any failure has been recorded.
        if level_failed && ctx.config.strict {
            break;
        }
    }

    ctx.metrics.observe_histogram(
        names::PIPELINE_EXECUTION_DURATION,
        &vec![("phase", "full".to_string())],
        timer.elapsed().as_secs_f64(),
    );
    info!(
        targets_synced = outcome.diffs.len(),
        failures = outcome.failures.len(),
        elapsed_ms = timer.elapsed().as_millis() as u64,
        "pipeline run complete"
    );

    Ok(outcome)
}

/// Builds the full target list: every statically-declared `TargetSpec`
/// plus every dynamic generator's per-account expansion (§3, §4.8).
/// Materialized once per run from a single discovery snapshot, so the
/// resulting target set is deterministic for the duration of the run.
async fn materialize_targets(ctx: &PipelineContext<'_>) -> Result<Vec<TargetSpec>, EngineError> {
    let mut targets = ctx.config.targets.clone();

    for generator in &ctx.config.dynamic_targets {
        match &generator.discovery {
            DiscoverySource::Organizations { filter } => {
                let discovery = ctx.organizations_discovery.ok_or_else(|| {
                    EngineError::Fatal(format!(
                        "dynamic target generator '{}' requires organizations discovery, none configured",
                        generator.name
                    ))
                })?;
                let accounts = discovery.list_accounts(filter).await?;
                for account in accounts {
                    let mut subs = HashMap::new();
                    subs.insert("account_id", account.account_id.as_str());
                    subs.insert("account_name", account.name.as_str());
                    targets.push(generator.expand(&subs));
                }
            }
            DiscoverySource::IdentityCenter { filter } => {
                let discovery = ctx.identity_center_discovery.ok_or_else(|| {
                    EngineError::Fatal(format!(
                        "dynamic target generator '{}' requires identity center discovery, none configured",
                        generator.name
                    ))
                })?;
                let assignments = discovery.list_assignments(filter).await?;
                let mut seen_accounts = std::collections::HashSet::new();
                for assignment in assignments {
                    if !seen_accounts.insert(assignment.account_id.clone()) {
                        continue;
                    }
                    let mut subs = HashMap::new();
                    subs.insert("account_id", assignment.account_id.as_str());
                    targets.push(generator.expand(&subs));
                }
            }
        }
    }

    Ok(targets)
}

fn filter_targets(targets: Vec<TargetSpec>, selector: Option<&[String]>) -> Vec<TargetSpec> {
    match selector {
        None => targets,
        Some(names) => targets.into_iter().filter(|t| names.iter().any(|n| n == &t.name)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_is_zero_for_zero_sum_diffs() {
        let outcome = PipelineOutcome {
            diffs: vec![TargetDiff {
                target: "t1".to_string(),
                summary: crate::domain::diff::ChangeSummary::default(),
                changes: Vec::new(),
            }],
            failures: Vec::new(),
            dry_run: false,
        };
        assert_eq!(outcome.exit_code(), 0);
    }

    #[test]
    fn exit_code_is_one_when_changes_exist() {
        let outcome = PipelineOutcome {
            diffs: vec![TargetDiff {
                target: "t1".to_string(),
                summary: crate::domain::diff::ChangeSummary { added: 1, total: 1, ..Default::default() },
                changes: Vec::new(),
            }],
            failures: Vec::new(),
            dry_run: false,
        };
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn exit_code_is_two_on_any_failure() {
        let outcome = PipelineOutcome {
            diffs: Vec::new(),
            failures: vec![TargetFailure { target: "t1".to_string(), message: "boom".to_string() }],
            dry_run: false,
        };
        assert_eq!(outcome.exit_code(), 2);
    }

    #[test]
    fn filter_targets_keeps_only_selected_names() {
        let targets = vec![
            TargetSpec {
                name: "a".to_string(),
                kind: crate::domain::target::TargetKind::AwsSecretsManager,
                region: None,
                role_arn: None,
                endpoint: None,
                inherits: None,
                imports: Vec::new(),
                overrides: serde_json::json!({}),
                filter: None,
            },
            TargetSpec {
                name: "b".to_string(),
                kind: crate::domain::target::TargetKind::AwsSecretsManager,
                region: None,
                role_arn: None,
                endpoint: None,
                inherits: None,
                imports: Vec::new(),
                overrides: serde_json::json!({}),
                filter: None,
            },
        ];
        let filtered = filter_targets(targets, Some(&["a".to_string()]));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "a");
    }
}
