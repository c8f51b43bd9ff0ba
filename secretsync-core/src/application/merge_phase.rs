// secretsync-core/src/application/merge_phase.rs
//
// Phase M (§4.11): for each declared source, list and read every leaf
// secret; where more than one `SourceConfig` shares a stream name, their
// leaf values are deep-merged per path in declaration order. The merged
// result is persisted to MergeStore under that stream so Phase S can read
// it back as an import.

use crate::domain::secret::{merge_n, SecretPath, SecretValue};
use crate::error::EngineError;
use crate::infrastructure::config::SourceConfig;
use crate::metrics::{names, Labels, MetricsRegistry};
use crate::ports::{MergeStore, SourceReader, WriteMeta};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// The per-stream, per-path values Phase M produced, already durably
/// persisted to the `MergeStore`. Keyed first by stream name, then by the
/// leaf path within that stream.
pub type StreamTable = HashMap<String, HashMap<SecretPath, SecretValue>>;

/// One source's listed+read leaves, grouped by path, before the
/// cross-source merge. A source that errors out reports its own name so
/// the caller can attribute the failure. Carries the source's declaration
/// index so contributions can be re-sorted back into config order after
/// the unordered fan-out below.
type SourceContribution = Result<(usize, String, HashMap<SecretPath, SecretValue>), (String, EngineError)>;

#[instrument(skip(sources, merge_store, metrics))]
pub async fn run_merge_phase(
    sources: &[(SourceConfig, Arc<dyn SourceReader>)],
    merge_store: &dyn MergeStore,
    metrics: &Arc<MetricsRegistry>,
    actor: &str,
    worker_pool_size: usize,
) -> Result<StreamTable, EngineError> {
    // Sources read independently and in parallel, bounded by the worker
    // pool (§4.11), so `results` arrives in completion order rather than
    // declaration order. Each contribution carries its source's original
    // index; sorting on it below restores declaration order before the
    // per-path fold, so two sources sharing a stream name merge
    // deterministically regardless of which one happens to finish first
    // (§5, §8: "merge of N sources is order-dependent by config-declaration
    // order").
    let mut results: Vec<SourceContribution> = stream::iter(sources.iter().enumerate())
        .map(|(index, (source, reader))| read_source(index, source, reader.as_ref()))
        .buffer_unordered(worker_pool_size.max(1))
        .collect()
        .await;
    results.sort_by_key(|result| match result {
        Ok((index, _, _)) => *index,
        Err(_) => usize::MAX,
    });

    let mut contributions: HashMap<String, HashMap<SecretPath, Vec<SecretValue>>> = HashMap::new();
    for result in results {
        let (_, stream_name, leaves) = result.map_err(|(stream_name, err)| {
            metrics.incr_counter(
                names::PIPELINE_ERRORS,
                &vec![("phase", "merge".to_string()), ("stream", stream_name.clone())],
            );
            err
        })?;
        let entry = contributions.entry(stream_name.clone()).or_default();
        for (path, value) in leaves {
            entry.entry(path).or_default().push(value);
        }
        metrics.incr_counter(
            names::PIPELINE_TARGETS_PROCESSED,
            &vec![("phase", "merge".to_string()), ("stream", stream_name)],
        );
    }

    let mut table: StreamTable = HashMap::new();
    for (stream, per_path) in contributions {
        let mut merged_paths = HashMap::new();
        for (path, values) in per_path {
            let merged = merge_n(values.iter());
            let meta = WriteMeta {
                timestamp: chrono::Utc::now(),
                actor: actor.to_string(),
                comment: None,
            };
            merge_store.write_secret(&stream, &path, &merged, meta).await?;
            merged_paths.insert(path, merged);
        }
        table.insert(stream, merged_paths);
    }

    Ok(table)
}

async fn read_source(index: usize, source: &SourceConfig, reader: &dyn SourceReader) -> SourceContribution {
    let paths = reader
        .list_paths()
        .await
        .map_err(|e| (source.name.clone(), e))?;
    info!(stream = %source.name, mount = %source.spec.mount, count = paths.len(), "listed source paths");

    let mut leaves = HashMap::new();
    for path in paths {
        let value = reader.read(&path).await.map_err(|e| (source.name.clone(), e))?;
        leaves.insert(path, value);
    }
    Ok((index, source.name.clone(), leaves))
}

/// Flattens one stream's `(path -> value)` map into a single JSON object
/// keyed by path string, the shape `DependencyGraph::resolve_target`
/// expects for `stream_contents` (§4.9).
pub fn flatten_stream(paths: &HashMap<SecretPath, SecretValue>) -> SecretValue {
    let map = paths.iter().map(|(path, value)| (path.as_str().to_string(), value.clone())).collect();
    SecretValue::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::secret::SecretPath;
    use crate::domain::source::SourceSpec;
    use crate::ports::RetentionPolicy;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[test]
    fn flatten_stream_keys_by_path_string() {
        let mut paths = HashMap::new();
        paths.insert(SecretPath::new("a/k1").unwrap(), json!({"v": 1}));
        let flattened = flatten_stream(&paths);
        assert_eq!(flattened, json!({"a/k1": {"v": 1}}));
    }

    struct FakeReader {
        paths: Vec<(SecretPath, SecretValue)>,
        list_delay_ms: u64,
    }

    #[async_trait]
    impl SourceReader for FakeReader {
        async fn list_paths(&self) -> Result<Vec<SecretPath>, EngineError> {
            if self.list_delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.list_delay_ms)).await;
            }
            Ok(self.paths.iter().map(|(p, _)| p.clone()).collect())
        }

        async fn read(&self, path: &SecretPath) -> Result<SecretValue, EngineError> {
            self.paths
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| EngineError::Fatal("not found".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeMergeStore {
        written: Mutex<HashMap<(String, String), SecretValue>>,
    }

    #[async_trait]
    impl MergeStore for FakeMergeStore {
        async fn write_secret(
            &self,
            stream: &str,
            path: &SecretPath,
            value: &SecretValue,
            _meta: WriteMeta,
        ) -> Result<crate::domain::secret::Version, EngineError> {
            self.written
                .lock()
                .await
                .insert((stream.to_string(), path.as_str().to_string()), value.clone());
            Ok(crate::domain::secret::Version::FIRST)
        }

        async fn read_secret(
            &self,
            _stream: &str,
            _path: &SecretPath,
        ) -> Result<(SecretValue, crate::domain::secret::Version), EngineError> {
            unimplemented!()
        }

        async fn list_secrets(&self, _stream: &str) -> Result<Vec<SecretPath>, EngineError> {
            unimplemented!()
        }

        async fn list_versions(
            &self,
            _stream: &str,
            _path: &SecretPath,
        ) -> Result<Vec<crate::domain::secret::Version>, EngineError> {
            unimplemented!()
        }

        async fn read_version(
            &self,
            _stream: &str,
            _path: &SecretPath,
            _version: crate::domain::secret::Version,
        ) -> Result<SecretValue, EngineError> {
            unimplemented!()
        }

        async fn prune(&self, _stream: &str, _policy: RetentionPolicy) -> Result<(), EngineError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn merges_two_sources_sharing_a_stream_name() {
        let reader_a: Arc<dyn SourceReader> = Arc::new(FakeReader {
            paths: vec![(SecretPath::new("k1").unwrap(), json!({"a": 1}))],
            list_delay_ms: 0,
        });
        let reader_b: Arc<dyn SourceReader> = Arc::new(FakeReader {
            paths: vec![(SecretPath::new("k1").unwrap(), json!({"b": 2}))],
            list_delay_ms: 0,
        });
        let sources = vec![
            (
                SourceConfig { name: "app".to_string(), spec: SourceSpec::new("secret/a", 0) },
                reader_a,
            ),
            (
                SourceConfig { name: "app".to_string(), spec: SourceSpec::new("secret/b", 0) },
                reader_b,
            ),
        ];
        let merge_store = FakeMergeStore::default();
        let metrics = Arc::new(MetricsRegistry::new());

        let table = run_merge_phase(&sources, &merge_store, &metrics, "test-actor", 4)
            .await
            .expect("merge phase succeeds");

        let merged = table.get("app").unwrap().get(&SecretPath::new("k1").unwrap()).unwrap();
        assert_eq!(merged, &json!({"a": 1, "b": 2}));
    }

    /// The first-declared source is slower, so `buffer_unordered` finishes
    /// the second-declared source first; the merge must still apply them
    /// in declaration order (first then second), not completion order, so
    /// the overlapping scalar key resolves to the second source's value
    /// every run regardless of which one wins the race.
    #[tokio::test]
    async fn merge_order_follows_declaration_order_not_completion_order() {
        let reader_first: Arc<dyn SourceReader> = Arc::new(FakeReader {
            paths: vec![(SecretPath::new("k1").unwrap(), json!({"env": "first"}))],
            list_delay_ms: 20,
        });
        let reader_second: Arc<dyn SourceReader> = Arc::new(FakeReader {
            paths: vec![(SecretPath::new("k1").unwrap(), json!({"env": "second"}))],
            list_delay_ms: 0,
        });
        let sources = vec![
            (
                SourceConfig { name: "app".to_string(), spec: SourceSpec::new("secret/a", 0) },
                reader_first,
            ),
            (
                SourceConfig { name: "app".to_string(), spec: SourceSpec::new("secret/b", 0) },
                reader_second,
            ),
        ];
        let merge_store = FakeMergeStore::default();
        let metrics = Arc::new(MetricsRegistry::new());

        let table = run_merge_phase(&sources, &merge_store, &metrics, "test-actor", 4)
            .await
            .expect("merge phase succeeds");

        let merged = table.get("app").unwrap().get(&SecretPath::new("k1").unwrap()).unwrap();
        assert_eq!(merged, &json!({"env": "second"}));
    }
}
