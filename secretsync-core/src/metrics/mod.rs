// secretsync-core/src/metrics/mod.rs
//
// Pure in-memory metrics model. No I/O concerns here: the embedding host
// (the CLI's --metrics-port surface, out of scope for this crate) decides
// how samples are exposed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// A label set, ordered for deterministic keying.
pub type Labels = Vec<(&'static str, String)>;

fn label_key(name: &str, labels: &Labels) -> String {
    let mut sorted = labels.clone();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let mut key = String::from(name);
    for (k, v) in sorted {
        key.push('|');
        key.push_str(k);
        key.push('=');
        key.push_str(&v);
    }
    key
}

/// Exponential histogram buckets, in seconds, matching common Prometheus
/// defaults for latency instrumentation.
const DEFAULT_BUCKETS_SECONDS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

#[derive(Debug, Default)]
struct HistogramState {
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

#[derive(Debug, Default)]
pub struct HistogramSnapshot {
    pub buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

/// Counters, histograms and gauges, all label-keyed and thread-safe.
///
/// There is exactly one `MetricsRegistry` per process; unlike every other
/// piece of shared state in this crate, it is allowed to be a singleton
/// because it has no mutable configuration and every write is an additive,
/// commutative accumulation.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: RwLock<HashMap<String, AtomicU64>>,
    gauges: RwLock<HashMap<String, AtomicU64>>,
    histograms: RwLock<HashMap<String, HistogramState>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_counter(&self, name: &str, labels: &Labels) {
        self.add_counter(name, labels, 1);
    }

    pub fn add_counter(&self, name: &str, labels: &Labels, amount: u64) {
        let key = label_key(name, labels);
        if let Some(existing) = self.counters.read().expect("counters lock poisoned").get(&key) {
            existing.fetch_add(amount, Ordering::Relaxed);
            return;
        }
        let mut guard = self.counters.write().expect("counters lock poisoned");
        guard
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(amount, Ordering::Relaxed);
    }

    pub fn counter_value(&self, name: &str, labels: &Labels) -> u64 {
        let key = label_key(name, labels);
        self.counters
            .read()
            .expect("counters lock poisoned")
            .get(&key)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn set_gauge(&self, name: &str, labels: &Labels, value: u64) {
        let key = label_key(name, labels);
        if let Some(existing) = self.gauges.read().expect("gauges lock poisoned").get(&key) {
            existing.store(value, Ordering::Relaxed);
            return;
        }
        let mut guard = self.gauges.write().expect("gauges lock poisoned");
        guard.entry(key).or_insert_with(|| AtomicU64::new(0)).store(value, Ordering::Relaxed);
    }

    pub fn gauge_value(&self, name: &str, labels: &Labels) -> u64 {
        let key = label_key(name, labels);
        self.gauges
            .read()
            .expect("gauges lock poisoned")
            .get(&key)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn observe_histogram(&self, name: &str, labels: &Labels, value_seconds: f64) {
        let key = label_key(name, labels);
        let mut guard = self.histograms.write().expect("histograms lock poisoned");
        let entry = guard.entry(key).or_insert_with(|| HistogramState {
            bucket_counts: vec![0; DEFAULT_BUCKETS_SECONDS.len() + 1],
            sum: 0.0,
            count: 0,
        });
        entry.sum += value_seconds;
        entry.count += 1;
        let bucket_idx = DEFAULT_BUCKETS_SECONDS
            .iter()
            .position(|b| value_seconds <= *b)
            .unwrap_or(DEFAULT_BUCKETS_SECONDS.len());
        entry.bucket_counts[bucket_idx] += 1;
    }

    pub fn histogram_snapshot(&self, name: &str, labels: &Labels) -> HistogramSnapshot {
        let key = label_key(name, labels);
        let guard = self.histograms.read().expect("histograms lock poisoned");
        match guard.get(&key) {
            None => HistogramSnapshot::default(),
            Some(state) => {
                let mut buckets: Vec<(f64, u64)> = DEFAULT_BUCKETS_SECONDS
                    .iter()
                    .zip(state.bucket_counts.iter())
                    .map(|(b, c)| (*b, *c))
                    .collect();
                buckets.push((f64::INFINITY, *state.bucket_counts.last().unwrap_or(&0)));
                HistogramSnapshot {
                    buckets,
                    sum: state.sum,
                    count: state.count,
                }
            }
        }
    }

    /// Times a synchronous closure and records its duration into the named
    /// histogram, tagging `status` with "ok"/"error" based on the result.
    pub fn time_result<T, E>(
        &self,
        histogram: &str,
        mut labels: Labels,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let start = std::time::Instant::now();
        let result = f();
        let status = if result.is_ok() { "ok" } else { "error" };
        labels.push(("status", status.to_string()));
        self.observe_histogram(histogram, &labels, start.elapsed().as_secs_f64());
        result
    }
}

/// Well-known metric names, so call sites don't hand-type strings that
/// could drift from the spec's naming.
pub mod names {
    pub const VAULT_API_CALL_DURATION: &str = "vault_api_call_duration";
    pub const AWS_API_CALL_DURATION: &str = "aws_api_call_duration";
    pub const S3_OPERATION_DURATION: &str = "s3_operation_duration";
    pub const PIPELINE_EXECUTION_DURATION: &str = "pipeline_execution_duration";

    pub const VAULT_SECRETS_LISTED: &str = "vault_secrets_listed";
    pub const VAULT_ERRORS: &str = "vault_errors";
    pub const AWS_SECRETS_OPERATIONS: &str = "aws_secrets_operations";
    pub const AWS_CACHE_HITS: &str = "aws_cache_hits";
    pub const AWS_CACHE_MISSES: &str = "aws_cache_misses";
    pub const AWS_PAGINATION_PAGES: &str = "aws_pagination_pages";
    pub const PIPELINE_TARGETS_PROCESSED: &str = "pipeline_targets_processed";
    pub const PIPELINE_ERRORS: &str = "pipeline_errors";

    pub const VAULT_QUEUE_SIZE: &str = "vault_queue_size";
    pub const PIPELINE_PARALLEL_WORKERS: &str = "pipeline_parallel_workers";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_label_set() {
        let registry = MetricsRegistry::new();
        let labels_a: Labels = vec![("path", "secret/app".to_string())];
        let labels_b: Labels = vec![("path", "secret/other".to_string())];
        registry.incr_counter("vault_secrets_listed", &labels_a);
        registry.incr_counter("vault_secrets_listed", &labels_a);
        registry.incr_counter("vault_secrets_listed", &labels_b);
        assert_eq!(registry.counter_value("vault_secrets_listed", &labels_a), 2);
        assert_eq!(registry.counter_value("vault_secrets_listed", &labels_b), 1);
    }

    #[test]
    fn histogram_tracks_count_and_sum() {
        let registry = MetricsRegistry::new();
        let labels: Labels = vec![("operation", "list".to_string())];
        registry.observe_histogram(names::VAULT_API_CALL_DURATION, &labels, 0.02);
        registry.observe_histogram(names::VAULT_API_CALL_DURATION, &labels, 0.2);
        let snap = registry.histogram_snapshot(names::VAULT_API_CALL_DURATION, &labels);
        assert_eq!(snap.count, 2);
        assert!((snap.sum - 0.22).abs() < 1e-9);
    }

    #[test]
    fn gauges_overwrite() {
        let registry = MetricsRegistry::new();
        let labels: Labels = vec![("phase", "sync".to_string())];
        registry.set_gauge(names::PIPELINE_PARALLEL_WORKERS, &labels, 3);
        registry.set_gauge(names::PIPELINE_PARALLEL_WORKERS, &labels, 5);
        assert_eq!(registry.gauge_value(names::PIPELINE_PARALLEL_WORKERS, &labels), 5);
    }
}
