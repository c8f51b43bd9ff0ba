// secretsync-core/src/domain/source/spec.rs

use serde::{Deserialize, Serialize};

/// A declared Vault KV mount to read during Phase M.
///
/// `max_secrets` of `0` means unbounded (the caller's policy may still
/// reject an unbounded source; that decision lives outside this struct).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub mount: String,
    #[serde(default)]
    pub max_secrets: usize,
    #[serde(default)]
    pub queue_compaction_threshold: Option<usize>,
}

impl SourceSpec {
    pub fn new(mount: impl Into<String>, max_secrets: usize) -> Self {
        Self {
            mount: mount.into(),
            max_secrets,
            queue_compaction_threshold: None,
        }
    }

    /// `min(1000, max_secrets/100)` when `max_secrets > 0`, else `1000`.
    pub fn effective_compaction_threshold(&self) -> usize {
        if let Some(explicit) = self.queue_compaction_threshold {
            return explicit;
        }
        if self.max_secrets > 0 {
            std::cmp::min(1000, self.max_secrets / 100)
        } else {
            1000
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_secrets == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_caps_at_1000() {
        let spec = SourceSpec::new("secret/app", 500_000);
        assert_eq!(spec.effective_compaction_threshold(), 1000);
    }

    #[test]
    fn default_threshold_scales_with_small_caps() {
        let spec = SourceSpec::new("secret/app", 10_000);
        assert_eq!(spec.effective_compaction_threshold(), 100);
    }

    #[test]
    fn unbounded_source_defaults_to_1000() {
        let spec = SourceSpec::new("secret/app", 0);
        assert_eq!(spec.effective_compaction_threshold(), 1000);
        assert!(spec.is_unbounded());
    }

    #[test]
    fn explicit_threshold_overrides_default() {
        let mut spec = SourceSpec::new("secret/app", 10_000);
        spec.queue_compaction_threshold = Some(42);
        assert_eq!(spec.effective_compaction_threshold(), 42);
    }
}
