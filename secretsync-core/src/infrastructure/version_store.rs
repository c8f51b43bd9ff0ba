// secretsync-core/src/infrastructure/version_store.rs
//
// VersionStore layered over any MergeStore (§4.12). Every version a
// MergeStore already keeps doubles as an audit-trail entry here: history
// is just `list_versions` plus a metadata read per version, and rollback
// is `read_version`. The layering adds nothing a MergeStore can't already
// answer except retention-policy translation into `prune` calls.

use crate::domain::secret::{SecretPath, SecretValue, Version};
use crate::error::EngineError;
use crate::ports::{MergeStore, RetentionPolicy, VersionRecord, VersionStore};
use async_trait::async_trait;
use std::sync::Arc;

pub struct LayeredVersionStore<M: MergeStore> {
    merge_store: Arc<M>,
}

impl<M: MergeStore> LayeredVersionStore<M> {
    pub fn new(merge_store: Arc<M>) -> Self {
        Self { merge_store }
    }
}

#[async_trait]
impl<M: MergeStore> VersionStore for LayeredVersionStore<M> {
    async fn history(&self, stream: &str, path: &SecretPath) -> Result<Vec<VersionRecord>, EngineError> {
        let versions = self.merge_store.list_versions(stream, path).await?;
        let mut records = Vec::with_capacity(versions.len());
        let mut parent: Option<Version> = None;
        for version in versions {
            let value = self.merge_store.read_version(stream, path, version).await?;
            let (timestamp, actor) = extract_meta(&value);
            records.push(VersionRecord {
                version,
                timestamp,
                actor,
                parent_version: parent,
            });
            parent = Some(version);
        }
        Ok(records)
    }

    async fn read_for_rollback(&self, stream: &str, path: &SecretPath, version: Version) -> Result<SecretValue, EngineError> {
        let value = self.merge_store.read_version(stream, path, version).await?;
        Ok(unwrap_value(value))
    }

    async fn enforce_retention(&self, stream: &str, policy: RetentionPolicy) -> Result<(), EngineError> {
        self.merge_store.prune(stream, policy).await
    }
}

/// A MergeStore envelope stores `{"value": ..., "meta": {"timestamp":
/// ..., "actor": ...}}`; values that predate meta tracking, or that come
/// from a backend storing the bare value, fall back to now/"unknown".
fn extract_meta(value: &SecretValue) -> (chrono::DateTime<chrono::Utc>, String) {
    let meta = value.get("meta");
    let timestamp = meta
        .and_then(|m| m.get("timestamp"))
        .and_then(|t| t.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc));
    let actor = meta
        .and_then(|m| m.get("actor"))
        .and_then(|a| a.as_str())
        .map(str::to_string);
    (timestamp.unwrap_or_else(chrono::Utc::now), actor.unwrap_or_else(|| "unknown".to_string()))
}

fn unwrap_value(envelope: SecretValue) -> SecretValue {
    envelope.get("value").cloned().unwrap_or(envelope)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ports::WriteMeta;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeMergeStore {
        versions: Mutex<Vec<(SecretValue, Version)>>,
    }

    #[async_trait]
    impl MergeStore for FakeMergeStore {
        async fn write_secret(&self, _stream: &str, _path: &SecretPath, value: &SecretValue, meta: WriteMeta) -> Result<Version, EngineError> {
            let mut guard = self.versions.lock().unwrap();
            let version = Version::new(guard.len() as u64 + 1).unwrap();
            let envelope = serde_json::json!({ "value": value, "meta": meta });
            guard.push((envelope, version));
            Ok(version)
        }

        async fn read_secret(&self, _stream: &str, _path: &SecretPath) -> Result<(SecretValue, Version), EngineError> {
            let guard = self.versions.lock().unwrap();
            let (value, version) = guard.last().unwrap().clone();
            Ok((value, version))
        }

        async fn list_secrets(&self, _stream: &str) -> Result<Vec<SecretPath>, EngineError> {
            Ok(Vec::new())
        }

        async fn list_versions(&self, _stream: &str, _path: &SecretPath) -> Result<Vec<Version>, EngineError> {
            Ok(self.versions.lock().unwrap().iter().map(|(_, v)| *v).collect())
        }

        async fn read_version(&self, _stream: &str, _path: &SecretPath, version: Version) -> Result<SecretValue, EngineError> {
            let guard = self.versions.lock().unwrap();
            guard
                .iter()
                .find(|(_, v)| *v == version)
                .map(|(value, _)| value.clone())
                .ok_or_else(|| EngineError::Fatal("not found".to_string()))
        }

        async fn prune(&self, _stream: &str, _policy: RetentionPolicy) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn history_chains_parent_versions_in_order() {
        let merge_store = Arc::new(FakeMergeStore { versions: Mutex::new(Vec::new()) });
        let path = SecretPath::new("app/api_key").unwrap();
        let meta = WriteMeta {
            timestamp: chrono::Utc::now(),
            actor: "ci".to_string(),
            comment: None,
        };
        merge_store.write_secret("s1", &path, &serde_json::json!("v1"), meta.clone()).await.unwrap();
        merge_store.write_secret("s1", &path, &serde_json::json!("v2"), meta).await.unwrap();

        let store = LayeredVersionStore::new(merge_store);
        let history = store.history("s1", &path).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].parent_version, None);
        assert_eq!(history[1].parent_version, Some(Version::FIRST));
    }

    #[tokio::test]
    async fn rollback_unwraps_the_value_envelope() {
        let merge_store = Arc::new(FakeMergeStore { versions: Mutex::new(Vec::new()) });
        let path = SecretPath::new("app/api_key").unwrap();
        let meta = WriteMeta {
            timestamp: chrono::Utc::now(),
            actor: "ci".to_string(),
            comment: None,
        };
        merge_store.write_secret("s1", &path, &serde_json::json!({"k": "v"}), meta).await.unwrap();

        let store = LayeredVersionStore::new(merge_store);
        let rolled_back = store.read_for_rollback("s1", &path, Version::FIRST).await.unwrap();
        assert_eq!(rolled_back, serde_json::json!({"k": "v"}));
    }
}
