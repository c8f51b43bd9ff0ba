// secretsync-core/src/domain/diff/engine.rs

use crate::domain::secret::{SecretPath, SecretValue, Version};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// The per-path diff produced by [`DiffEngine::compute`]. When `current`
/// and `desired` aren't both mappings, `keys_modified` carries a single
/// sentinel entry `"<value>"` instead of a key-level breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretChange {
    pub path: SecretPath,
    pub change_type: ChangeType,
    pub current_version: Option<Version>,
    pub desired_version: Option<Version>,
    pub keys_added: Vec<String>,
    pub keys_removed: Vec<String>,
    pub keys_modified: Vec<String>,
    pub current_keys: Vec<String>,
    pub desired_keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub total: usize,
}

impl ChangeSummary {
    pub fn from_changes(changes: &[SecretChange]) -> Self {
        let mut summary = ChangeSummary {
            total: changes.len(),
            ..Default::default()
        };
        for change in changes {
            match change.change_type {
                ChangeType::Added => summary.added += 1,
                ChangeType::Removed => summary.removed += 1,
                ChangeType::Modified => summary.modified += 1,
                ChangeType::Unchanged => summary.unchanged += 1,
            }
        }
        summary
    }

    /// A run whose diff has no Added/Removed/Modified entries.
    pub fn is_zero_sum(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.modified == 0
    }
}

const SENTINEL_KEY: &str = "<value>";

pub struct DiffEngine;

impl DiffEngine {
    /// Computes the sorted (by path) list of changes between `current`
    /// (live target state) and `desired` (the resolved merge result).
    /// `current_versions`/`desired_versions` are optional per-path version
    /// maps; absent entries default to no version annotation.
    pub fn compute(
        current: &HashMap<SecretPath, SecretValue>,
        desired: &HashMap<SecretPath, SecretValue>,
        current_versions: &HashMap<SecretPath, Version>,
        desired_versions: &HashMap<SecretPath, Version>,
    ) -> Vec<SecretChange> {
        let mut changes: BTreeMap<SecretPath, SecretChange> = BTreeMap::new();

        for (path, desired_value) in desired {
            let change = match current.get(path) {
                None => SecretChange {
                    path: path.clone(),
                    change_type: ChangeType::Added,
                    current_version: None,
                    desired_version: desired_versions.get(path).copied(),
                    keys_added: Vec::new(),
                    keys_removed: Vec::new(),
                    keys_modified: Vec::new(),
                    current_keys: Vec::new(),
                    desired_keys: object_keys(desired_value),
                },
                Some(current_value) if current_value == desired_value => SecretChange {
                    path: path.clone(),
                    change_type: ChangeType::Unchanged,
                    current_version: current_versions.get(path).copied(),
                    desired_version: desired_versions.get(path).copied(),
                    keys_added: Vec::new(),
                    keys_removed: Vec::new(),
                    keys_modified: Vec::new(),
                    current_keys: object_keys(current_value),
                    desired_keys: object_keys(desired_value),
                },
                Some(current_value) => {
                    let (keys_added, keys_removed, keys_modified) = diff_keys(current_value, desired_value);
                    SecretChange {
                        path: path.clone(),
                        change_type: ChangeType::Modified,
                        current_version: current_versions.get(path).copied(),
                        desired_version: desired_versions.get(path).copied(),
                        keys_added,
                        keys_removed,
                        keys_modified,
                        current_keys: object_keys(current_value),
                        desired_keys: object_keys(desired_value),
                    }
                }
            };
            changes.insert(path.clone(), change);
        }

        for (path, current_value) in current {
            if desired.contains_key(path) {
                continue;
            }
            changes.insert(
                path.clone(),
                SecretChange {
                    path: path.clone(),
                    change_type: ChangeType::Removed,
                    current_version: current_versions.get(path).copied(),
                    desired_version: None,
                    keys_added: Vec::new(),
                    keys_removed: Vec::new(),
                    keys_modified: Vec::new(),
                    current_keys: object_keys(current_value),
                    desired_keys: Vec::new(),
                },
            );
        }

        changes.into_values().collect()
    }
}

fn object_keys(value: &SecretValue) -> Vec<String> {
    match value {
        SecretValue::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// For a Modified pair, key-level added/removed/modified sets. When either
/// side isn't a mapping, emits the `"<value>"` sentinel in `modified`.
fn diff_keys(current: &SecretValue, desired: &SecretValue) -> (Vec<String>, Vec<String>, Vec<String>) {
    let (SecretValue::Object(current_map), SecretValue::Object(desired_map)) = (current, desired) else {
        return (Vec::new(), Vec::new(), vec![SENTINEL_KEY.to_string()]);
    };

    let mut added: Vec<String> = desired_map
        .keys()
        .filter(|k| !current_map.contains_key(*k))
        .cloned()
        .collect();
    let mut removed: Vec<String> = current_map
        .keys()
        .filter(|k| !desired_map.contains_key(*k))
        .cloned()
        .collect();
    let mut modified: Vec<String> = current_map
        .keys()
        .filter(|k| desired_map.contains_key(*k) && current_map.get(*k) != desired_map.get(*k))
        .cloned()
        .collect();

    added.sort();
    removed.sort();
    modified.sort();
    (added, removed, modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> SecretPath {
        SecretPath::new(s).expect("valid path")
    }

    #[test]
    fn scenario_added_secrets_from_spec() {
        let desired = HashMap::from([
            (path("a/k1"), json!({"v": 1})),
            (path("a/k2"), json!({"v": 2})),
            (path("b/k3"), json!({"v": 3})),
        ]);
        let changes = DiffEngine::compute(&HashMap::new(), &desired, &HashMap::new(), &HashMap::new());
        let summary = ChangeSummary::from_changes(&changes);
        assert_eq!(summary.added, 3);
        assert_eq!(summary.total, 3);
        assert!(!summary.is_zero_sum());
    }

    #[test]
    fn diff_round_trip_is_zero_sum() {
        let state = HashMap::from([(path("a/k1"), json!({"v": 1}))]);
        let changes = DiffEngine::compute(&state, &state, &HashMap::new(), &HashMap::new());
        let summary = ChangeSummary::from_changes(&changes);
        assert_eq!((summary.added, summary.removed, summary.modified), (0, 0, 0));
        assert!(summary.is_zero_sum());
    }

    #[test]
    fn removed_path_only_in_current() {
        let current = HashMap::from([(path("a/k1"), json!({"v": 1}))]);
        let changes = DiffEngine::compute(&current, &HashMap::new(), &HashMap::new(), &HashMap::new());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Removed);
    }

    #[test]
    fn versioned_modify_reports_versions_and_modified_keys() {
        let current = HashMap::from([(path("p"), json!({"val": "x"}))]);
        let desired = HashMap::from([(path("p"), json!({"val": "y"}))]);
        let current_versions = HashMap::from([(path("p"), Version::new(1).unwrap())]);
        let desired_versions = HashMap::from([(path("p"), Version::new(2).unwrap())]);

        let changes = DiffEngine::compute(&current, &desired, &current_versions, &desired_versions);
        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.change_type, ChangeType::Modified);
        assert_eq!(change.current_version, Version::new(1));
        assert_eq!(change.desired_version, Version::new(2));
        assert_eq!(change.keys_modified, vec!["val".to_string()]);
    }

    #[test]
    fn type_mismatch_emits_value_sentinel() {
        let current = HashMap::from([(path("p"), json!({"a": 1}))]);
        let desired = HashMap::from([(path("p"), json!("scalar"))]);
        let changes = DiffEngine::compute(&current, &desired, &HashMap::new(), &HashMap::new());
        assert_eq!(changes[0].keys_modified, vec![SENTINEL_KEY.to_string()]);
    }

    #[test]
    fn changes_are_sorted_by_path() {
        let desired = HashMap::from([(path("z/z"), json!(1)), (path("a/a"), json!(1))]);
        let changes = DiffEngine::compute(&HashMap::new(), &desired, &HashMap::new(), &HashMap::new());
        assert_eq!(changes[0].path, path("a/a"));
        assert_eq!(changes[1].path, path("z/z"));
    }
}
