// secretsync-core/src/domain/secret/merge.rs
//
// Deterministic recursive merge. See spec §4.7 and §9: list+list is an
// APPEND, not a replace — this is intentional and differs from the more
// common "overlay replaces list" convention. There is no `__replace: true`
// escape hatch; the source this crate is modeled on is silent on whether
// one should exist, so none is implemented (spec §9 explicitly says:
// "do NOT guess").

use super::value::SecretValue;
use serde_json::{Map, Value};

/// Whether list-valued keys should be appended (the default) or treated
/// as sets, unioned while preserving first-seen order. The spec calls the
/// latter "set-like (represented as list with unique elements flag in
/// metadata, if provided)" — since `SecretValue` carries no metadata
/// channel, the caller selects this per merge call instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMergeMode {
    #[default]
    Append,
    UnionPreserveOrder,
}

/// Merges `overlay` onto `base`, returning a new value. Pure and total:
/// every pair of JSON values has a defined merge result.
pub fn merge(base: &SecretValue, overlay: &SecretValue) -> SecretValue {
    merge_with_mode(base, overlay, ListMergeMode::Append)
}

pub fn merge_with_mode(base: &SecretValue, overlay: &SecretValue, mode: ListMergeMode) -> SecretValue {
    match (base, overlay) {
        // null on overlay is an explicit clear: overlay always wins here,
        // same as the generic scalar rule, stated separately in the spec
        // because it's easy to special-case by mistake.
        (_, Value::Null) => Value::Null,

        (Value::Object(base_map), Value::Object(overlay_map)) => {
            Value::Object(merge_maps(base_map, overlay_map, mode))
        }

        (Value::Array(base_list), Value::Array(overlay_list)) => match mode {
            ListMergeMode::Append => {
                let mut merged = base_list.clone();
                merged.extend(overlay_list.iter().cloned());
                Value::Array(merged)
            }
            ListMergeMode::UnionPreserveOrder => {
                let mut merged = base_list.clone();
                for item in overlay_list {
                    if !merged.contains(item) {
                        merged.push(item.clone());
                    }
                }
                Value::Array(merged)
            }
        },

        // Type mismatch (e.g. list + mapping) and scalar + anything both
        // resolve the same way: overlay wins.
        (_, overlay_value) => overlay_value.clone(),
    }
}

fn merge_maps(base: &Map<String, Value>, overlay: &Map<String, Value>, mode: ListMergeMode) -> Map<String, Value> {
    let mut result = base.clone();
    for (key, overlay_value) in overlay {
        match result.get(key) {
            Some(base_value) => {
                let merged = merge_with_mode(base_value, overlay_value, mode);
                result.insert(key.clone(), merged);
            }
            None => {
                result.insert(key.clone(), overlay_value.clone());
            }
        }
    }
    result
}

/// Left-folds `merge` over an ordered sequence of sources. The caller is
/// responsible for presenting sources in declaration order — merge is
/// order-dependent (associative, not commutative).
pub fn merge_n<'a>(sources: impl IntoIterator<Item = &'a SecretValue>) -> SecretValue {
    let mut iter = sources.into_iter();
    let Some(first) = iter.next() else {
        return Value::Object(Map::new());
    };
    let mut acc = first.clone();
    for next in iter {
        acc = merge(&acc, next);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_merge_with_empty_object() {
        let x = json!({"a": 1, "b": [1, 2]});
        assert_eq!(merge(&x, &json!({})), x);
        assert_eq!(merge(&json!({}), &x), x);
    }

    #[test]
    fn lists_append_by_default() {
        let base = json!({"keys": ["k1", "k2"]});
        let overlay = json!({"keys": ["k3"]});
        assert_eq!(merge(&base, &overlay), json!({"keys": ["k1", "k2", "k3"]}));
    }

    #[test]
    fn scalar_overlay_wins() {
        assert_eq!(merge(&json!(1), &json!(2)), json!(2));
        assert_eq!(merge(&json!("a"), &json!("b")), json!("b"));
    }

    #[test]
    fn type_mismatch_overlay_wins() {
        assert_eq!(merge(&json!([1, 2]), &json!({"a": 1})), json!({"a": 1}));
        assert_eq!(merge(&json!({"a": 1}), &json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn null_overlay_clears() {
        assert_eq!(merge(&json!({"a": 1}), &json!(null)), json!(null));
        let base = json!({"a": {"b": 1}});
        let overlay = json!({"a": null});
        assert_eq!(merge(&base, &overlay), json!({"a": null}));
    }

    #[test]
    fn recursive_mapping_merge_keeps_keys_from_both_sides() {
        let base = json!({"a": {"x": 1}, "b": 2});
        let overlay = json!({"a": {"y": 2}, "c": 3});
        assert_eq!(merge(&base, &overlay), json!({"a": {"x": 1, "y": 2}, "b": 2, "c": 3}));
    }

    #[test]
    fn two_source_scenario_from_spec() {
        // Source S1: {api:{keys:[k1,k2]}}, S2: {api:{keys:[k3], timeout:30}}
        let s1 = json!({"api": {"keys": ["k1", "k2"]}});
        let s2 = json!({"api": {"keys": ["k3"], "timeout": 30}});
        let merged = merge_n([&s1, &s2]);
        assert_eq!(
            merged,
            json!({"api": {"keys": ["k1", "k2", "k3"], "timeout": 30}})
        );
    }

    #[test]
    fn union_preserve_order_mode_dedups() {
        let base = json!({"tags": ["a", "b"]});
        let overlay = json!({"tags": ["b", "c"]});
        assert_eq!(
            merge_with_mode(&base, &overlay, ListMergeMode::UnionPreserveOrder),
            json!({"tags": ["a", "b", "c"]})
        );
    }

    #[test]
    fn merge_is_associative_for_lists_and_maps() {
        let a = json!({"l": [1], "m": {"x": 1}});
        let b = json!({"l": [2], "m": {"y": 2}});
        let c = json!({"l": [3], "m": {"z": 3}});
        let left = merge(&merge(&a, &b), &c);
        let right = merge(&a, &merge(&b, &c));
        assert_eq!(left, right);
    }

    #[test]
    fn merge_is_not_commutative() {
        let a = json!({"x": 1});
        let b = json!({"x": 2});
        assert_ne!(merge(&a, &b), merge(&b, &a));
    }
}
