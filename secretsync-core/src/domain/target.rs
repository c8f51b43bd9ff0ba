// secretsync-core/src/domain/target.rs
//
// TargetSpec, its inheritance/import edges (consumed by
// `domain::graph::DependencyGraph`), path filtering, and the dynamic
// target generators that expand one discovered Account into a concrete
// TargetSpec (§3, §4.8, §4.9). Kept as plain, serde-derived data: the
// generator's template expansion is the only behavior here, everything
// else is consumed by the application layer.

use crate::domain::discovery::glob::glob_match;
use crate::domain::secret::{SecretPath, SecretValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The two sync-target backends this crate implements (§1: "cross-cloud
/// target kinds beyond those listed" is explicitly out of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    AwsSecretsManager,
    VaultKv,
}

/// Include/exclude glob predicates over the paths a target receives out
/// of its resolved desired state. An empty `include` list matches
/// everything; `exclude` always wins over a matching `include`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetPathFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl TargetPathFilter {
    pub fn matches(&self, path: &SecretPath) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| glob_match(p, path.as_str()));
        if !included {
            return false;
        }
        !self.exclude.iter().any(|p| glob_match(p, path.as_str()))
    }
}

/// A statically declared sync destination (§3: TargetSpec). `inherits`
/// names at most one parent target; `imports` names zero or more
/// MergeStreams (or sibling targets, resolved the same way — §4.9).
/// `overrides` always wins over whatever inheritance/imports produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    pub kind: TargetKind,
    /// AWS Secrets Manager region. Unused for `vault_kv`.
    #[serde(default)]
    pub region: Option<String>,
    /// AWS role to assume for cross-account access. Unused for `vault_kv`.
    #[serde(default)]
    pub role_arn: Option<String>,
    /// The Vault KV mount name for `vault_kv` targets (or a backend
    /// address override); unused for `aws_secrets_manager`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub inherits: Option<String>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default = "default_overrides")]
    pub overrides: SecretValue,
    #[serde(default)]
    pub filter: Option<TargetPathFilter>,
}

fn default_overrides() -> SecretValue {
    SecretValue::Object(serde_json::Map::new())
}

/// Where a `DynamicTargetGenerator` gets its Account/assignment set from
/// (§4.8). Materialized once per pipeline run from a single discovery
/// snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DiscoverySource {
    Organizations {
        filter: crate::domain::discovery::OrganizationsFilter,
    },
    IdentityCenter {
        filter: crate::domain::discovery::IdentityCenterFilter,
    },
}

/// Expands each discovered Account (or account assignment) into one
/// concrete `TargetSpec` (§3, §4.8). `name_template`/`role_arn_template`/
/// `endpoint_template` accept `{account_id}`/`{account_name}` placeholders,
/// substituted per §4.9's "materialized once, deterministic" rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicTargetGenerator {
    /// The generator's own logical name, used by `DependencyGraph`
    /// validation bookkeeping — not the name of any expanded target.
    pub name: String,
    pub kind: TargetKind,
    pub discovery: DiscoverySource,
    pub name_template: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub role_arn_template: Option<String>,
    #[serde(default)]
    pub endpoint_template: Option<String>,
    #[serde(default)]
    pub inherits: Option<String>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default = "default_overrides")]
    pub overrides: SecretValue,
    #[serde(default)]
    pub filter: Option<TargetPathFilter>,
}

impl DynamicTargetGenerator {
    pub fn expand(&self, substitutions: &HashMap<&str, &str>) -> TargetSpec {
        TargetSpec {
            name: substitute(&self.name_template, substitutions),
            kind: self.kind,
            region: self.region.clone(),
            role_arn: self.role_arn_template.as_ref().map(|t| substitute(t, substitutions)),
            endpoint: self.endpoint_template.as_ref().map(|t| substitute(t, substitutions)),
            inherits: self.inherits.clone(),
            imports: self.imports.clone(),
            overrides: substitute_value(&self.overrides, substitutions),
            filter: self.filter.clone(),
        }
    }
}

fn substitute(template: &str, substitutions: &HashMap<&str, &str>) -> String {
    let mut out = template.to_string();
    for (key, value) in substitutions {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Applies `substitute` to every string leaf of a JSON-like value, so an
/// `overrides` template can reference `{account_id}` inside nested
/// mappings too.
fn substitute_value(value: &SecretValue, substitutions: &HashMap<&str, &str>) -> SecretValue {
    match value {
        SecretValue::String(s) => SecretValue::String(substitute(s, substitutions)),
        SecretValue::Array(items) => {
            SecretValue::Array(items.iter().map(|v| substitute_value(v, substitutions)).collect())
        }
        SecretValue::Object(map) => {
            SecretValue::Object(map.iter().map(|(k, v)| (k.clone(), substitute_value(v, substitutions))).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::discovery::{FilterJoin, OrganizationsFilter};
    use serde_json::json;

    #[test]
    fn path_filter_empty_include_matches_everything() {
        let filter = TargetPathFilter::default();
        assert!(filter.matches(&SecretPath::new("app/any").unwrap()));
    }

    #[test]
    fn path_filter_exclude_wins_over_include() {
        let filter = TargetPathFilter {
            include: vec!["app/*".to_string()],
            exclude: vec!["app/secret".to_string()],
        };
        assert!(filter.matches(&SecretPath::new("app/other").unwrap()));
        assert!(!filter.matches(&SecretPath::new("app/secret").unwrap()));
    }

    #[test]
    fn path_filter_non_matching_include_excludes() {
        let filter = TargetPathFilter {
            include: vec!["app/allowed*".to_string()],
            exclude: Vec::new(),
        };
        assert!(!filter.matches(&SecretPath::new("app/other").unwrap()));
    }

    #[test]
    fn expand_substitutes_account_id_into_name_and_role_arn() {
        let generator = DynamicTargetGenerator {
            name: "per-account".to_string(),
            kind: TargetKind::AwsSecretsManager,
            discovery: DiscoverySource::Organizations {
                filter: OrganizationsFilter {
                    join: FilterJoin::And,
                    ..Default::default()
                },
            },
            name_template: "sm-{account_id}".to_string(),
            region: Some("us-east-1".to_string()),
            role_arn_template: Some("arn:aws:iam::{account_id}:role/secretsync".to_string()),
            endpoint_template: None,
            inherits: None,
            imports: Vec::new(),
            overrides: json!({"account_name": "{account_name}"}),
            filter: None,
        };

        let mut subs = HashMap::new();
        subs.insert("account_id", "111122223333");
        subs.insert("account_name", "payments-prod");

        let target = generator.expand(&subs);
        assert_eq!(target.name, "sm-111122223333");
        assert_eq!(target.role_arn, Some("arn:aws:iam::111122223333:role/secretsync".to_string()));
        assert_eq!(target.overrides, json!({"account_name": "payments-prod"}));
    }
}
