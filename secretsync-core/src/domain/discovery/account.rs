// secretsync-core/src/domain/discovery/account.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Suspended,
    PendingClosure,
    Closed,
}

impl AccountStatus {
    /// §4.8: Suspended/Closed accounts are excluded unless explicitly
    /// opted into via `OrganizationsFilter::include_inactive`.
    pub fn is_inactive(self) -> bool {
        matches!(self, AccountStatus::Suspended | AccountStatus::Closed)
    }
}

/// A discovered AWS Organizations member account, flattened for matching:
/// `ou_chain` runs from the root down to the account's immediate OU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub name: String,
    pub status: AccountStatus,
    pub tags: HashMap<String, String>,
    pub ou_chain: Vec<String>,
}

/// How the predicates in an `OrganizationsFilter` combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterJoin {
    #[default]
    And,
    Or,
}

/// How a tag predicate's value pattern is matched against an account's
/// tag value (§3, §4.8): `equals` requires the whole value to match the
/// glob pattern, `contains` requires the pattern to match some substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TagMatchOperator {
    #[default]
    Equals,
    Contains,
}

/// One `(key pattern, value pattern, operator)` tag predicate. Both
/// patterns accept glob-style `*` / `?` wildcards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagPredicate {
    pub key_pattern: String,
    pub value_pattern: String,
    #[serde(default)]
    pub operator: TagMatchOperator,
}

impl TagPredicate {
    pub fn new(key_pattern: impl Into<String>, value_pattern: impl Into<String>) -> Self {
        Self {
            key_pattern: key_pattern.into(),
            value_pattern: value_pattern.into(),
            operator: TagMatchOperator::Equals,
        }
    }

    pub fn with_operator(mut self, operator: TagMatchOperator) -> Self {
        self.operator = operator;
        self
    }

    fn matches_value(&self, value: &str) -> bool {
        match self.operator {
            TagMatchOperator::Equals => super::glob::glob_match(&self.value_pattern, value),
            TagMatchOperator::Contains => super::glob::glob_contains(&self.value_pattern, value),
        }
    }
}

/// Matches accounts against OU membership, tag key/value pairs, and status,
/// each side of which accepts glob-style `*` / `?` patterns. Empty
/// predicate lists are vacuously true.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrganizationsFilter {
    #[serde(default)]
    pub ou_patterns: Vec<String>,
    /// `recursive`: whether OU traversal descends into nested OUs below
    /// each `ou_patterns` match, or matches only direct membership.
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub tag_patterns: Vec<TagPredicate>,
    #[serde(default)]
    pub status: Option<AccountStatus>,
    #[serde(default)]
    pub join: FilterJoin,
    /// Accounts excluded regardless of every other predicate.
    #[serde(default)]
    pub exclude_account_ids: Vec<String>,
    /// By default SUSPENDED/CLOSED accounts never match; set this to
    /// opt in (§4.8: "exclude SUSPENDED/CLOSED unless explicitly opted
    /// in").
    #[serde(default)]
    pub include_inactive: bool,
}

impl OrganizationsFilter {
    pub fn matches(&self, account: &Account) -> bool {
        if self.exclude_account_ids.iter().any(|id| id == &account.account_id) {
            return false;
        }
        if account.status.is_inactive() && !self.include_inactive && self.status.is_none() {
            return false;
        }

        let ou_match = self.ou_patterns.is_empty()
            || self
                .ou_patterns
                .iter()
                .any(|pattern| account.ou_chain.iter().any(|ou| super::glob::glob_match(pattern, ou)));

        let tag_match = self.tag_patterns.is_empty()
            || self
                .tag_patterns
                .iter()
                .any(|predicate| account.tags.iter().any(|(key, value)| super::glob::glob_match(&predicate.key_pattern, key) && predicate.matches_value(value)));

        let status_match = match &self.status {
            None => true,
            Some(want) => *want == account.status,
        };

        match self.join {
            FilterJoin::And => ou_match && tag_match && status_match,
            FilterJoin::Or => {
                let has_predicate =
                    !self.ou_patterns.is_empty() || !self.tag_patterns.is_empty() || self.status.is_some();
                !has_predicate || ou_match || tag_match || status_match
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            account_id: "111122223333".into(),
            name: "payments-prod".into(),
            status: AccountStatus::Active,
            tags: HashMap::from([("env".to_string(), "prod".to_string())]),
            ou_chain: vec!["root".into(), "ou-workloads".into(), "ou-payments".into()],
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = OrganizationsFilter::default();
        assert!(filter.matches(&account()));
    }

    #[test]
    fn ou_glob_matches_any_chain_segment() {
        let filter = OrganizationsFilter {
            ou_patterns: vec!["ou-pay*".into()],
            ..Default::default()
        };
        assert!(filter.matches(&account()));
    }

    #[test]
    fn and_join_requires_all_predicates() {
        let filter = OrganizationsFilter {
            ou_patterns: vec!["ou-pay*".into()],
            status: Some(AccountStatus::Suspended),
            join: FilterJoin::And,
            ..Default::default()
        };
        assert!(!filter.matches(&account()));
    }

    #[test]
    fn or_join_requires_only_one() {
        let filter = OrganizationsFilter {
            ou_patterns: vec!["ou-pay*".into()],
            status: Some(AccountStatus::Suspended),
            join: FilterJoin::Or,
            ..Default::default()
        };
        assert!(filter.matches(&account()));
    }

    #[test]
    fn tag_pattern_equals_matches_key_and_whole_value() {
        let filter = OrganizationsFilter {
            tag_patterns: vec![TagPredicate::new("env", "pr?d")],
            ..Default::default()
        };
        assert!(filter.matches(&account()));
    }

    #[test]
    fn tag_pattern_equals_rejects_partial_value_match() {
        let filter = OrganizationsFilter {
            tag_patterns: vec![TagPredicate::new("env", "pro")],
            ..Default::default()
        };
        assert!(!filter.matches(&account()));
    }

    #[test]
    fn tag_pattern_contains_matches_substring_of_value() {
        let mut with_compound_tag = account();
        with_compound_tag.tags.insert("Environment".to_string(), "team-prod-east".to_string());

        let filter = OrganizationsFilter {
            tag_patterns: vec![TagPredicate::new("Environment", "prod*").with_operator(TagMatchOperator::Contains)],
            ..Default::default()
        };
        assert!(filter.matches(&with_compound_tag));

        let equals_filter = OrganizationsFilter {
            tag_patterns: vec![TagPredicate::new("Environment", "prod*")],
            ..Default::default()
        };
        assert!(!equals_filter.matches(&with_compound_tag));
    }

    #[test]
    fn explicit_exclusion_wins_over_every_other_predicate() {
        let filter = OrganizationsFilter {
            exclude_account_ids: vec!["111122223333".into()],
            ..Default::default()
        };
        assert!(!filter.matches(&account()));
    }

    #[test]
    fn suspended_accounts_excluded_by_default() {
        let mut suspended = account();
        suspended.status = AccountStatus::Suspended;
        assert!(!OrganizationsFilter::default().matches(&suspended));

        let opted_in = OrganizationsFilter {
            include_inactive: true,
            ..Default::default()
        };
        assert!(opted_in.matches(&suspended));
    }
}
