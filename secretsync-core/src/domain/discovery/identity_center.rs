// secretsync-core/src/domain/discovery/identity_center.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub arn: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAssignment {
    pub account_id: String,
    pub permission_set: PermissionSet,
    pub principal_id: String,
    pub principal_type: PrincipalType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrincipalType {
    User,
    Group,
}

/// Matches assignments against a permission set name pattern and an
/// optional principal name; used to derive target account sets from
/// Identity Center instead of raw Organizations membership.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityCenterFilter {
    #[serde(default)]
    pub permission_set_pattern: Option<String>,
    #[serde(default)]
    pub principal_id: Option<String>,
}

impl IdentityCenterFilter {
    pub fn matches(&self, assignment: &AccountAssignment) -> bool {
        let permission_set_match = match &self.permission_set_pattern {
            None => true,
            Some(pattern) => super::glob::glob_match(pattern, &assignment.permission_set.name),
        };
        let principal_match = match &self.principal_id {
            None => true,
            Some(id) => id == &assignment.principal_id,
        };
        permission_set_match && principal_match
    }
}

/// User email to account-mapping match, per §4.8: `*` wildcard, otherwise
/// case-insensitive equality. Used by group-based account discovery once
/// group membership has resolved to a set of user emails.
pub fn email_matches(pattern: &str, email: &str) -> bool {
    if pattern.contains('*') || pattern.contains('?') {
        super::glob::glob_match(&pattern.to_lowercase(), &email.to_lowercase())
    } else {
        pattern.eq_ignore_ascii_case(email)
    }
}

#[cfg(test)]
mod email_tests {
    use super::email_matches;

    #[test]
    fn exact_match_is_case_insensitive() {
        assert!(email_matches("Alice@Example.com", "alice@example.com"));
        assert!(!email_matches("alice@example.com", "bob@example.com"));
    }

    #[test]
    fn wildcard_matches_domain() {
        assert!(email_matches("*@example.com", "alice@example.com"));
        assert!(!email_matches("*@example.com", "alice@other.com"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> AccountAssignment {
        AccountAssignment {
            account_id: "111122223333".into(),
            permission_set: PermissionSet {
                arn: "arn:aws:sso:::permissionSet/ssoins-1/ps-1".into(),
                name: "SecretSyncWriter".into(),
                description: None,
            },
            principal_id: "g-1234".into(),
            principal_type: PrincipalType::Group,
        }
    }

    #[test]
    fn pattern_matches_permission_set_name() {
        let filter = IdentityCenterFilter {
            permission_set_pattern: Some("SecretSync*".into()),
            ..Default::default()
        };
        assert!(filter.matches(&assignment()));
    }

    #[test]
    fn principal_id_filters_exact() {
        let filter = IdentityCenterFilter {
            principal_id: Some("g-9999".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&assignment()));
    }
}
