// secretsync-core/src/domain/diff/format.rs

use super::engine::{ChangeSummary, ChangeType, SecretChange};
use super::masking::mask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffFormat {
    Human,
    Json,
    GithubActions,
    Compact,
    SideBySide,
}

/// One target's worth of diff output, matching the abridged JSON schema
/// in §6: `{target, summary, changes}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TargetDiff {
    pub target: String,
    pub summary: ChangeSummary,
    pub changes: Vec<SecretChange>,
}

pub struct Formatter;

impl Formatter {
    pub fn render(diff: &TargetDiff, format: DiffFormat, show_values: bool) -> String {
        match format {
            DiffFormat::Human => Self::human(diff, show_values),
            DiffFormat::Json => Self::json(diff),
            DiffFormat::GithubActions => Self::github_actions(diff),
            DiffFormat::Compact => Self::compact(diff),
            DiffFormat::SideBySide => Self::side_by_side(diff, show_values),
        }
    }

    fn human(diff: &TargetDiff, show_values: bool) -> String {
        let mut lines = vec![format!("target: {}", diff.target)];
        for change in &diff.changes {
            let prefix = match change.change_type {
                ChangeType::Added => '+',
                ChangeType::Removed => '-',
                ChangeType::Modified => '~',
                ChangeType::Unchanged => '=',
            };
            let version_annotation = match (change.current_version, change.desired_version) {
                (Some(current), Some(desired)) if current != desired => {
                    format!(" (v{} -> v{})", current.value(), desired.value())
                }
                _ => String::new(),
            };
            lines.push(format!("  {prefix} {}{version_annotation}", change.path));
            if show_values && change.change_type == ChangeType::Modified {
                for key in &change.keys_modified {
                    lines.push(format!("      ~ {key}: {}", mask(key)));
                }
            }
        }
        lines.push(format!(
            "summary: +{} -{} ~{} ={} (total {})",
            diff.summary.added, diff.summary.removed, diff.summary.modified, diff.summary.unchanged, diff.summary.total
        ));
        lines.join("\n")
    }

    fn json(diff: &TargetDiff) -> String {
        serde_json::to_string_pretty(diff).unwrap_or_else(|_| "{}".to_string())
    }

    fn github_actions(diff: &TargetDiff) -> String {
        let mut lines = vec![format!("::group::{}", diff.target)];
        for change in &diff.changes {
            let level = match change.change_type {
                ChangeType::Removed => "warning",
                ChangeType::Modified => "notice",
                _ => "notice",
            };
            lines.push(format!(
                "::{level} title=secretsync/{}::{:?} {}",
                diff.target, change.change_type, change.path
            ));
        }
        lines.push("::endgroup::".to_string());
        lines.push(format!("::set-output name=added::{}", diff.summary.added));
        lines.push(format!("::set-output name=removed::{}", diff.summary.removed));
        lines.push(format!("::set-output name=modified::{}", diff.summary.modified));
        lines.push(format!("::set-output name=total::{}", diff.summary.total));
        lines.join("\n")
    }

    fn compact(diff: &TargetDiff) -> String {
        format!(
            "{}: +{} -{} ~{} ={}",
            diff.target, diff.summary.added, diff.summary.removed, diff.summary.modified, diff.summary.unchanged
        )
    }

    fn side_by_side(diff: &TargetDiff, show_values: bool) -> String {
        let mut lines = vec![format!("{:<40} | {:<40}", "current", "desired")];
        for change in &diff.changes {
            if change.change_type == ChangeType::Unchanged {
                continue;
            }
            let left = change.current_keys.join(", ");
            let right = change.desired_keys.join(", ");
            let left = if show_values { left } else { mask(&left) };
            let right = if show_values { right } else { mask(&right) };
            lines.push(format!("{:<40} | {:<40}", format!("{}: {left}", change.path), right));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::secret::SecretPath;
    use serde_json::json;

    fn sample_diff() -> TargetDiff {
        let changes = vec![SecretChange {
            path: SecretPath::new("a/k1").unwrap(),
            change_type: ChangeType::Added,
            current_version: None,
            desired_version: None,
            keys_added: Vec::new(),
            keys_removed: Vec::new(),
            keys_modified: Vec::new(),
            current_keys: Vec::new(),
            desired_keys: vec!["v".to_string()],
        }];
        TargetDiff {
            target: "sm-prod".to_string(),
            summary: ChangeSummary {
                added: 1,
                removed: 0,
                modified: 0,
                unchanged: 0,
                total: 1,
            },
            changes,
        }
    }

    #[test]
    fn compact_format_is_single_line() {
        let rendered = Formatter::render(&sample_diff(), DiffFormat::Compact, false);
        assert_eq!(rendered.lines().count(), 1);
        assert_eq!(rendered, "sm-prod: +1 -0 ~0 =0");
    }

    #[test]
    fn human_format_prefixes_added_with_plus() {
        let rendered = Formatter::render(&sample_diff(), DiffFormat::Human, false);
        assert!(rendered.contains("+ a/k1"));
    }

    #[test]
    fn json_format_round_trips_summary_counts() {
        let rendered = Formatter::render(&sample_diff(), DiffFormat::Json, false);
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["summary"]["added"], json!(1));
    }

    #[test]
    fn github_actions_format_emits_outputs() {
        let rendered = Formatter::render(&sample_diff(), DiffFormat::GithubActions, false);
        assert!(rendered.contains("::set-output name=added::1"));
    }
}
