// secretsync-core/src/domain/discovery/glob.rs
//
// Minimal glob matcher supporting `*` (any run, including empty) and `?`
// (exactly one char). No character classes, no path-separator semantics —
// account names, OUs, and tag values are flat strings.

pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, 0, &text, 0)
}

fn match_from(pattern: &[char], pi: usize, text: &[char], ti: usize) -> bool {
    match (pattern.get(pi), text.get(ti)) {
        (None, None) => true,
        (Some('*'), _) => {
            match_from(pattern, pi + 1, text, ti) || (ti < text.len() && match_from(pattern, pi, text, ti + 1))
        }
        (Some('?'), Some(_)) => match_from(pattern, pi + 1, text, ti + 1),
        (Some(p), Some(t)) if p == t => match_from(pattern, pi + 1, text, ti + 1),
        _ => false,
    }
}

/// True if `pattern` glob-matches some contiguous substring of `text`,
/// e.g. `glob_contains("prod*", "env=prod-east")` for a `contains`
/// tag-filter operator (§3, §4.8) where `equals` would require the whole
/// value to match.
pub fn glob_contains(pattern: &str, text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    for start in 0..=chars.len() {
        for end in start..=chars.len() {
            let substring: String = chars[start..end].iter().collect();
            if glob_match(pattern, &substring) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(glob_match("payments-prod", "payments-prod"));
        assert!(!glob_match("payments-prod", "payments-dev"));
    }

    #[test]
    fn star_matches_any_run() {
        assert!(glob_match("ou-pay*", "ou-payments"));
        assert!(glob_match("*-prod", "payments-prod"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(glob_match("pr?d", "prod"));
        assert!(!glob_match("pr?d", "prood"));
    }

    #[test]
    fn no_pattern_chars_requires_exact_length() {
        assert!(!glob_match("abc", "abcd"));
    }

    #[test]
    fn contains_matches_a_substring_anywhere() {
        assert!(glob_contains("prod", "env-prod-east"));
        assert!(glob_contains("prod*", "prod-east"));
        assert!(!glob_contains("prod", "staging"));
    }
}
