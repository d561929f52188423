//! Glob-style pattern matching for `SkipRule::task_spec_patterns` (§3, §4.2).
//!
//! Patterns support `*` (any run of characters) and `?` (any single
//! character); no other glob metacharacters are recognized, matching the
//! "glob-style" wording in §3 rather than a full shell glob.

use crate::model::SkipRule;

/// A (taskSpec, commit) pair is skipped iff at least one rule matches both:
/// some pattern matches taskSpec **and** commit is in the rule's commit set.
/// Linear scan, short-circuits on first match (§4.2).
pub fn matches(rules: &[SkipRule], task_spec: &str, commit: &str) -> bool {
    rules.iter().any(|rule| {
        rule.commits.iter().any(|c| c == commit)
            && rule
                .task_spec_patterns
                .iter()
                .any(|pat| glob_match(pat, task_spec))
    })
}

pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_inner(&p, &t)
}

fn glob_match_inner(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => {
            glob_match_inner(&p[1..], t)
                || (!t.is_empty() && glob_match_inner(p, &t[1..]))
        }
        Some('?') => !t.is_empty() && glob_match_inner(&p[1..], &t[1..]),
        Some(c) => t.first() == Some(c) && glob_match_inner(&p[1..], &t[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        assert!(glob_match("win*", "windows-build"));
        assert!(glob_match("*-build", "windows-build"));
        assert!(!glob_match("win*", "linux-build"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(glob_match("task?", "task1"));
        assert!(!glob_match("task?", "task12"));
    }

    #[test]
    fn rule_requires_both_pattern_and_commit() {
        let rule = SkipRule {
            name: "r1".into(),
            added_by: "me".into(),
            description: "".into(),
            task_spec_patterns: vec!["win*".into()],
            commits: vec!["abc".into()],
            db_modified: None,
        };
        assert!(matches(&[rule.clone()], "windows-build", "abc"));
        assert!(!matches(&[rule.clone()], "windows-build", "def"));
        assert!(!matches(&[rule], "linux-build", "abc"));
    }
}
