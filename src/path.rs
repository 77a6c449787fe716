//! Dotted hierarchical key handling.
//!
//! Every container in this crate addresses values by dotted paths
//! (`"database.pool.size"`). This module owns the splitting, joining and
//! validation rules so that the tree, flat-store and stack variants all
//! agree on them. An empty path always denotes the container itself.

use crate::error::FigtreeError;

/// Split a dotted key at its first separator: `"a.b.c"` → `("a", Some("b.c"))`.
///
/// A key without a dot returns `(key, None)`.
pub fn split_head(key: &str) -> (&str, Option<&str>) {
    match key.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (key, None),
    }
}

/// Join two dotted paths, dropping empty sides and stray separator dots.
///
/// `join("a.b", "c")` → `"a.b.c"`; `join("", "c")` → `"c"`.
pub fn join(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('.');
    let key = key.trim_matches('.');
    if prefix.is_empty() {
        key.to_string()
    } else if key.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Last segment of a dotted path; empty path yields `""`.
pub fn leaf(key: &str) -> &str {
    key.rsplit('.').next().unwrap_or("")
}

/// Whether `name` is a permitted key or branch name.
///
/// Names may only contain `[A-Za-z0-9_]` and `.`; the empty name is allowed
/// (it addresses the container itself).
pub fn is_valid(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Validate a key or branch name, failing with [`FigtreeError::InvalidKeyName`].
pub fn check(name: &str) -> Result<(), FigtreeError> {
    if is_valid(name) {
        Ok(())
    } else {
        Err(FigtreeError::InvalidKeyName(name.to_string()))
    }
}

/// Truncate dotted keys to their first `depth` segments, de-duplicating.
///
/// `depth == 0` returns the keys unchanged. Keys with fewer segments than
/// `depth` are dropped, matching the flat-store `keys(depth)` contract.
pub fn truncate_keys<I>(keys: I, depth: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    if depth == 0 {
        return keys.into_iter().collect();
    }
    let mut seen = Vec::new();
    for key in keys {
        let segments: Vec<&str> = key.split('.').collect();
        if segments.len() < depth {
            continue;
        }
        let truncated = segments[..depth].join(".");
        if !seen.contains(&truncated) {
            seen.push(truncated);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_head_on_dotted() {
        assert_eq!(split_head("a.b.c"), ("a", Some("b.c")));
    }

    #[test]
    fn split_head_on_plain() {
        assert_eq!(split_head("a"), ("a", None));
    }

    #[test]
    fn join_drops_empty_sides() {
        assert_eq!(join("", "c"), "c");
        assert_eq!(join("a.b", ""), "a.b");
        assert_eq!(join("a.b", "c"), "a.b.c");
    }

    #[test]
    fn join_strips_stray_dots() {
        assert_eq!(join(".a.", ".b."), "a.b");
    }

    #[test]
    fn leaf_of_path() {
        assert_eq!(leaf("a.b.c"), "c");
        assert_eq!(leaf("a"), "a");
        assert_eq!(leaf(""), "");
    }

    #[test]
    fn valid_names() {
        assert!(is_valid("Aaz829387asdnvzjkdf__.."));
        assert!(is_valid(""));
        assert!(!is_valid(".#@#*()@(*&#"));
        assert!(!is_valid("a b"));
    }

    #[test]
    fn check_rejects_bad_name() {
        assert!(matches!(
            check("a/b"),
            Err(FigtreeError::InvalidKeyName(_))
        ));
    }

    #[test]
    fn truncate_depth_zero_is_identity() {
        let keys = vec!["a.a".to_string(), "c.b".to_string()];
        assert_eq!(truncate_keys(keys.clone(), 0), keys);
    }

    #[test]
    fn truncate_depth_one_dedups() {
        let keys = vec!["a.a".to_string(), "a.b".to_string(), "c.b".to_string()];
        assert_eq!(truncate_keys(keys, 1), vec!["a", "c"]);
    }

    #[test]
    fn truncate_drops_short_keys() {
        let keys = vec!["a".to_string(), "b.c.d".to_string()];
        assert_eq!(truncate_keys(keys, 2), vec!["b.c"]);
    }
}
