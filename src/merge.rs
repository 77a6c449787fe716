//! The recursive merge policy shared by every write path.
//!
//! One pure function, [`merge_value`], carries the three-way case split:
//! tree-on-tree recurses, anything else is decided by the policy. Overwrite
//! is right-biased (the incoming value wins); soft never replaces a value
//! that is already populated.

use crate::tree::Tree;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Standard merge: incoming values win, trees merge key-by-key.
    Overwrite,
    /// Fill-in merge: only vacant or absent slots receive incoming values.
    Soft,
}

/// Merge `incoming` onto an optional existing value.
///
/// - Tree onto tree: recurse per key under the same policy.
/// - Tree onto scalar/list: `Overwrite` replaces outright (no merge into
///   non-trees); `Soft` replaces only a vacant value.
/// - Scalar/list incoming: `Overwrite` replaces; `Soft` replaces only a
///   vacant value.
pub fn merge_value(existing: Option<Value>, incoming: Value, policy: MergePolicy) -> Value {
    match (existing, incoming) {
        (Some(Value::Tree(base)), Value::Tree(overlay)) => {
            Value::Tree(merge_tree(base, overlay, policy))
        }
        (Some(old), new) => match policy {
            MergePolicy::Overwrite => new,
            MergePolicy::Soft => {
                if old.is_vacant() {
                    new
                } else {
                    old
                }
            }
        },
        (None, new) => new,
    }
}

/// Merge `overlay`'s fields into `base`, key by key.
pub fn merge_tree(mut base: Tree, overlay: Tree, policy: MergePolicy) -> Tree {
    for (key, incoming) in overlay {
        let existing = base.remove(&key);
        let merged = merge_value(existing, incoming, policy);
        base.insert_raw(key, merged);
    }
    base
}
