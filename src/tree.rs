//! The nested configuration container.
//!
//! A [`Tree`] maps field names to [`Value`]s, where a value may itself be a
//! tree. Reads auto-vivify: asking for an absent field materializes an empty
//! branch in place, so `tree.branch_mut("server.http")` always succeeds on
//! fresh trees and populating deep structures needs no ceremony. Callers that
//! need to distinguish "exists" from "materialize" use the strict accessors.
//!
//! Fields whose name starts with `_` are private: they are kept in memory and
//! visible to [`simplify`](Tree::simplify), but excluded from
//! [`export`](Tree::export) and therefore from anything serialized. A field
//! named `_private` may hold a list of additional field names to exclude;
//! each tree consults only its own `_private` list, not its ancestors'.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FigtreeError;
use crate::merge::{MergePolicy, merge_tree, merge_value};
use crate::path;
use crate::value::{Value, yaml_key_to_string};

/// Name prefix marking a field as private.
pub const PRIVATE_PREFIX: char = '_';

/// Field holding the per-tree list of additional private field names.
const PRIVATE_LIST_FIELD: &str = "_private";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree {
    fields: BTreeMap<String, Value>,
}

impl Tree {
    pub fn new() -> Self {
        Tree::default()
    }

    /// Build a tree from parsed document data.
    ///
    /// Every nested mapping becomes a sub-tree, including mappings inside
    /// sequences.
    pub fn from_mapping(mapping: serde_yaml::Mapping) -> Result<Self, FigtreeError> {
        let mut tree = Tree::new();
        for (key, value) in mapping {
            let name = yaml_key_to_string(&key)?;
            tree.fields.insert(name, Value::from_yaml(value)?);
        }
        Ok(tree)
    }

    /// Build a tree from document text.
    ///
    /// Fails with [`FigtreeError::InvalidSourceType`] when the text does not
    /// parse or does not describe a mapping.
    pub fn parse(text: &str) -> Result<Self, FigtreeError> {
        let parsed: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| FigtreeError::InvalidSourceType(e.to_string()))?;
        match parsed {
            serde_yaml::Value::Mapping(mapping) => Tree::from_mapping(mapping),
            serde_yaml::Value::Null => Ok(Tree::new()),
            other => Err(FigtreeError::InvalidSourceType(format!(
                "document is not a mapping: {other:?}"
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Whether a dotted path resolves to a stored value, without vivifying.
    pub fn contains_path(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Fetch a field, materializing an empty branch when absent. Never fails.
    pub fn get_field(&mut self, name: &str) -> &mut Value {
        self.fields
            .entry(name.to_string())
            .or_insert_with(|| Value::Tree(Tree::new()))
    }

    /// Fetch a field without vivifying.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Strict fetch: absent fields fail with [`FigtreeError::KeyNotFound`].
    pub fn field_strict(&self, name: &str) -> Result<&Value, FigtreeError> {
        self.fields
            .get(name)
            .ok_or_else(|| FigtreeError::KeyNotFound(name.to_string()))
    }

    /// Store a value under a single field name, applying merge semantics:
    /// a tree value merges into an existing tree, everything else replaces.
    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) -> Result<(), FigtreeError> {
        path::check(name)?;
        let existing = self.fields.remove(name);
        let merged = merge_value(existing, value.into(), MergePolicy::Overwrite);
        self.fields.insert(name.to_string(), merged);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub(crate) fn insert_raw(&mut self, name: String, value: Value) {
        self.fields.insert(name, value);
    }

    /// Resolve a dotted path without vivifying. An empty path names the tree
    /// itself, which has no value representation, so it yields `None`.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        if key.is_empty() {
            return None;
        }
        let (head, tail) = path::split_head(key);
        let value = self.fields.get(head)?;
        match tail {
            None => Some(value),
            Some(rest) => value.as_tree()?.lookup(rest),
        }
    }

    /// Walk a dotted path of branches, materializing empty ones along the
    /// way. The empty path is the tree itself.
    ///
    /// Descending through an existing non-tree value fails with
    /// [`FigtreeError::KeyNotFound`]: a scalar cannot be entered, and
    /// vivification never destroys stored data.
    pub fn branch_mut(&mut self, key: &str) -> Result<&mut Tree, FigtreeError> {
        if key.is_empty() {
            return Ok(self);
        }
        let (head, tail) = path::split_head(key);
        let value = self.get_field(head);
        let subtree = value
            .as_tree_mut()
            .ok_or_else(|| FigtreeError::KeyNotFound(key.to_string()))?;
        match tail {
            None => Ok(subtree),
            Some(rest) => subtree.branch_mut(rest),
        }
    }

    /// Resolve a dotted path, vivifying absent branches, and return the
    /// stored value. Requires a non-empty path.
    pub fn resolve_path(&mut self, key: &str) -> Result<&mut Value, FigtreeError> {
        if key.is_empty() {
            return Err(FigtreeError::KeyNotFound(String::new()));
        }
        let (head, tail) = path::split_head(key);
        match tail {
            None => Ok(self.get_field(head)),
            Some(rest) => {
                let subtree = self
                    .get_field(head)
                    .as_tree_mut()
                    .ok_or_else(|| FigtreeError::KeyNotFound(key.to_string()))?;
                subtree.resolve_path(rest)
            }
        }
    }

    /// Assign a value at a dotted path, vivifying intermediate branches.
    ///
    /// The leaf assignment follows [`set_field`](Tree::set_field) merge
    /// semantics. An empty path accepts only a tree value, which merges into
    /// the root.
    pub fn assign_path(&mut self, key: &str, value: impl Into<Value>) -> Result<(), FigtreeError> {
        let value = value.into();
        if key.is_empty() {
            return match value {
                Value::Tree(source) => {
                    self.merge(source);
                    Ok(())
                }
                other => Err(FigtreeError::InvalidSourceType(format!(
                    "cannot assign a non-mapping at the tree root: {other:?}"
                ))),
            };
        }
        path::check(key)?;
        match key.rsplit_once('.') {
            None => self.set_field(key, value),
            Some((parent, leaf)) => self.branch_mut(parent)?.set_field(leaf, value),
        }
    }

    /// Merge another tree's fields into this one (incoming values win).
    pub fn merge(&mut self, source: Tree) {
        let base = std::mem::take(self);
        *self = merge_tree(base, source, MergePolicy::Overwrite);
    }

    /// Merge that never overwrites an existing populated value; only absent
    /// or vacant slots are filled.
    pub fn soft_merge(&mut self, source: Tree) {
        let base = std::mem::take(self);
        *self = merge_tree(base, source, MergePolicy::Soft);
    }

    /// Merge a tree under a dotted leaf instead of the root; an empty leaf
    /// merges at the root.
    pub fn leaf_merge(&mut self, leaf: &str, source: Tree) -> Result<(), FigtreeError> {
        self.branch_mut(leaf)?.merge(source);
        Ok(())
    }

    /// Names excluded from export by this tree's own `_private` list.
    fn private_list(&self) -> Vec<&str> {
        match self.fields.get(PRIVATE_LIST_FIELD) {
            Some(Value::List(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Export to plain document data, dropping private fields.
    ///
    /// Skips every field starting with `_` and every field named in this
    /// tree's own `_private` list. Nested trees export recursively, each
    /// applying its own privacy rules; trees inside sequences too.
    pub fn export(&self) -> serde_yaml::Mapping {
        let private = self.private_list();
        let mut out = serde_yaml::Mapping::new();
        for (name, value) in &self.fields {
            if name.starts_with(PRIVATE_PREFIX) || private.contains(&name.as_str()) {
                continue;
            }
            out.insert(
                serde_yaml::Value::String(name.clone()),
                export_value(value),
            );
        }
        out
    }

    /// Strip the tree wrapper type without filtering anything.
    ///
    /// Unlike [`export`](Tree::export), private fields survive. Used for
    /// value comparison and external inspection.
    pub fn simplify(&self) -> serde_yaml::Value {
        serde_yaml::Value::Mapping(self.to_mapping())
    }

    /// Unfiltered conversion to a plain mapping.
    pub fn to_mapping(&self) -> serde_yaml::Mapping {
        let mut out = serde_yaml::Mapping::new();
        for (name, value) in &self.fields {
            out.insert(serde_yaml::Value::String(name.clone()), value.to_yaml());
        }
        out
    }

    /// Dotted paths of every non-tree leaf value, sorted by field order.
    ///
    /// Empty branches contribute nothing; they hold no values to address.
    pub fn flat_keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_flat_keys("", &mut out);
        out
    }

    fn collect_flat_keys(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, value) in &self.fields {
            let full = path::join(prefix, name);
            match value {
                Value::Tree(sub) => sub.collect_flat_keys(&full, out),
                _ => out.push(full),
            }
        }
    }
}

fn export_value(value: &Value) -> serde_yaml::Value {
    match value {
        Value::Tree(tree) => serde_yaml::Value::Mapping(tree.export()),
        Value::List(items) => {
            serde_yaml::Value::Sequence(items.iter().map(export_value).collect())
        }
        other => other.to_yaml(),
    }
}

impl IntoIterator for Tree {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl FromIterator<(String, Value)> for Tree {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Tree {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_vivification_materializes_branches() {
        let mut t = Tree::new();
        let b = t.branch_mut("a").unwrap().branch_mut("b").unwrap();
        assert!(b.is_empty());
        assert!(t.contains_field("a"));
        assert!(t.contains_path("a.b"));
    }

    #[test]
    fn get_field_returns_existing_value() {
        let mut t = Tree::new();
        t.set_field("a", 18).unwrap();
        assert_eq!(t.get_field("a"), &Value::Int(18));
    }

    #[test]
    fn strict_access_fails_on_missing() {
        let t = Tree::new();
        assert!(matches!(
            t.field_strict("nope"),
            Err(FigtreeError::KeyNotFound(_))
        ));
    }

    #[test]
    fn dotted_round_trip() {
        let mut t = Tree::new();
        t.assign_path("x.y.z", 14).unwrap();
        assert_eq!(t.lookup("x.y.z"), Some(&Value::Int(14)));
        assert_eq!(t.resolve_path("x.y.z").unwrap(), &Value::Int(14));
    }

    #[test]
    fn deep_assignment_creates_all_branches() {
        let mut t = Tree::new();
        t.assign_path("f.h.i.j.k.l", 14).unwrap();
        assert_eq!(t.lookup("f.h.i.j.k.l"), Some(&Value::Int(14)));
        assert!(t.field("f").unwrap().is_tree());
    }

    #[test]
    fn reassignment_replaces_scalar() {
        let mut t = Tree::new();
        t.set_field("a", 18).unwrap();
        t.set_field("a", 72).unwrap();
        assert_eq!(t.field("a"), Some(&Value::Int(72)));
    }

    #[test]
    fn tree_assignment_merges_into_existing_branch() {
        let mut t = Tree::new();
        t.set_field("a", Tree::parse("b: 5").unwrap()).unwrap();
        t.set_field("a", Tree::parse("c:\n  d: 19\n").unwrap()).unwrap();
        assert_eq!(t.lookup("a.b"), Some(&Value::Int(5)));
        assert_eq!(t.lookup("a.c.d"), Some(&Value::Int(19)));
    }

    #[test]
    fn merge_tree_replaces_scalar() {
        let mut t = Tree::parse("a: 1").unwrap();
        t.merge(Tree::parse("a:\n  b: 2\n").unwrap());
        assert_eq!(t.lookup("a.b"), Some(&Value::Int(2)));
    }

    #[test]
    fn soft_merge_is_non_destructive() {
        let mut t = Tree::parse("d:\n  e: 72\n").unwrap();
        t.soft_merge(Tree::parse("d:\n  e: 73\n  f: 18\n").unwrap());
        assert_eq!(t.lookup("d.e"), Some(&Value::Int(72)));
        assert_eq!(t.lookup("d.f"), Some(&Value::Int(18)));
    }

    #[test]
    fn descending_through_scalar_fails() {
        let mut t = Tree::new();
        t.set_field("b", 1).unwrap();
        assert!(matches!(
            t.assign_path("b.c", 2),
            Err(FigtreeError::KeyNotFound(_))
        ));
        assert_eq!(t.field("b"), Some(&Value::Int(1)));
    }

    #[test]
    fn empty_path_is_identity_for_branches() {
        let mut t = Tree::parse("a: 1").unwrap();
        assert!(t.branch_mut("").unwrap().contains_field("a"));
    }

    #[test]
    fn empty_path_assignment_merges_mapping() {
        let mut t = Tree::parse("a: 1").unwrap();
        t.assign_path("", Tree::parse("b: 2").unwrap()).unwrap();
        assert_eq!(t.field("a"), Some(&Value::Int(1)));
        assert_eq!(t.field("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn invalid_field_name_rejected() {
        let mut t = Tree::new();
        assert!(matches!(
            t.set_field("a b", 1),
            Err(FigtreeError::InvalidKeyName(_))
        ));
    }

    #[test]
    fn list_mapping_elements_behave_as_trees() {
        let t = Tree::parse("a: [1, 2, {b: 3}]").unwrap();
        let items = t.field("a").unwrap().as_list().unwrap();
        assert_eq!(items[2].as_tree().unwrap().field("b"), Some(&Value::Int(3)));
    }

    #[test]
    fn parse_rejects_non_mapping_text() {
        assert!(matches!(
            Tree::parse("- 1\n- 2\n"),
            Err(FigtreeError::InvalidSourceType(_))
        ));
        assert!(matches!(
            Tree::parse(": : :"),
            Err(FigtreeError::InvalidSourceType(_))
        ));
    }

    #[test]
    fn parse_empty_text_yields_empty_tree() {
        assert!(Tree::parse("").unwrap().is_empty());
    }

    #[test]
    fn export_skips_underscore_fields() {
        let mut t = Tree::new();
        t.set_field("a", 1).unwrap();
        t.set_field("_b", 2).unwrap();
        let exported = t.export();
        assert!(exported.contains_key("a"));
        assert!(!exported.contains_key("_b"));
    }

    #[test]
    fn export_honors_private_list() {
        let mut t = Tree::new();
        t.set_field("a", 1).unwrap();
        t.set_field("_private", vec![Value::from("a")]).unwrap();
        assert!(t.export().is_empty());
    }

    #[test]
    fn private_list_is_not_inherited() {
        let mut t = Tree::new();
        t.assign_path("sub.a", 1).unwrap();
        t.set_field("_private", vec![Value::from("a")]).unwrap();
        let exported = t.export();
        let sub = exported.get("sub").unwrap().as_mapping().unwrap();
        assert!(sub.contains_key("a"));
    }

    #[test]
    fn export_filters_trees_inside_lists() {
        let mut inner = Tree::new();
        inner.set_field("keep", 1).unwrap();
        inner.set_field("_drop", 2).unwrap();
        let mut t = Tree::new();
        t.set_field("items", vec![Value::Tree(inner)]).unwrap();
        let exported = t.export();
        let seq = exported.get("items").unwrap().as_sequence().unwrap();
        let elem = seq[0].as_mapping().unwrap();
        assert!(elem.contains_key("keep"));
        assert!(!elem.contains_key("_drop"));
    }

    #[test]
    fn simplify_keeps_private_fields() {
        let mut t = Tree::new();
        t.set_field("a", 1).unwrap();
        t.set_field("_b", 2).unwrap();
        let plain = t.simplify();
        let m = plain.as_mapping().unwrap();
        assert!(m.contains_key("a"));
        assert!(m.contains_key("_b"));
    }

    #[test]
    fn equality_is_recursive() {
        let a = Tree::parse("a: 1\nb:\n  c: 2\n").unwrap();
        let b = Tree::parse("b:\n  c: 2\na: 1\n").unwrap();
        let c = Tree::parse("a: 1\nb:\n  c: 3\n").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn leaf_merge_lands_under_leaf() {
        let mut t = Tree::new();
        t.leaf_merge("server.http", Tree::parse("port: 80").unwrap())
            .unwrap();
        assert_eq!(t.lookup("server.http.port"), Some(&Value::Int(80)));
    }

    #[test]
    fn flat_keys_list_leaf_paths() {
        let t = Tree::parse("a:\n  b: 1\n  c: [1, 2]\nd: x\n").unwrap();
        assert_eq!(t.flat_keys(), vec!["a.b", "a.c", "d"]);
    }
}
