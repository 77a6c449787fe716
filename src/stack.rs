//! Layered lookup across ordered configuration sources.
//!
//! A [`LayerStack`] holds an ordered list of layers; reads walk the list and
//! the first layer that knows a key wins, so index 0 is the highest-priority
//! source. Writes always land in the top layer, keeping lower layers (system
//! defaults, shipped files) pristine. Stacks implement [`Layer`] themselves,
//! so a stack can sit inside another stack.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::FigtreeError;
use crate::flat::{FlatStore, MissingKey};
use crate::path;
use crate::tree::Tree;
use crate::value::Value;

/// One read/write source inside a stack.
pub trait Layer {
    /// Non-failing lookup: `Ok(None)` means this layer does not know the key.
    fn lookup(&self, key: &str) -> Result<Option<Value>, FigtreeError>;

    fn assign(&mut self, key: &str, value: Value) -> Result<(), FigtreeError>;

    /// Keys this layer exposes, truncated to `depth` segments (0 = full).
    fn keys(&self, depth: usize) -> Result<Vec<String>, FigtreeError>;

    /// A layer scoped to the subtree under `key`.
    fn branch(&self, key: &str) -> Result<Box<dyn Layer>, FigtreeError>;

    /// Merge a tree's contents under `branch` with overwrite semantics:
    /// trees merge recursively and a mapping replaces a scalar in its way.
    ///
    /// The default walks the tree and assigns each leaf, which suits flat
    /// layers where keys are independent; tree-backed layers override it to
    /// go through the real merge so intermediate scalars are replaced, not
    /// tripped over.
    fn merge_branch(&mut self, branch: &str, tree: Tree) -> Result<(), FigtreeError> {
        if tree.is_empty() && !branch.is_empty() {
            return self.assign(branch, Value::Tree(tree));
        }
        for (name, value) in tree {
            let full = path::join(branch, &name);
            match value {
                Value::Tree(sub) => self.merge_branch(&full, sub)?,
                other => self.assign(&full, other)?,
            }
        }
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool, FigtreeError> {
        Ok(self.lookup(key)?.is_some())
    }
}

impl Layer for FlatStore {
    fn lookup(&self, key: &str) -> Result<Option<Value>, FigtreeError> {
        self.try_get(key)
    }

    fn assign(&mut self, key: &str, value: Value) -> Result<(), FigtreeError> {
        self.set(key, value)
    }

    fn keys(&self, depth: usize) -> Result<Vec<String>, FigtreeError> {
        FlatStore::keys(self, depth)
    }

    fn branch(&self, key: &str) -> Result<Box<dyn Layer>, FigtreeError> {
        Ok(Box::new(self.get_branch(key, false)?))
    }
}

/// A [`Tree`] adapted to the layer interface.
///
/// The tree is shared through an `Rc`, so branch layers view and mutate the
/// same underlying data.
pub struct TreeLayer {
    root: Rc<RefCell<Tree>>,
    prefix: String,
}

impl TreeLayer {
    pub fn new(tree: Tree) -> Self {
        TreeLayer {
            root: Rc::new(RefCell::new(tree)),
            prefix: String::new(),
        }
    }

    pub fn from_shared(root: Rc<RefCell<Tree>>) -> Self {
        TreeLayer {
            root,
            prefix: String::new(),
        }
    }

    /// Handle on the shared tree, for callers that built the layer and want
    /// to inspect it afterwards.
    pub fn tree_handle(&self) -> Rc<RefCell<Tree>> {
        Rc::clone(&self.root)
    }

    /// Owned copy of the tree as it currently stands.
    pub fn snapshot(&self) -> Tree {
        self.root.borrow().clone()
    }
}

impl Layer for TreeLayer {
    fn lookup(&self, key: &str) -> Result<Option<Value>, FigtreeError> {
        let full = path::join(&self.prefix, key);
        Ok(self.root.borrow().lookup(&full).cloned())
    }

    fn assign(&mut self, key: &str, value: Value) -> Result<(), FigtreeError> {
        let full = path::join(&self.prefix, key);
        self.root.borrow_mut().assign_path(&full, value)
    }

    fn keys(&self, depth: usize) -> Result<Vec<String>, FigtreeError> {
        let root = self.root.borrow();
        let flat = if self.prefix.is_empty() {
            root.flat_keys()
        } else {
            match root.lookup(&self.prefix) {
                Some(Value::Tree(sub)) => sub.flat_keys(),
                _ => Vec::new(),
            }
        };
        Ok(path::truncate_keys(flat.into_iter(), depth))
    }

    fn branch(&self, key: &str) -> Result<Box<dyn Layer>, FigtreeError> {
        path::check(key)?;
        Ok(Box::new(TreeLayer {
            root: Rc::clone(&self.root),
            prefix: path::join(&self.prefix, key),
        }))
    }

    fn merge_branch(&mut self, branch: &str, tree: Tree) -> Result<(), FigtreeError> {
        let full = path::join(&self.prefix, branch);
        if full.is_empty() {
            self.root.borrow_mut().merge(tree);
            return Ok(());
        }
        path::check(&full)?;
        // wrap the tree under the dotted path, then merge at the root so
        // overwrite semantics apply at every level
        let mut nested = tree;
        for segment in full.rsplit('.') {
            let mut parent = Tree::new();
            parent.insert_raw(segment.to_string(), Value::Tree(nested));
            nested = parent;
        }
        self.root.borrow_mut().merge(nested);
        Ok(())
    }
}

/// Ordered stack of layers; index 0 is consulted first and receives writes.
#[derive(Default)]
pub struct LayerStack {
    layers: Vec<Box<dyn Layer>>,
    missing: MissingKey,
}

impl LayerStack {
    pub fn new() -> Self {
        LayerStack::default()
    }

    pub fn from_layers(layers: Vec<Box<dyn Layer>>) -> Self {
        LayerStack {
            layers,
            missing: MissingKey::Error,
        }
    }

    /// Replace the missing-key policy used by [`get`](LayerStack::get).
    pub fn with_default(mut self, value: Value) -> Self {
        self.missing = MissingKey::Value(value);
        self
    }

    /// Append a layer below every existing one (lowest priority).
    pub fn push(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    /// Insert a layer at `index`; 0 makes it the new top.
    pub fn insert(&mut self, index: usize, layer: Box<dyn Layer>) {
        self.layers.insert(index, layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// First-match read across the stack; the missing-key policy applies
    /// when no layer knows the key.
    pub fn get(&self, key: &str) -> Result<Value, FigtreeError> {
        match self.try_get(key)? {
            Some(value) => Ok(value),
            None => match &self.missing {
                MissingKey::Error => Err(FigtreeError::KeyNotFound(key.to_string())),
                MissingKey::Value(default) => Ok(default.clone()),
            },
        }
    }

    /// First-match read, `Ok(None)` when no layer knows the key.
    pub fn try_get(&self, key: &str) -> Result<Option<Value>, FigtreeError> {
        for layer in &self.layers {
            if let Some(value) = layer.lookup(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Write into the top layer. Fails with [`FigtreeError::EmptyStack`]
    /// when there is no layer to receive the write.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<(), FigtreeError> {
        match self.layers.first_mut() {
            Some(top) => top.assign(key, value.into()),
            None => Err(FigtreeError::EmptyStack),
        }
    }

    pub fn contains(&self, key: &str) -> Result<bool, FigtreeError> {
        Ok(self.try_get(key)?.is_some())
    }

    /// Union of every layer's keys, de-duplicated, truncated to `depth`.
    pub fn keys(&self, depth: usize) -> Result<Vec<String>, FigtreeError> {
        let mut all = Vec::new();
        for layer in &self.layers {
            for key in layer.keys(0)? {
                if !all.contains(&key) {
                    all.push(key);
                }
            }
        }
        Ok(path::truncate_keys(all.into_iter(), depth))
    }

    /// A stack of branch layers, one per member, same order.
    pub fn get_branch(&self, key: &str) -> Result<LayerStack, FigtreeError> {
        let layers = self
            .layers
            .iter()
            .map(|layer| layer.branch(key))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LayerStack {
            layers,
            missing: self.missing.clone(),
        })
    }

    /// Write every pair into the top layer.
    pub fn update<I>(&mut self, source: I) -> Result<(), FigtreeError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (key, value) in source {
            self.set(&key, value)?;
        }
        Ok(())
    }
}

impl Layer for LayerStack {
    fn lookup(&self, key: &str) -> Result<Option<Value>, FigtreeError> {
        self.try_get(key)
    }

    fn assign(&mut self, key: &str, value: Value) -> Result<(), FigtreeError> {
        self.set(key, value)
    }

    fn keys(&self, depth: usize) -> Result<Vec<String>, FigtreeError> {
        LayerStack::keys(self, depth)
    }

    fn branch(&self, key: &str) -> Result<Box<dyn Layer>, FigtreeError> {
        Ok(Box::new(self.get_branch(key)?))
    }

    fn merge_branch(&mut self, branch: &str, tree: Tree) -> Result<(), FigtreeError> {
        match self.layers.first_mut() {
            Some(top) => top.merge_branch(branch, tree),
            None => Err(FigtreeError::EmptyStack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(pairs: &[(&str, i64)]) -> Box<dyn Layer> {
        let s = FlatStore::in_memory();
        for (k, v) in pairs {
            s.set(k, *v).unwrap();
        }
        Box::new(s)
    }

    fn two_layer_stack() -> LayerStack {
        let mut stack = LayerStack::new();
        stack.push(flat(&[("a", 1)]));
        stack.push(flat(&[("a", 2), ("b", 3)]));
        stack
    }

    #[test]
    fn first_layer_wins() {
        let stack = two_layer_stack();
        assert_eq!(stack.get("a").unwrap(), Value::Int(1));
        assert_eq!(stack.get("b").unwrap(), Value::Int(3));
    }

    #[test]
    fn missing_everywhere_errors() {
        let stack = two_layer_stack();
        assert!(matches!(stack.get("z"), Err(FigtreeError::KeyNotFound(_))));
        assert_eq!(stack.try_get("z").unwrap(), None);
    }

    #[test]
    fn default_policy_applies_after_all_layers() {
        let mut stack = two_layer_stack().with_default(Value::from("fallback"));
        assert_eq!(stack.get("z").unwrap(), Value::from("fallback"));
        stack.set("z", 9).unwrap();
        assert_eq!(stack.get("z").unwrap(), Value::Int(9));
    }

    #[test]
    fn writes_land_in_top_layer_only() {
        let mut stack = two_layer_stack();
        stack.set("b", 9).unwrap();
        assert_eq!(stack.get("b").unwrap(), Value::Int(9));
        // the lower layer still holds its original value
        assert_eq!(stack.layers[1].lookup("b").unwrap(), Some(Value::Int(3)));
        assert_eq!(stack.layers[0].lookup("b").unwrap(), Some(Value::Int(9)));
    }

    #[test]
    fn empty_stack_rejects_writes() {
        let mut stack = LayerStack::new();
        assert!(stack.is_empty());
        assert!(matches!(stack.set("a", 1), Err(FigtreeError::EmptyStack)));
    }

    #[test]
    fn insert_at_zero_takes_priority() {
        let mut stack = two_layer_stack();
        stack.insert(0, flat(&[("a", 7)]));
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.get("a").unwrap(), Value::Int(7));
    }

    #[test]
    fn keys_union_across_layers() {
        let mut stack = LayerStack::new();
        stack.push(flat(&[("a.x", 1), ("a.y", 2)]));
        stack.push(flat(&[("a.x", 5), ("b.z", 6)]));
        let mut keys = stack.keys(0).unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a.x", "a.y", "b.z"]);
        let mut top = stack.keys(1).unwrap();
        top.sort();
        assert_eq!(top, vec!["a", "b"]);
    }

    #[test]
    fn branch_stack_preserves_order() {
        let mut stack = LayerStack::new();
        stack.push(flat(&[("sub.a", 1)]));
        stack.push(flat(&[("sub.a", 2), ("sub.b", 3)]));
        let sub = stack.get_branch("sub").unwrap();
        assert_eq!(sub.get("a").unwrap(), Value::Int(1));
        assert_eq!(sub.get("b").unwrap(), Value::Int(3));
    }

    #[test]
    fn branch_writes_reach_backing_layer() {
        let mut stack = LayerStack::new();
        stack.push(flat(&[("sub.a", 1)]));
        let mut sub = stack.get_branch("sub").unwrap();
        sub.set("c", 4).unwrap();
        assert_eq!(stack.get("sub.c").unwrap(), Value::Int(4));
    }

    #[test]
    fn tree_layer_reads_dotted_paths() {
        let tree = Tree::parse("server:\n  host: localhost\n  port: 8080\n").unwrap();
        let layer = TreeLayer::new(tree);
        assert_eq!(
            layer.lookup("server.host").unwrap(),
            Some(Value::from("localhost"))
        );
        assert_eq!(layer.lookup("server.missing").unwrap(), None);
    }

    #[test]
    fn tree_layer_assign_and_keys() {
        let mut layer = TreeLayer::new(Tree::new());
        layer.assign("a.b", Value::Int(1)).unwrap();
        layer.assign("a.c", Value::Int(2)).unwrap();
        let mut keys = layer.keys(0).unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a.b", "a.c"]);
        assert_eq!(layer.keys(1).unwrap(), vec!["a"]);
    }

    #[test]
    fn tree_layer_branch_shares_root() {
        let mut layer = TreeLayer::new(Tree::parse("a:\n  b: 1\n").unwrap());
        let handle = layer.tree_handle();
        let mut branch = Layer::branch(&layer, "a").unwrap();
        assert_eq!(branch.lookup("b").unwrap(), Some(Value::Int(1)));
        branch.assign("c", Value::Int(2)).unwrap();
        assert_eq!(layer.lookup("a.c").unwrap(), Some(Value::Int(2)));
        assert_eq!(handle.borrow().lookup("a.c"), Some(&Value::Int(2)));
    }

    #[test]
    fn merge_branch_replaces_scalar_with_tree() {
        let mut layer = TreeLayer::new(Tree::parse("a: 1").unwrap());
        layer
            .merge_branch("a", Tree::parse("b: 2").unwrap())
            .unwrap();
        assert_eq!(layer.lookup("a.b").unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn merge_branch_preserves_siblings() {
        let mut layer = TreeLayer::new(Tree::parse("a:\n  keep: 1\n").unwrap());
        layer
            .merge_branch("a", Tree::parse("b: 2").unwrap())
            .unwrap();
        assert_eq!(layer.lookup("a.keep").unwrap(), Some(Value::Int(1)));
        assert_eq!(layer.lookup("a.b").unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn merge_branch_on_flat_store_assigns_leaves() {
        let s = FlatStore::in_memory();
        let mut view = s.clone();
        view.merge_branch("cfg", Tree::parse("x: 1\ny:\n  z: 2\n").unwrap())
            .unwrap();
        assert_eq!(s.get("cfg.x").unwrap(), Value::Int(1));
        assert_eq!(s.get("cfg.y.z").unwrap(), Value::Int(2));
    }

    #[test]
    fn stack_merge_lands_in_top_layer() {
        let mut stack = LayerStack::new();
        stack.push(Box::new(TreeLayer::new(Tree::parse("a: 1").unwrap())));
        stack.push(flat(&[("a.c", 7)]));
        stack
            .merge_branch("a", Tree::parse("b: 2").unwrap())
            .unwrap();
        assert_eq!(stack.get("a.b").unwrap(), Value::Int(2));
        // the lower layer is untouched
        assert_eq!(stack.layers[1].lookup("a.c").unwrap(), Some(Value::Int(7)));
    }

    #[test]
    fn empty_stack_rejects_merge() {
        let mut stack = LayerStack::new();
        assert!(matches!(
            stack.merge_branch("a", Tree::new()),
            Err(FigtreeError::EmptyStack)
        ));
    }

    #[test]
    fn stack_nests_inside_stack() {
        let mut inner = LayerStack::new();
        inner.push(flat(&[("a", 10)]));
        let mut outer = LayerStack::new();
        outer.push(flat(&[("b", 20)]));
        outer.push(Box::new(inner));
        assert_eq!(outer.get("a").unwrap(), Value::Int(10));
        assert_eq!(outer.get("b").unwrap(), Value::Int(20));
    }

    #[test]
    fn mixed_tree_and_flat_layers() {
        let mut stack = LayerStack::new();
        stack.push(Box::new(TreeLayer::new(
            Tree::parse("server:\n  port: 9000\n").unwrap(),
        )));
        stack.push(flat(&[("server.port", 8080), ("server.retries", 3)]));
        assert_eq!(stack.get("server.port").unwrap(), Value::Int(9000));
        assert_eq!(stack.get("server.retries").unwrap(), Value::Int(3));
    }
}
