//! Pluggable storage behind the flat store.
//!
//! A backend holds raw dotted keys; branch views are layered on top by
//! [`FlatStore`](crate::FlatStore) and never reach down here. The in-process
//! adapter lives in this module; the persistent adapter is in
//! [`db`](crate::db).

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::error::FigtreeError;
use crate::value::Value;

/// Storage operations over raw dotted keys.
///
/// All methods take `&self`: adapters use interior mutability so that branch
/// views can share one backend through an `Rc`. Every method is fallible
/// because the persistent adapter can fail at any point.
pub trait Backend {
    fn get(&self, key: &str) -> Result<Option<Value>, FigtreeError>;
    fn put(&self, key: &str, value: Value) -> Result<(), FigtreeError>;
    /// Remove a key, reporting whether it was present.
    fn remove(&self, key: &str) -> Result<bool, FigtreeError>;
    fn contains(&self, key: &str) -> Result<bool, FigtreeError>;
    /// All `(key, value)` pairs whose key starts with `prefix + "."`. An
    /// empty prefix scans everything. Keys come back in full, unstripped.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>, FigtreeError>;
    fn clear(&self) -> Result<(), FigtreeError>;
}

/// In-process backend over an ordered map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RefCell<BTreeMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }
}

pub(crate) fn key_in_scope(key: &str, prefix: &str) -> bool {
    prefix.is_empty() || key.starts_with(&format!("{prefix}."))
}

impl Backend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, FigtreeError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> Result<(), FigtreeError> {
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, FigtreeError> {
        Ok(self.entries.borrow_mut().remove(key).is_some())
    }

    fn contains(&self, key: &str) -> Result<bool, FigtreeError> {
        Ok(self.entries.borrow().contains_key(key))
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>, FigtreeError> {
        Ok(self
            .entries
            .borrow()
            .iter()
            .filter(|(k, _)| key_in_scope(k, prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn clear(&self) -> Result<(), FigtreeError> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove() {
        let b = MemoryBackend::new();
        b.put("a.b", Value::Int(1)).unwrap();
        assert_eq!(b.get("a.b").unwrap(), Some(Value::Int(1)));
        assert!(b.remove("a.b").unwrap());
        assert!(!b.remove("a.b").unwrap());
        assert_eq!(b.get("a.b").unwrap(), None);
    }

    #[test]
    fn scan_respects_segment_boundaries() {
        let b = MemoryBackend::new();
        b.put("a.a", Value::Int(1)).unwrap();
        b.put("a.b", Value::Int(2)).unwrap();
        b.put("ab.c", Value::Int(3)).unwrap();
        let keys: Vec<String> = b.scan("a").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a.a", "a.b"]);
    }

    #[test]
    fn empty_prefix_scans_all() {
        let b = MemoryBackend::new();
        b.put("a", Value::Int(1)).unwrap();
        b.put("b.c", Value::Int(2)).unwrap();
        assert_eq!(b.scan("").unwrap().len(), 2);
    }

    #[test]
    fn clear_empties_store() {
        let b = MemoryBackend::new();
        b.put("a", Value::Int(1)).unwrap();
        b.clear().unwrap();
        assert!(b.scan("").unwrap().is_empty());
    }
}
