//! Persistent backend over an embedded key-value database.
//!
//! Values are JSON-encoded before storage (binary-safe, self-describing) and
//! decoded on read. One database handle per instance; branch views created
//! from a [`FlatStore`](crate::FlatStore) on this backend share the handle.
//! Closing the backend invalidates every sharing view: subsequent access
//! fails with [`FigtreeError::BackendClosed`]. Opening a database already
//! locked by another process surfaces as [`FigtreeError::BackendBusy`].

use std::cell::Cell;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backend::Backend;
use crate::error::FigtreeError;
use crate::value::Value;

pub struct SledBackend {
    db: sled::Db,
    path: PathBuf,
    open: Cell<bool>,
}

impl SledBackend {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FigtreeError> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "opening key-value backend");
        let db = sled::open(&path)?;
        Ok(SledBackend {
            db,
            path,
            open: Cell::new(true),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.open.get()
    }

    /// Flush and close the database. With `delete`, the on-disk files are
    /// removed as well. Every view sharing this backend is invalidated.
    pub fn close(&self, delete: bool) -> Result<(), FigtreeError> {
        if self.open.replace(false) {
            self.db.flush()?;
        }
        if delete && self.path.exists() {
            std::fs::remove_dir_all(&self.path)
                .map_err(|e| FigtreeError::io(self.path.clone(), e))?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), FigtreeError> {
        if self.open.get() {
            Ok(())
        } else {
            Err(FigtreeError::BackendClosed)
        }
    }

    fn decode(bytes: &[u8]) -> Result<Value, FigtreeError> {
        serde_json::from_slice(bytes).map_err(|e| FigtreeError::Backend(e.to_string()))
    }

    fn encode(value: &Value) -> Result<Vec<u8>, FigtreeError> {
        serde_json::to_vec(value).map_err(|e| FigtreeError::Backend(e.to_string()))
    }
}

impl Backend for SledBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, FigtreeError> {
        self.ensure_open()?;
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: Value) -> Result<(), FigtreeError> {
        self.ensure_open()?;
        self.db.insert(key.as_bytes(), Self::encode(&value)?)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, FigtreeError> {
        self.ensure_open()?;
        Ok(self.db.remove(key.as_bytes())?.is_some())
    }

    fn contains(&self, key: &str) -> Result<bool, FigtreeError> {
        self.ensure_open()?;
        Ok(self.db.contains_key(key.as_bytes())?)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>, FigtreeError> {
        self.ensure_open()?;
        let mut out = Vec::new();
        let iter: Box<dyn Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>> =
            if prefix.is_empty() {
                Box::new(self.db.iter())
            } else {
                Box::new(self.db.scan_prefix(format!("{prefix}.").as_bytes()))
            };
        for entry in iter {
            let (key_bytes, value_bytes) = entry?;
            let key = String::from_utf8_lossy(&key_bytes).into_owned();
            out.push((key, Self::decode(&value_bytes)?));
        }
        Ok(out)
    }

    fn clear(&self) -> Result<(), FigtreeError> {
        self.ensure_open()?;
        self.db.clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, SledBackend) {
        let dir = TempDir::new().unwrap();
        let backend = SledBackend::open(dir.path().join("kv")).unwrap();
        (dir, backend)
    }

    #[test]
    fn round_trips_structured_values() {
        let (_dir, b) = open_temp();
        let value = Value::List(vec![Value::Int(1), Value::from("two"), Value::Null]);
        b.put("key", value.clone()).unwrap();
        assert_eq!(b.get("key").unwrap(), Some(value));
    }

    #[test]
    fn scan_strips_nothing_and_respects_prefix() {
        let (_dir, b) = open_temp();
        b.put("a.b", Value::Int(1)).unwrap();
        b.put("a.c", Value::Int(2)).unwrap();
        b.put("ax.d", Value::Int(3)).unwrap();
        let keys: Vec<String> = b.scan("a").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a.b", "a.c"]);
    }

    #[test]
    fn remove_reports_presence() {
        let (_dir, b) = open_temp();
        b.put("a", Value::Int(1)).unwrap();
        assert!(b.remove("a").unwrap());
        assert!(!b.remove("a").unwrap());
    }

    #[test]
    fn closed_backend_rejects_access() {
        let (_dir, b) = open_temp();
        b.put("a", Value::Int(1)).unwrap();
        b.close(false).unwrap();
        assert!(matches!(b.get("a"), Err(FigtreeError::BackendClosed)));
        assert!(matches!(
            b.put("b", Value::Int(2)),
            Err(FigtreeError::BackendClosed)
        ));
    }

    #[test]
    fn close_with_delete_removes_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kv");
        let b = SledBackend::open(&path).unwrap();
        b.put("a", Value::Int(1)).unwrap();
        b.close(true).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn clear_empties_database() {
        let (_dir, b) = open_temp();
        for i in 0..10 {
            b.put(&format!("k{i}"), Value::Int(i)).unwrap();
        }
        assert_eq!(b.scan("").unwrap().len(), 10);
        b.clear().unwrap();
        assert!(b.scan("").unwrap().is_empty());
    }
}
