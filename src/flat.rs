//! Flat dotted-key store with prefix-scoped branch views.
//!
//! Where [`Tree`](crate::Tree) nests containers, a [`FlatStore`] keeps one
//! level of full dotted paths in a [`Backend`] and layers *views* on top: a
//! branch view shares the backing store and composes its prefix into every
//! key it touches, so mutating through a branch mutates the parent's data.
//! The store is already flat, so "merge" at this layer is simply
//! later-write-wins.

use std::rc::Rc;

use regex::Regex;

use crate::backend::{Backend, MemoryBackend};
use crate::error::FigtreeError;
use crate::path;
use crate::value::Value;

/// What a read does when the key is absent.
#[derive(Debug, Clone, Default)]
pub enum MissingKey {
    /// Fail with [`FigtreeError::KeyNotFound`].
    #[default]
    Error,
    /// Return this value instead.
    Value(Value),
}

#[derive(Clone)]
pub struct FlatStore {
    backend: Rc<dyn Backend>,
    prefix: String,
    missing: MissingKey,
}

impl FlatStore {
    /// Wrap an existing backend with an empty prefix.
    pub fn new(backend: Rc<dyn Backend>) -> Self {
        FlatStore {
            backend,
            prefix: String::new(),
            missing: MissingKey::Error,
        }
    }

    /// Fresh store over an in-process backend.
    pub fn in_memory() -> Self {
        FlatStore::new(Rc::new(MemoryBackend::new()))
    }

    /// Replace the missing-key policy on this view.
    pub fn with_default(mut self, value: Value) -> Self {
        self.missing = MissingKey::Value(value);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Last segment of this view's prefix; empty for the root view.
    pub fn leaf(&self) -> &str {
        path::leaf(&self.prefix)
    }

    fn compose(&self, key: &str) -> String {
        path::join(&self.prefix, key)
    }

    /// Read a key, applying the missing-key policy on absence.
    pub fn get(&self, key: &str) -> Result<Value, FigtreeError> {
        let full = self.compose(key);
        match self.backend.get(&full)? {
            Some(value) => Ok(value),
            None => match &self.missing {
                MissingKey::Error => Err(FigtreeError::KeyNotFound(full)),
                MissingKey::Value(default) => Ok(default.clone()),
            },
        }
    }

    /// Read a key, bypassing the missing-key policy.
    pub fn try_get(&self, key: &str) -> Result<Option<Value>, FigtreeError> {
        self.backend.get(&self.compose(key))
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), FigtreeError> {
        self.backend.put(&self.compose(key), value.into())
    }

    /// Remove a key; absent keys fail with [`FigtreeError::KeyNotFound`].
    pub fn delete(&self, key: &str) -> Result<(), FigtreeError> {
        let full = self.compose(key);
        if self.backend.remove(&full)? {
            Ok(())
        } else {
            Err(FigtreeError::KeyNotFound(full))
        }
    }

    pub fn contains(&self, key: &str) -> Result<bool, FigtreeError> {
        self.backend.contains(&self.compose(key))
    }

    /// A view over `key`, sharing this store's backend.
    ///
    /// The new prefix is `key` alone when `absolute`, otherwise this view's
    /// prefix extended by `key`.
    pub fn get_branch(&self, key: &str, absolute: bool) -> Result<FlatStore, FigtreeError> {
        path::check(key)?;
        let prefix = if absolute {
            key.trim_matches('.').to_string()
        } else {
            self.compose(key)
        };
        Ok(FlatStore {
            backend: Rc::clone(&self.backend),
            prefix,
            missing: self.missing.clone(),
        })
    }

    /// Keys visible in this view, prefix-stripped. With `depth > 0`, keys
    /// are truncated to their first `depth` segments and de-duplicated.
    pub fn keys(&self, depth: usize) -> Result<Vec<String>, FigtreeError> {
        let keys = self.items()?.into_iter().map(|(k, _)| k);
        Ok(path::truncate_keys(keys, depth))
    }

    /// All `(key, value)` pairs in this view, keys prefix-stripped.
    pub fn items(&self) -> Result<Vec<(String, Value)>, FigtreeError> {
        let skip = if self.prefix.is_empty() {
            0
        } else {
            self.prefix.len() + 1
        };
        Ok(self
            .backend
            .scan(&self.prefix)?
            .into_iter()
            .map(|(k, v)| (k[skip..].to_string(), v))
            .collect())
    }

    pub fn len(&self) -> Result<usize, FigtreeError> {
        Ok(self.items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, FigtreeError> {
        Ok(self.items()?.is_empty())
    }

    /// Write every pair into this view. Passing another view's
    /// [`items`](FlatStore::items) copies it wholesale, prefix-relative.
    pub fn update<I>(&self, source: I) -> Result<(), FigtreeError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (key, value) in source {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Discover dynamically-named children under a glob-like pattern, where
    /// `*` matches exactly one path segment.
    ///
    /// `find_branch("plugins.*")` yields one branch view per distinct child
    /// segment found below any key matching the pattern.
    pub fn find_branch(&self, pattern: &str) -> Result<Vec<FlatStore>, FigtreeError> {
        path::check(&pattern.replace('*', "x"))?;
        let regex = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("[A-Za-z0-9_]+");
        let regex = Regex::new(&format!(r"^({regex})\.(.*)$"))
            .map_err(|e| FigtreeError::InvalidKeyName(e.to_string()))?;

        let mut names = Vec::new();
        for key in self.keys(0)? {
            let Some(captures) = regex.captures(&key) else {
                continue;
            };
            let (Some(matched), Some(rest)) = (captures.get(1), captures.get(2)) else {
                continue;
            };
            let matched = matched.as_str();
            let rest = rest.as_str();
            let child = rest.split('.').next().unwrap_or(rest);
            let name = path::join(matched, child);
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
            .into_iter()
            .map(|name| self.get_branch(&name, false))
            .collect()
    }

    /// Empty the backing store, not just this view.
    pub fn clear(&self) -> Result<(), FigtreeError> {
        self.backend.clear()
    }
}
