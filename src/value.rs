//! The value model shared by every container variant.
//!
//! A [`Value`] is a YAML-shaped scalar, a list, or a nested [`Tree`]. The
//! invariant maintained here is that no raw mapping ever appears inside a
//! value: conversion from document data turns every mapping into a `Tree`,
//! recursively, including mappings nested inside lists. Serde derives give
//! values the opaque binary-safe encoding the persistent backend needs.

use serde::{Deserialize, Serialize};

use crate::error::FigtreeError;
use crate::tree::Tree;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Tree(Tree),
}

impl Value {
    /// Convert document data into a value, turning every mapping into a
    /// [`Tree`], including mappings inside sequences at any depth.
    pub fn from_yaml(source: serde_yaml::Value) -> Result<Value, FigtreeError> {
        Ok(match source {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::String(n.to_string())
                }
            }
            serde_yaml::Value::String(s) => Value::String(s),
            serde_yaml::Value::Sequence(seq) => Value::List(
                seq.into_iter()
                    .map(Value::from_yaml)
                    .collect::<Result<_, _>>()?,
            ),
            serde_yaml::Value::Mapping(map) => Value::Tree(Tree::from_mapping(map)?),
            serde_yaml::Value::Tagged(tagged) => Value::from_yaml(tagged.value)?,
        })
    }

    /// Strip the tree wrapper type, producing plain document data.
    ///
    /// No filtering happens here; private fields are kept. This is the
    /// recursive worker behind [`Tree::simplify`].
    pub fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            Value::Null => serde_yaml::Value::Null,
            Value::Bool(b) => serde_yaml::Value::Bool(*b),
            Value::Int(i) => serde_yaml::Value::Number((*i).into()),
            Value::Float(f) => serde_yaml::Value::Number((*f).into()),
            Value::String(s) => serde_yaml::Value::String(s.clone()),
            Value::List(items) => {
                serde_yaml::Value::Sequence(items.iter().map(Value::to_yaml).collect())
            }
            Value::Tree(tree) => serde_yaml::Value::Mapping(tree.to_mapping()),
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Value::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tree_mut(&mut self) -> Option<&mut Tree> {
        match self {
            Value::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Value::Tree(_))
    }

    /// Whether this value counts as "nothing there yet" for soft-merge.
    ///
    /// Soft-merge may replace a vacant value but never a populated one.
    /// `false` and `0` are populated values, not vacancies.
    pub fn is_vacant(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Tree(tree) => tree.is_empty(),
            _ => false,
        }
    }
}

/// Extract a string field name from a document mapping key.
///
/// Scalar keys (strings, numbers, booleans) are accepted and stringified;
/// container-valued keys cannot name a field.
pub(crate) fn yaml_key_to_string(key: &serde_yaml::Value) -> Result<String, FigtreeError> {
    match key {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(FigtreeError::InvalidKeyName(format!("{other:?}"))),
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Tree> for Value {
    fn from(v: Tree) -> Self {
        Value::Tree(v)
    }
}
