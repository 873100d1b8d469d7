//! Free-form block metadata.
//!
//! Metadata is a sorted map so that it serializes identically regardless of
//! the order entries were inserted in. Values use a closed enum instead of
//! `serde_json::Value` so that blocks stay encodable with non-self-describing
//! formats such as bincode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BlockError, BlockResult};

/// Block metadata: string keys to [`MetaValue`]s, always key-sorted.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A metadata value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<MetaValue>),
    Map(BTreeMap<String, MetaValue>),
}

impl MetaValue {
    /// Convert from an arbitrary JSON value.
    ///
    /// Integers that do not fit an `i64` are carried as floats.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// `false` if a NaN or an infinity appears anywhere inside. Those have
    /// no JSON number form and would hash the same as `null`.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(f) => f.is_finite(),
            Self::List(items) => items.iter().all(Self::is_finite),
            Self::Map(map) => map.values().all(Self::is_finite),
            _ => true,
        }
    }

    /// Convert to a plain JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// The text content, if this is a `Text` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for MetaValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

/// Convert a JSON object into block metadata. Non-object values yield an
/// empty map.
pub fn metadata_from_json(value: &Value) -> Metadata {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), MetaValue::from_json(v)))
            .collect(),
        _ => Metadata::new(),
    }
}

/// Reject metadata that cannot be hashed unambiguously.
pub(crate) fn check_metadata(metadata: &Metadata) -> BlockResult<()> {
    match metadata.iter().find(|(_, v)| !v.is_finite()) {
        Some((key, _)) => Err(BlockError::InvalidInput(format!(
            "metadata entry {key:?} holds a non-finite number"
        ))),
        None => Ok(()),
    }
}
