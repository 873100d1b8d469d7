//! Canonical serialization used as hash input.
//!
//! Two logically equal values must produce identical bytes no matter how
//! they were built, so every JSON object is re-emitted with its keys in
//! lexicographic order at every nesting level. Struct fields go through the
//! same path, which fixes field order as well.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::hasher::HasherError;

/// Serialize `value` to canonical JSON bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HasherError> {
    let value = serde_json::to_value(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
    serde_json::to_vec(&canonicalize(value)).map_err(|e| HasherError::Serialization(e.to_string()))
}

/// Recursively sort the keys of every object in `value`.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
