//! Empty-value pruning for finished records.
//!
//! A value is empty when it is `null`, `""`, `[]` or `{}`. Pruning descends
//! into objects and arrays, prunes children first, then drops children that
//! became empty. Numbers and booleans are never empty.

use serde_json::{Map, Value};

/// Returns true if `value` is `null`, an empty string, an empty array or an empty object.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Recursively remove empty entries. The result may itself be empty.
pub fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(prune_map(map)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(prune)
                .filter(|v| !is_empty(v))
                .collect(),
        ),
        other => other,
    }
}

/// Like [`prune`], but top-level keys listed in `keep` survive even when they
/// end up empty. Only applies when `value` is an object.
pub fn prune_keeping(value: Value, keep: &[&str]) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                let child = prune(child);
                if !is_empty(&child) || keep.contains(&key.as_str()) {
                    out.insert(key, child);
                }
            }
            Value::Object(out)
        }
        other => prune(other),
    }
}

fn prune_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(k, v)| (k, prune(v)))
        .filter(|(_, v)| !is_empty(v))
        .collect()
}
