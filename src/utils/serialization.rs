// Canonical JSON: object keys are emitted in lexicographic order at every
// nesting level, so the same value always hashes to the same digest no matter
// how its struct fields are declared.
use crate::error::Result;
use crate::utils::sha256_hex;
use serde::Serialize;
use serde_json::{Map, Value};

/// Serialize `data` to compact JSON with sorted keys.
pub fn to_canonical_json<T: Serialize>(data: &T) -> Result<String> {
    let value = sort_keys(serde_json::to_value(data)?);
    Ok(serde_json::to_string(&value)?)
}

/// SHA-256 (hex) of the canonical JSON form of `data`.
pub fn canonical_hash<T: Serialize>(data: &T) -> Result<String> {
    let json = to_canonical_json(data)?;
    Ok(sha256_hex(json.as_bytes()))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
