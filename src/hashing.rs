//! Hashing - SHA-256 over canonical JSON
//!
//! Gives every resolved snapshot a reproducible identity.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

use crate::tokens::TokenValue;

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Canonical JSON: keys sorted at every depth, no whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sort_value(v))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Hash of a resolved value map.
pub fn snapshot_hash(values: &BTreeMap<String, TokenValue>) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(values)?.as_bytes()))
}
