//! Token sources: file loading, deep merge and value overrides.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::tokens::TokenValue;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: token tree root must be an object")]
    NotAnObject { path: PathBuf },

    #[error("Override '{id}' passes through leaf '{leaf}'")]
    PathThroughLeaf { id: String, leaf: String },
}

pub fn read_json(path: &Path) -> Result<Value, SourceError> {
    let content = fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| SourceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge `overlay` into `base`. Groups merge key by key; anything else,
/// including a leaf meeting a group, is replaced wholesale.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) if !is_leaf_map(b) && !is_leaf_map(&o) => {
            for (key, value) in o {
                match b.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        b.insert(key, value);
                    }
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

fn is_leaf_map(map: &Map<String, Value>) -> bool {
    map.contains_key("$value")
}

/// Read every file and deep-merge them left to right.
pub fn load_tree<P: AsRef<Path>>(paths: &[P]) -> Result<Value, SourceError> {
    let mut tree = Value::Object(Map::new());
    for path in paths {
        let path = path.as_ref();
        let doc = read_json(path)?;
        if !doc.is_object() {
            return Err(SourceError::NotAnObject { path: path.to_path_buf() });
        }
        tracing::debug!(path = %path.display(), "merging token source");
        deep_merge(&mut tree, doc);
    }
    Ok(tree)
}

/// Write each `id -> value` into the tree as that leaf's `$value`.
///
/// Missing groups and leaves are created. Other leaf keys such as `$type`
/// are kept.
pub fn apply_overrides(tree: &mut Value, patch: &BTreeMap<String, TokenValue>) -> Result<(), SourceError> {
    for (id, value) in patch {
        let mut node = &mut *tree;
        let segments: Vec<&str> = id.split('.').collect();
        for (depth, segment) in segments.iter().enumerate() {
            let through_leaf = || SourceError::PathThroughLeaf {
                id: id.clone(),
                leaf: segments[..depth].join("."),
            };
            let Value::Object(map) = node else {
                return Err(through_leaf());
            };
            if is_leaf_map(map) {
                return Err(through_leaf());
            }
            node = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        match node {
            Value::Object(map) => {
                map.insert("$value".to_string(), value.to_json());
            }
            other => *other = serde_json::json!({ "$value": value.to_json() }),
        }
    }
    Ok(())
}

/// Load an overrides file: flat `{ "id": value }`.
pub fn load_overrides(path: &Path) -> Result<BTreeMap<String, TokenValue>, SourceError> {
    let doc = read_json(path)?;
    serde_json::from_value(doc).map_err(|source| SourceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_deep_merge_later_wins() {
        let mut base = json!({
            "color": { "$type": "color", "bg": { "$value": "#fff" }, "fg": { "$value": "#000" } }
        });
        deep_merge(
            &mut base,
            json!({ "color": { "bg": { "$value": "#111" }, "accent": { "$value": "red" } } }),
        );
        assert_eq!(
            base,
            json!({
                "color": {
                    "$type": "color",
                    "bg": { "$value": "#111" },
                    "fg": { "$value": "#000" },
                    "accent": { "$value": "red" }
                }
            })
        );
    }

    #[test]
    fn test_leaf_replaces_group() {
        let mut base = json!({ "space": { "sm": { "$value": "4px" } } });
        deep_merge(&mut base, json!({ "space": { "$value": "8px" } }));
        assert_eq!(base, json!({ "space": { "$value": "8px" } }));
    }

    #[test]
    fn test_apply_overrides_creates_and_keeps_type() {
        let mut tree = json!({ "size": { "h1": { "$type": "dimension", "$value": "2rem" } } });
        let patch = BTreeMap::from([
            ("size.h1".to_string(), TokenValue::from("3rem")),
            ("size.new.deep".to_string(), TokenValue::Number(4.0)),
        ]);
        apply_overrides(&mut tree, &patch).unwrap();
        assert_eq!(tree["size"]["h1"], json!({ "$type": "dimension", "$value": "3rem" }));
        assert_eq!(tree["size"]["new"]["deep"]["$value"], json!(4.0));
    }

    #[test]
    fn test_override_through_leaf_fails() {
        let mut tree = json!({ "size": { "$value": "1px" } });
        let patch = BTreeMap::from([("size.h1".to_string(), TokenValue::from("3rem"))]);
        let err = apply_overrides(&mut tree, &patch).unwrap_err();
        assert!(matches!(err, SourceError::PathThroughLeaf { ref leaf, .. } if leaf == "size"));
    }

    #[test]
    fn test_load_tree_merges_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        fs::write(&a, r#"{ "x": { "$value": "1px" }, "y": { "$value": "2px" } }"#).unwrap();
        fs::write(&b, r#"{ "y": { "$value": "3px" } }"#).unwrap();
        let tree = load_tree(&[&a, &b]).unwrap();
        assert_eq!(tree, json!({ "x": { "$value": "1px" }, "y": { "$value": "3px" } }));

        fs::write(&b, "[1, 2]").unwrap();
        assert!(matches!(load_tree(&[&a, &b]), Err(SourceError::NotAnObject { .. })));
    }
}
