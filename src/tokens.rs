//! Token Resolver - Flattening and Alias Resolution
//!
//! A token tree is nested JSON. Any object carrying `$value` is a leaf;
//! every other object is a group. Leaves are collected under their
//! dot-joined path, `{other.id}` placeholders become dependency edges,
//! and values are resolved in topological order.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::deps::DependencyGraph;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern"));

static WHOLE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{([^{}]+)\}$").expect("alias pattern"));

pub type TokenId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenValue {
    Number(f64),
    Text(String),
}

impl TokenValue {
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            TokenValue::Number(n) => Cow::Owned(n.to_string()),
            TokenValue::Text(s) => Cow::Borrowed(s),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            TokenValue::Number(n) => Some(*n),
            TokenValue::Text(_) => None,
        }
    }

    pub fn has_placeholder(&self) -> bool {
        !self.refs().is_empty()
    }

    /// Ids cited by this value. Composite values only look inside their
    /// string leaves, never at the JSON punctuation around them.
    pub fn refs(&self) -> Vec<TokenId> {
        let text = match self {
            TokenValue::Number(_) => return Vec::new(),
            TokenValue::Text(s) => s,
        };
        let Some(doc) = composite(text) else {
            return extract_refs(text);
        };
        let mut leaves = Vec::new();
        string_leaves(&doc, &mut leaves);
        let mut refs: Vec<TokenId> = Vec::new();
        for id in leaves.into_iter().flat_map(extract_refs) {
            if !refs.contains(&id) {
                refs.push(id);
            }
        }
        refs
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => n.as_f64().map(TokenValue::Number),
            Value::String(s) => Some(TokenValue::Text(s.clone())),
            other => Some(TokenValue::Text(other.to_string())),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            TokenValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            TokenValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for TokenValue {
    fn from(s: &str) -> Self {
        TokenValue::Text(s.to_string())
    }
}

impl From<String> for TokenValue {
    fn from(s: String) -> Self {
        TokenValue::Text(s)
    }
}

impl From<f64> for TokenValue {
    fn from(n: f64) -> Self {
        TokenValue::Number(n)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatToken {
    pub id: TokenId,
    #[serde(rename = "type")]
    pub token_type: Option<String>,
    pub value: TokenValue,
    pub raw: TokenValue,
    pub refs: Vec<TokenId>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("Dangling reference: '{token}' cites '{reference}', which does not exist")]
    DanglingReference { token: String, reference: String },

    #[error("Circular reference: {}", cycle.join(" → "))]
    CircularReference { cycle: Vec<String> },
}

/// Output of a flatten pass.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub flat: BTreeMap<TokenId, FlatToken>,
    /// `(referenced, dependent)` pairs.
    pub edges: Vec<(TokenId, TokenId)>,
}

impl Resolution {
    pub fn get(&self, id: &str) -> Option<&FlatToken> {
        self.flat.get(id)
    }

    pub fn values(&self) -> BTreeMap<TokenId, TokenValue> {
        self.flat.iter().map(|(k, t)| (k.clone(), t.value.clone())).collect()
    }

    pub fn raws(&self) -> BTreeMap<TokenId, TokenValue> {
        self.flat.iter().map(|(k, t)| (k.clone(), t.raw.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }
}

/// Every `{id}` cited by `text`, in first-seen order, without duplicates.
pub fn extract_refs(text: &str) -> Vec<TokenId> {
    let mut refs: Vec<TokenId> = Vec::new();
    for cap in PLACEHOLDER.captures_iter(text) {
        let id = cap[1].trim().to_string();
        if !refs.contains(&id) {
            refs.push(id);
        }
    }
    refs
}

/// Objects and arrays declared as `$value` are stored as compact JSON text.
fn composite(text: &str) -> Option<Value> {
    if !(text.starts_with('{') || text.starts_with('[')) {
        return None;
    }
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

fn string_leaves<'v>(value: &'v Value, out: &mut Vec<&'v str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| string_leaves(v, out)),
        Value::Object(map) => map.values().for_each(|v| string_leaves(v, out)),
        _ => {}
    }
}

/// Replace placeholders in `raw` using `lookup`.
///
/// A value that is exactly one placeholder takes the referenced value as-is,
/// so numeric aliases stay numeric. Unknown ids are left in place. Composite
/// values are substituted leaf by leaf.
pub fn substitute<'a, F>(raw: &TokenValue, lookup: F) -> TokenValue
where
    F: Fn(&str) -> Option<&'a TokenValue>,
{
    let text = match raw {
        TokenValue::Number(_) => return raw.clone(),
        TokenValue::Text(s) => s,
    };
    match composite(text) {
        Some(mut doc) => {
            substitute_leaves(&mut doc, &lookup);
            TokenValue::Text(doc.to_string())
        }
        None => substitute_text(text, &lookup),
    }
}

fn substitute_text<'a>(text: &str, lookup: &dyn Fn(&str) -> Option<&'a TokenValue>) -> TokenValue {
    if let Some(cap) = WHOLE_PLACEHOLDER.captures(text) {
        if let Some(v) = lookup(cap[1].trim()) {
            return v.clone();
        }
    }

    let replaced = PLACEHOLDER.replace_all(text, |cap: &regex::Captures<'_>| {
        lookup(cap[1].trim())
            .map(|v| v.as_text().into_owned())
            .unwrap_or_else(|| cap[0].to_string())
    });
    TokenValue::Text(replaced.into_owned())
}

fn substitute_leaves<'a>(value: &mut Value, lookup: &dyn Fn(&str) -> Option<&'a TokenValue>) {
    match value {
        Value::String(s) => {
            let next = substitute_text(s, lookup).to_json();
            *value = next;
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute_leaves(v, lookup)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute_leaves(v, lookup)),
        _ => {}
    }
}

/// Flatten a token tree and resolve every alias.
pub fn flatten(tree: &Value) -> Result<Resolution, ResolveError> {
    let mut flat = BTreeMap::new();
    let mut path = Vec::new();
    collect(tree, &mut path, None, &mut flat);

    let mut edges = Vec::new();
    for token in flat.values() {
        for reference in &token.refs {
            if !flat.contains_key(reference) {
                return Err(ResolveError::DanglingReference {
                    token: token.id.clone(),
                    reference: reference.clone(),
                });
            }
            edges.push((reference.clone(), token.id.clone()));
        }
    }

    let graph = DependencyGraph::build(flat.keys().cloned(), edges.iter().cloned());
    let (order, stuck) = graph.kahn_order(None);
    if !stuck.is_empty() {
        let cycle = graph.find_cycle(&stuck).unwrap_or(stuck);
        return Err(ResolveError::CircularReference { cycle });
    }

    for id in &order {
        let resolved = match flat.get(id) {
            Some(token) if !token.refs.is_empty() => {
                substitute(&token.raw, |r| flat.get(r).map(|t: &FlatToken| &t.value))
            }
            _ => continue,
        };
        if let Some(token) = flat.get_mut(id) {
            token.value = resolved;
        }
    }

    tracing::debug!(tokens = flat.len(), edges = edges.len(), "flattened token tree");
    Ok(Resolution { flat, edges })
}

fn collect(
    node: &Value,
    path: &mut Vec<String>,
    inherited_type: Option<&str>,
    flat: &mut BTreeMap<TokenId, FlatToken>,
) {
    let Some(map) = node.as_object() else {
        return;
    };
    let own_type = map.get("$type").and_then(Value::as_str).or(inherited_type);

    if let Some(declared) = map.get("$value") {
        if path.is_empty() {
            return;
        }
        let Some(raw) = TokenValue::from_json(declared) else {
            return;
        };
        let id = path.join(".");
        let refs = raw.refs();
        flat.insert(
            id.clone(),
            FlatToken {
                id,
                token_type: own_type.map(str::to_string),
                value: raw.clone(),
                raw,
                refs,
            },
        );
        return;
    }

    for (key, child) in map {
        if key.starts_with('$') {
            continue;
        }
        path.push(key.clone());
        collect(child, path, own_type, flat);
        path.pop();
    }
}
