//! Emitters for resolved values: CSS custom properties, flat JSON, JS module.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::{Map, Value};

use crate::tokens::TokenValue;

/// `color.text.muted` -> `--color-text-muted`
pub fn css_var_name(id: &str) -> String {
    format!("--{}", id.replace('.', "-"))
}

pub fn to_css(values: &BTreeMap<String, TokenValue>, selector: &str) -> String {
    let mut out = format!("{} {{\n", selector);
    for (id, value) in values {
        let _ = writeln!(out, "  {}: {};", css_var_name(id), value);
    }
    out.push_str("}\n");
    out
}

fn to_object(values: &BTreeMap<String, TokenValue>) -> Value {
    Value::Object(
        values
            .iter()
            .map(|(id, v)| (id.clone(), v.to_json()))
            .collect::<Map<String, Value>>(),
    )
}

pub fn to_json(values: &BTreeMap<String, TokenValue>) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&to_object(values))
}

pub fn to_js_module(values: &BTreeMap<String, TokenValue>) -> Result<String, serde_json::Error> {
    let body = serde_json::to_string_pretty(&to_object(values))?;
    Ok(format!("export const tokens = {};\nexport default tokens;\n", body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn values() -> BTreeMap<String, TokenValue> {
        BTreeMap::from([
            ("color.text.muted".to_string(), TokenValue::from("#767676")),
            ("line.body".to_string(), TokenValue::Number(1.5)),
        ])
    }

    #[test]
    fn test_css() {
        assert_eq!(
            to_css(&values(), ":root"),
            ":root {\n  --color-text-muted: #767676;\n  --line-body: 1.5;\n}\n"
        );
    }

    #[test]
    fn test_json_keeps_numbers() {
        let parsed: Value = serde_json::from_str(&to_json(&values()).unwrap()).unwrap();
        assert_eq!(parsed["line.body"], serde_json::json!(1.5));
        assert_eq!(parsed["color.text.muted"], "#767676");
    }

    #[test]
    fn test_js_module_shape() {
        let js = to_js_module(&values()).unwrap();
        assert!(js.starts_with("export const tokens = {"));
        assert!(js.ends_with("};\nexport default tokens;\n"));
    }
}
