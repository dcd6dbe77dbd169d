//! Rule Sets - Enforceable Contracts
//!
//! A rule-set document names every constraint the engine enforces. Order
//! entries may point at a separate order-declaration file; those are read
//! at load time relative to the rule-set file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::EvalLimits;
use crate::plugins::{ContrastPair, CrossAxisRule, ThresholdRule, ValueParser};
use crate::poset::{OrderDocument, OrderTriple};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum ConfigError {
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

    #[error("Invalid version '{value}': {source}")]
    InvalidVersion {
        value: String,
        #[source]
        source: semver::Error,
    },

    #[error("Rule set requires engine >= {required}, current is {current}")]
    EngineVersionMismatch { required: String, current: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_min_version: Option<String>,
    #[serde(default)]
    pub contrast: Vec<ContrastPair>,
    #[serde(default)]
    pub thresholds: Vec<ThresholdRule>,
    #[serde(default)]
    pub orders: Vec<OrderEntry>,
    #[serde(default)]
    pub cross_axis: Vec<CrossAxisRule>,
    #[serde(default)]
    pub limits: EvalLimits,
}

/// One order axis: inline triples or a file holding an order document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEntry {
    pub axis: String,
    #[serde(default)]
    pub parser: ValueParser,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<OrderTriple>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl OrderEntry {
    pub fn inline(axis: impl Into<String>, parser: ValueParser, order: Vec<OrderTriple>) -> Self {
        Self {
            axis: axis.into(),
            parser,
            location: None,
            order: Some(order),
            file: None,
        }
    }

    pub fn triples(&self) -> &[OrderTriple] {
        self.order.as_deref().unwrap_or(&[])
    }
}

impl RuleSet {
    /// Read a rule-set file, check the engine version, and pull in order files.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut rules: RuleSet = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        rules.check_engine_version()?;
        rules.resolve_order_files(path.parent().unwrap_or_else(|| Path::new(".")))?;
        tracing::debug!(
            path = %path.display(),
            contrast = rules.contrast.len(),
            thresholds = rules.thresholds.len(),
            orders = rules.orders.len(),
            cross_axis = rules.cross_axis.len(),
            "loaded rule set"
        );
        Ok(rules)
    }

    pub fn check_engine_version(&self) -> Result<(), ConfigError> {
        let Some(required) = &self.engine_min_version else {
            return Ok(());
        };
        let parse = |value: &str| {
            semver::Version::parse(value).map_err(|source| ConfigError::InvalidVersion {
                value: value.to_string(),
                source,
            })
        };
        if parse(ENGINE_VERSION)? < parse(required)? {
            return Err(ConfigError::EngineVersionMismatch {
                required: required.clone(),
                current: ENGINE_VERSION.to_string(),
            });
        }
        Ok(())
    }

    /// Replace every `file` reference with the triples it declares.
    pub fn resolve_order_files(&mut self, base: &Path) -> Result<(), ConfigError> {
        for entry in &mut self.orders {
            if entry.order.is_some() {
                continue;
            }
            let Some(file) = &entry.file else {
                tracing::warn!(axis = %entry.axis, "order entry has neither order nor file, skipped");
                continue;
            };
            let path = base.join(file);
            let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let doc: OrderDocument = serde_json::from_str(&content)
                .map_err(|source| ConfigError::Json { path, source })?;
            entry.order = Some(doc.order);
        }
        Ok(())
    }

    pub fn order(&self, axis: &str) -> Option<&OrderEntry> {
        self.orders.iter().find(|o| o.axis == axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poset::Relation;
    use serde_json::json;

    #[test]
    fn test_defaults_are_empty() {
        let rules: RuleSet = serde_json::from_value(json!({})).unwrap();
        assert!(rules.contrast.is_empty());
        assert!(rules.orders.is_empty());
        assert_eq!(rules.limits, EvalLimits::default());
        assert!(rules.check_engine_version().is_ok());
    }

    #[test]
    fn test_full_document() {
        let rules: RuleSet = serde_json::from_value(json!({
            "engineMinVersion": "0.0.1",
            "contrast": [{ "fg": "text", "bg": "bg", "min": 4.5, "where": "light" }],
            "thresholds": [{ "id": "touch", "op": ">=", "valuePx": 44 }],
            "orders": [{ "axis": "size", "where": "md", "order": [["h1", ">=", "h2"]] }],
            "crossAxis": [{ "compare": { "a": "x", "op": ">=", "b": "y" } }],
            "limits": { "maxNodes": 8 }
        }))
        .unwrap();
        assert!(rules.check_engine_version().is_ok());
        assert_eq!(rules.contrast[0].location.as_deref(), Some("light"));
        let size = rules.order("size").unwrap();
        assert_eq!(size.parser, ValueParser::Size);
        assert_eq!(size.triples(), &[OrderTriple::new("h1", Relation::Ge, "h2")]);
        assert_eq!(rules.limits.max_nodes, 8);
        assert_eq!(rules.limits.max_magnitude, 1e9);
    }

    #[test]
    fn test_engine_version_gate() {
        let rules = RuleSet {
            engine_min_version: Some("99.0.0".into()),
            ..Default::default()
        };
        assert!(matches!(
            rules.check_engine_version(),
            Err(ConfigError::EngineVersionMismatch { .. })
        ));

        let bad = RuleSet {
            engine_min_version: Some("latest".into()),
            ..Default::default()
        };
        assert!(matches!(bad.check_engine_version(), Err(ConfigError::InvalidVersion { .. })));
    }

    #[test]
    fn test_order_file_is_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("order")).unwrap();
        fs::write(
            dir.path().join("order/lightness.json"),
            r#"{ "order": [["gray.100", ">=", "gray.900"]] }"#,
        )
        .unwrap();
        let config = dir.path().join("tokenguard.json");
        fs::write(
            &config,
            r#"{ "orders": [{ "axis": "lightness", "parser": "lightness", "file": "order/lightness.json" }] }"#,
        )
        .unwrap();

        let rules = RuleSet::load(&config).unwrap();
        let entry = rules.order("lightness").unwrap();
        assert_eq!(entry.parser, ValueParser::Lightness);
        assert_eq!(entry.triples().len(), 1);
    }

    #[test]
    fn test_missing_order_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("rules.json");
        fs::write(&config, r#"{ "orders": [{ "axis": "size", "file": "nope.json" }] }"#).unwrap();
        assert!(matches!(RuleSet::load(&config), Err(ConfigError::Io { .. })));
    }
}
