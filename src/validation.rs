//! Validation System - Plugins and Issues
//!
//! Plugins produce structured issues.
//! The engine decides which ids a pass may report on.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::tokens::TokenValue;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Error,
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstraintIssue {
    /// A token id, or a pair encoded as `a|b`.
    pub id: String,
    pub rule: String,
    pub level: IssueLevel,
    pub message: String,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ConstraintIssue {
    pub fn new(
        id: impl Into<String>,
        rule: impl Into<String>,
        level: IssueLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            rule: rule.into(),
            level,
            message: message.into(),
            location: None,
        }
    }

    pub fn error(id: impl Into<String>, rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, rule, IssueLevel::Error, message)
    }

    pub fn warn(id: impl Into<String>, rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, rule, IssueLevel::Warn, message)
    }

    pub fn with_where(mut self, location: Option<&str>) -> Self {
        self.location = location.map(str::to_string);
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == IssueLevel::Error
    }

    /// Token ids named by `id`, splitting pair ids.
    pub fn token_ids(&self) -> impl Iterator<Item = &str> {
        self.id.split('|')
    }
}

pub fn pair_id(a: &str, b: &str) -> String {
    format!("{}|{}", a, b)
}

/// Read access to current token values.
pub trait TokenView {
    fn value(&self, id: &str) -> Option<&TokenValue>;
}

impl TokenView for BTreeMap<String, TokenValue> {
    fn value(&self, id: &str) -> Option<&TokenValue> {
        self.get(id)
    }
}

/// Constraint plugin trait - produces issues.
///
/// Implementations are stateless across calls and must skip every rule whose
/// participant ids are all absent from `candidates`.
pub trait ConstraintPlugin {
    fn id(&self) -> &str;
    fn evaluate(&self, view: &dyn TokenView, candidates: &BTreeSet<String>) -> Vec<ConstraintIssue>;
}

/// Does any participant appear in the candidate set?
pub fn touches<S: AsRef<str>>(candidates: &BTreeSet<String>, participants: &[S]) -> bool {
    participants.iter().any(|p| candidates.contains(p.as_ref()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCounts {
    pub errors: usize,
    pub warnings: usize,
}

/// Error/warning counts keyed by `where` tag (`*` when untagged).
pub fn summarize(issues: &[ConstraintIssue]) -> BTreeMap<String, LevelCounts> {
    let mut summary: BTreeMap<String, LevelCounts> = BTreeMap::new();
    for issue in issues {
        let key = issue.location.clone().unwrap_or_else(|| "*".to_string());
        let counts = summary.entry(key).or_default();
        match issue.level {
            IssueLevel::Error => counts.errors += 1,
            IssueLevel::Warn => counts.warnings += 1,
        }
    }
    summary
}
