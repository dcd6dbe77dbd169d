//! Cross-axis plugin - relations between tokens on different axes.
//!
//! Two rule shapes:
//! - conditional: when `when.id op valuePx` holds, `require.id op (ref | fallbackPx)` must hold
//! - pairwise: `a op b + delta`
//!
//! Sizes come from the first px/rem/em length in the value, so
//! `clamp(1rem, 2vw, 2rem)` reads as 16px.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::units::first_length_px;
use crate::validation::{pair_id, touches, ConstraintIssue, ConstraintPlugin, TokenView};

use super::{fmt_px, Comparison};

const RULE: &str = "cross-axis";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    pub id: String,
    pub op: Comparison,
    pub value_px: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub id: String,
    pub op: Comparison,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_px: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairCompare {
    pub a: String,
    pub op: Comparison,
    pub b: String,
    #[serde(default)]
    pub delta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CrossAxisRule {
    Conditional {
        when: Predicate,
        require: Requirement,
        #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
    Compare {
        compare: PairCompare,
        #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
}

impl CrossAxisRule {
    pub fn participants(&self) -> Vec<&str> {
        match self {
            CrossAxisRule::Conditional { when, require, .. } => {
                let mut ids = vec![when.id.as_str(), require.id.as_str()];
                ids.extend(require.reference.as_deref());
                ids
            }
            CrossAxisRule::Compare { compare, .. } => vec![compare.a.as_str(), compare.b.as_str()],
        }
    }

    fn location(&self) -> Option<&str> {
        match self {
            CrossAxisRule::Conditional { location, .. } | CrossAxisRule::Compare { location, .. } => {
                location.as_deref()
            }
        }
    }
}

fn size_of(view: &dyn TokenView, id: &str) -> Result<f64, String> {
    let value = view.value(id).ok_or_else(|| format!("unknown token '{}'", id))?;
    value
        .as_number()
        .or_else(|| first_length_px(&value.as_text()))
        .ok_or_else(|| format!("no length in {}: '{}'", id, value))
}

pub struct CrossAxisPlugin {
    rules: Vec<CrossAxisRule>,
}

impl CrossAxisPlugin {
    pub fn new(rules: Vec<CrossAxisRule>) -> Self {
        Self { rules }
    }

    fn conditional(
        when: &Predicate,
        require: &Requirement,
        view: &dyn TokenView,
    ) -> Result<Option<String>, String> {
        let trigger = size_of(view, &when.id)?;
        if !when.op.holds(trigger, when.value_px) {
            return Ok(None);
        }
        let target = match &require.reference {
            Some(r) => match size_of(view, r) {
                Ok(v) => v,
                Err(reason) => require.fallback_px.ok_or(reason)?,
            },
            None => require
                .fallback_px
                .ok_or_else(|| format!("requirement on {} has neither ref nor fallbackPx", require.id))?,
        };
        let actual = size_of(view, &require.id)?;
        if require.op.holds(actual, target) {
            return Ok(None);
        }
        Ok(Some(format!(
            "when {} {} {} ({}), {} must be {} {} but is {}",
            when.id,
            when.op.symbol(),
            fmt_px(when.value_px),
            fmt_px(trigger),
            require.id,
            require.op.symbol(),
            fmt_px(target),
            fmt_px(actual)
        )))
    }

    fn compare(c: &PairCompare, view: &dyn TokenView) -> Result<Option<String>, String> {
        let a = size_of(view, &c.a)?;
        let b = size_of(view, &c.b)?;
        if c.op.holds(a, b + c.delta) {
            return Ok(None);
        }
        let rhs = if c.delta == 0.0 {
            c.b.clone()
        } else {
            format!("{} + {}", c.b, fmt_px(c.delta))
        };
        Ok(Some(format!(
            "{} {} {} violated ({} vs {})",
            c.a,
            c.op.symbol(),
            rhs,
            fmt_px(a),
            fmt_px(b + c.delta)
        )))
    }
}

impl ConstraintPlugin for CrossAxisPlugin {
    fn id(&self) -> &str {
        RULE
    }

    fn evaluate(&self, view: &dyn TokenView, candidates: &BTreeSet<String>) -> Vec<ConstraintIssue> {
        let mut issues = Vec::new();
        for rule in &self.rules {
            if !touches(candidates, &rule.participants()) {
                continue;
            }
            let (id, outcome) = match rule {
                CrossAxisRule::Conditional { when, require, .. } => {
                    (pair_id(&when.id, &require.id), Self::conditional(when, require, view))
                }
                CrossAxisRule::Compare { compare, .. } => {
                    (pair_id(&compare.a, &compare.b), Self::compare(compare, view))
                }
            };
            let issue = match outcome {
                Ok(None) => continue,
                Ok(Some(message)) => ConstraintIssue::error(id, RULE, message),
                Err(reason) => ConstraintIssue::warn(id, RULE, reason),
            };
            issues.push(issue.with_where(rule.location()));
        }
        issues
    }
}
