//! Threshold plugin - a token size compared with a fixed bound or an expression.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::expr::{evaluate, EvalLimits, Expr};
use crate::units::parse_size_px;
use crate::validation::{touches, ConstraintIssue, ConstraintPlugin, TokenView};

use super::{fmt_px, Comparison, TokenScope};

const RULE: &str = "threshold";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdRule {
    pub id: String,
    pub op: Comparison,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_px: Option<f64>,
    /// Bound computed from other tokens; wins over `value_px`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<Expr>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ThresholdRule {
    pub fn fixed(id: impl Into<String>, op: Comparison, value_px: f64) -> Self {
        Self {
            id: id.into(),
            op,
            value_px: Some(value_px),
            expr: None,
            location: None,
        }
    }

    pub fn computed(id: impl Into<String>, op: Comparison, expr: Expr) -> Self {
        Self {
            id: id.into(),
            op,
            value_px: None,
            expr: Some(expr),
            location: None,
        }
    }

    pub fn participants(&self) -> Vec<&str> {
        let mut ids = vec![self.id.as_str()];
        if let Some(expr) = &self.expr {
            for r in expr.refs() {
                if !ids.contains(&r) {
                    ids.push(r);
                }
            }
        }
        ids
    }

    /// Issue id naming every participant, so an issue raised by a change
    /// to a bound's reference still cites that reference.
    fn subject(&self) -> String {
        self.participants().join("|")
    }
}

pub struct ThresholdPlugin {
    rules: Vec<ThresholdRule>,
    limits: EvalLimits,
}

impl ThresholdPlugin {
    pub fn new(rules: Vec<ThresholdRule>) -> Self {
        Self {
            rules,
            limits: EvalLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: EvalLimits) -> Self {
        self.limits = limits;
        self
    }

    fn check(&self, rule: &ThresholdRule, view: &dyn TokenView) -> Option<ConstraintIssue> {
        let subject = rule.subject();
        let warn = |msg: String| Some(ConstraintIssue::warn(&subject, RULE, msg));

        let bound = match (&rule.expr, rule.value_px) {
            (Some(expr), _) => match evaluate(expr, &TokenScope(view), self.limits) {
                Ok(v) => v,
                Err(e) => return warn(format!("bound for {} not computable [{}]: {}", rule.id, e.code(), e)),
            },
            (None, Some(v)) => v,
            (None, None) => return warn(format!("threshold for {} has neither valuePx nor expr", rule.id)),
        };

        let Some(value) = view.value(&rule.id) else {
            return warn(format!("unknown token '{}'", rule.id));
        };
        let Some(actual) = value
            .as_number()
            .or_else(|| parse_size_px(&value.as_text()))
        else {
            return warn(format!("unparseable size for {}: '{}'", rule.id, value));
        };

        if rule.op.holds(actual, bound) {
            return None;
        }
        Some(ConstraintIssue::error(
            &subject,
            RULE,
            format!(
                "{} is {}, expected {} {}",
                rule.id,
                fmt_px(actual),
                rule.op.symbol(),
                fmt_px(bound)
            ),
        ))
    }
}

impl ConstraintPlugin for ThresholdPlugin {
    fn id(&self) -> &str {
        RULE
    }

    fn evaluate(&self, view: &dyn TokenView, candidates: &BTreeSet<String>) -> Vec<ConstraintIssue> {
        self.rules
            .iter()
            .filter(|r| touches(candidates, &r.participants()))
            .filter_map(|r| {
                self.check(r, view)
                    .map(|issue| issue.with_where(r.location.as_deref()))
            })
            .collect()
    }
}
