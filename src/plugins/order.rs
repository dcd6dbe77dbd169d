//! Monotonic-order plugin - declared `<=`/`>=` relations must hold numerically.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::color::{oklch_lightness, parse_color, relative_luminance};
use crate::poset::OrderTriple;
use crate::tokens::TokenValue;
use crate::units::{parse_number, parse_size_px};
use crate::validation::{pair_id, touches, ConstraintIssue, ConstraintPlugin, TokenView};

use super::{fmt_px, round3};

/// How a token value becomes a comparable number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueParser {
    /// px, rem/em (16px base) or a bare number.
    #[default]
    Size,
    /// Unitless number only.
    Number,
    /// OKLCH L channel, else relative luminance of the parsed color.
    Lightness,
}

impl ValueParser {
    pub fn parse(&self, value: &TokenValue) -> Option<f64> {
        if let (ValueParser::Size | ValueParser::Number, Some(n)) = (self, value.as_number()) {
            return Some(n);
        }
        let text = value.as_text();
        match self {
            ValueParser::Size => parse_size_px(&text),
            ValueParser::Number => parse_number(&text),
            ValueParser::Lightness => {
                oklch_lightness(&text).or_else(|| parse_color(&text).map(|c| relative_luminance(&c)))
            }
        }
    }

    fn display(&self, v: f64) -> String {
        match self {
            ValueParser::Size => fmt_px(v),
            ValueParser::Number | ValueParser::Lightness => round3(v).to_string(),
        }
    }
}

/// A triple that does not hold, with both parsed sides.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderViolation<'a> {
    pub triple: &'a OrderTriple,
    pub left: f64,
    pub right: f64,
}

pub struct MonotonicPlugin {
    id: String,
    rule: &'static str,
    triples: Vec<OrderTriple>,
    parser: ValueParser,
    location: Option<String>,
}

impl MonotonicPlugin {
    pub fn new(axis: impl Into<String>, triples: Vec<OrderTriple>, parser: ValueParser) -> Self {
        let rule = match parser {
            ValueParser::Lightness => "monotonic-lightness",
            _ => "monotonic",
        };
        Self {
            id: format!("{}:{}", rule, axis.into()),
            rule,
            triples,
            parser,
            location: None,
        }
    }

    pub fn lightness(axis: impl Into<String>, triples: Vec<OrderTriple>) -> Self {
        Self::new(axis, triples, ValueParser::Lightness)
    }

    pub fn with_where(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn triples(&self) -> &[OrderTriple] {
        &self.triples
    }

    fn check<'a>(&self, triple: &'a OrderTriple, view: &dyn TokenView) -> Option<OrderViolation<'a>> {
        let OrderTriple(a, rel, b) = triple;
        let left = view.value(a).and_then(|v| self.parser.parse(v));
        let right = view.value(b).and_then(|v| self.parser.parse(v));
        let (Some(left), Some(right)) = (left, right) else {
            tracing::trace!(%triple, "order triple skipped, side not parseable");
            return None;
        };
        (!rel.holds(left, right)).then_some(OrderViolation { triple, left, right })
    }

    /// Every violated triple, ignoring candidate gating.
    pub fn violations(&self, view: &dyn TokenView) -> Vec<OrderViolation<'_>> {
        self.triples.iter().filter_map(|t| self.check(t, view)).collect()
    }

    pub fn describe(&self, v: &OrderViolation<'_>) -> String {
        format!(
            "{} violated ({} vs {})",
            v.triple,
            self.parser.display(v.left),
            self.parser.display(v.right)
        )
    }
}

impl ConstraintPlugin for MonotonicPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    fn evaluate(&self, view: &dyn TokenView, candidates: &BTreeSet<String>) -> Vec<ConstraintIssue> {
        self.triples
            .iter()
            .filter(|t| touches(candidates, &[t.0.as_str(), t.2.as_str()]))
            .filter_map(|t| self.check(t, view))
            .map(|v| {
                ConstraintIssue::error(pair_id(&v.triple.0, &v.triple.2), self.rule, self.describe(&v))
                    .with_where(self.location.as_deref())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poset::Relation;
    use crate::validation::IssueLevel;
    use std::collections::BTreeMap;

    fn view(pairs: &[(&str, TokenValue)]) -> BTreeMap<String, TokenValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn everything(v: &BTreeMap<String, TokenValue>) -> BTreeSet<String> {
        v.keys().cloned().collect()
    }

    #[test]
    fn test_heading_order_violation() {
        let v = view(&[("h1", "1rem".into()), ("h2", "1.5rem".into())]);
        let plugin = MonotonicPlugin::new(
            "size",
            vec![OrderTriple::new("h1", Relation::Ge, "h2")],
            ValueParser::Size,
        );
        let issues = plugin.evaluate(&v, &everything(&v));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].level, IssueLevel::Error);
        assert_eq!(issues[0].id, "h1|h2");
        assert!(issues[0].message.contains("h1 >= h2"));
        assert_eq!(issues[0].message, "h1 >= h2 violated (16px vs 24px)");
    }

    #[test]
    fn test_unparseable_sides_are_skipped() {
        let v = view(&[("a", "auto".into()), ("b", "12px".into())]);
        let plugin = MonotonicPlugin::new(
            "size",
            vec![
                OrderTriple::new("a", Relation::Le, "b"),
                OrderTriple::new("b", Relation::Le, "missing"),
            ],
            ValueParser::Size,
        );
        assert!(plugin.evaluate(&v, &everything(&v)).is_empty());
    }

    #[test]
    fn test_number_parser_accepts_numeric_tokens() {
        let v = view(&[("lh.tight", TokenValue::Number(1.6)), ("lh.loose", "1.4".into())]);
        let plugin = MonotonicPlugin::new(
            "line-height",
            vec![OrderTriple::new("lh.tight", Relation::Le, "lh.loose")],
            ValueParser::Number,
        );
        let issues = plugin.evaluate(&v, &everything(&v));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "lh.tight <= lh.loose violated (1.6 vs 1.4)");
    }

    #[test]
    fn test_lightness_from_oklch_and_hex() {
        let v = view(&[
            ("brand.100", "oklch(95% 0.02 250)".into()),
            ("brand.900", "oklch(25% 0.1 250)".into()),
            ("gray.100", "#f5f5f5".into()),
            ("gray.900", "#111111".into()),
        ]);
        let plugin = MonotonicPlugin::lightness(
            "lightness",
            vec![
                OrderTriple::new("brand.100", Relation::Ge, "brand.900"),
                OrderTriple::new("gray.100", Relation::Le, "gray.900"),
            ],
        );
        assert_eq!(plugin.id(), "monotonic-lightness:lightness");
        let issues = plugin.evaluate(&v, &everything(&v));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, "gray.100|gray.900");
        assert_eq!(issues[0].rule, "monotonic-lightness");
    }

    #[test]
    fn test_gating_and_where() {
        let v = view(&[("h1", "1rem".into()), ("h2", "1.5rem".into()), ("x", "1px".into())]);
        let plugin = MonotonicPlugin::new(
            "size",
            vec![OrderTriple::new("h1", Relation::Ge, "h2")],
            ValueParser::Size,
        )
        .with_where(Some("md".into()));
        let only_x: BTreeSet<String> = ["x".to_string()].into();
        assert!(plugin.evaluate(&v, &only_x).is_empty());
        let only_h2: BTreeSet<String> = ["h2".to_string()].into();
        let issues = plugin.evaluate(&v, &only_h2);
        assert_eq!(issues[0].location.as_deref(), Some("md"));
        assert_eq!(plugin.violations(&v).len(), 1);
    }
}
