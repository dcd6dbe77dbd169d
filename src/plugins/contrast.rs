//! Contrast plugin - WCAG ratio between foreground and background.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::color::{contrast_ratio, flatten_over, parse_color, relative_luminance, Rgba};
use crate::validation::{pair_id, touches, ConstraintIssue, ConstraintPlugin, TokenView};

use super::round3;

const RULE: &str = "contrast";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContrastPair {
    pub fg: String,
    pub bg: String,
    pub min: f64,
    /// Opaque surface under a translucent `bg`. White when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backdrop: Option<String>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ContrastPair {
    pub fn new(fg: impl Into<String>, bg: impl Into<String>, min: f64) -> Self {
        Self {
            fg: fg.into(),
            bg: bg.into(),
            min,
            backdrop: None,
            location: None,
        }
    }

    /// Token ids among the operands; literal colors are not participants.
    pub fn participants(&self) -> Vec<&str> {
        [Some(self.fg.as_str()), Some(self.bg.as_str()), self.backdrop.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| parse_color(s).is_none())
            .collect()
    }
}

/// An operand is either a literal color or a token id.
fn resolve(operand: &str, view: &dyn TokenView) -> Result<Rgba, String> {
    if let Some(c) = parse_color(operand) {
        return Ok(c);
    }
    match view.value(operand) {
        Some(v) => parse_color(&v.as_text())
            .ok_or_else(|| format!("unparseable color for {}: '{}'", operand, v)),
        None => Err(format!("unknown token '{}'", operand)),
    }
}

pub struct ContrastPlugin {
    pairs: Vec<ContrastPair>,
}

impl ContrastPlugin {
    pub fn new(pairs: Vec<ContrastPair>) -> Self {
        Self { pairs }
    }

    /// Ratio for one pair after compositing, or the parse failure message.
    pub fn ratio(pair: &ContrastPair, view: &dyn TokenView) -> Result<f64, String> {
        let backdrop = match &pair.backdrop {
            Some(b) => resolve(b, view)?,
            None => Rgba::WHITE,
        };
        let backdrop = flatten_over(&backdrop, &Rgba::WHITE);
        let bg = flatten_over(&resolve(&pair.bg, view)?, &backdrop);
        let fg = flatten_over(&resolve(&pair.fg, view)?, &bg);
        let ratio = contrast_ratio(relative_luminance(&fg), relative_luminance(&bg));
        if !ratio.is_finite() {
            return Err(format!("contrast between {} and {} is not computable", pair.fg, pair.bg));
        }
        Ok(ratio)
    }
}

impl ConstraintPlugin for ContrastPlugin {
    fn id(&self) -> &str {
        RULE
    }

    fn evaluate(&self, view: &dyn TokenView, candidates: &BTreeSet<String>) -> Vec<ConstraintIssue> {
        let mut issues = Vec::new();
        for pair in &self.pairs {
            if !touches(candidates, &pair.participants()) {
                tracing::trace!(fg = %pair.fg, bg = %pair.bg, "contrast pair not a candidate");
                continue;
            }
            let id = pair_id(&pair.fg, &pair.bg);
            match Self::ratio(pair, view) {
                Ok(ratio) if ratio < pair.min => issues.push(
                    ConstraintIssue::error(
                        id,
                        RULE,
                        format!(
                            "contrast {}:1 between {} and {} is below {}:1",
                            round3(ratio),
                            pair.fg,
                            pair.bg,
                            pair.min
                        ),
                    )
                    .with_where(pair.location.as_deref()),
                ),
                Ok(_) => {}
                Err(reason) => issues.push(
                    ConstraintIssue::warn(id, RULE, reason).with_where(pair.location.as_deref()),
                ),
            }
        }
        issues
    }
}
