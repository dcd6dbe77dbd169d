//! Built-in constraint plugins.

pub mod contrast;
pub mod cross_axis;
pub mod order;
pub mod threshold;

pub use contrast::{ContrastPair, ContrastPlugin};
pub use cross_axis::{CrossAxisPlugin, CrossAxisRule, PairCompare, Predicate, Requirement};
pub use order::{MonotonicPlugin, ValueParser};
pub use threshold::{ThresholdPlugin, ThresholdRule};

use serde::{Deserialize, Serialize};

use crate::expr::Scope;
use crate::units::parse_size_px;
use crate::validation::TokenView;

/// Comparison operator used in rule documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
}

impl Comparison {
    pub fn holds(&self, a: f64, b: f64) -> bool {
        match self {
            Comparison::Lt => a < b,
            Comparison::Le => a <= b,
            Comparison::Gt => a > b,
            Comparison::Ge => a >= b,
            Comparison::Eq => (a - b).abs() < 1e-9,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
        }
    }
}

/// Resolves expression refs to token sizes in px.
pub struct TokenScope<'a>(pub &'a dyn TokenView);

impl Scope for TokenScope<'_> {
    fn lookup(&self, id: &str) -> Option<f64> {
        self.0.value(id).and_then(|v| parse_size_px(&v.as_text()))
    }
}

/// `16px`, `12.5px` for issue messages.
pub(crate) fn fmt_px(v: f64) -> String {
    format!("{}px", round3(v))
}

pub(crate) fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
