//! Expression Evaluator - Guarded Arithmetic/Boolean Trees
//!
//! Wire form is JSON: a bare number, `{"ref": "id"}`, `{"add": [a, b]}`
//! (likewise sub/mul/div/pow/min/max/eq/lt/gt), `{"clamp": [v, lo, hi]}`,
//! or `{"piecewise": {"branches": [{"when": c, "then": x}], "else": y}}`.
//!
//! Guards run on every node: node-count ceiling before evaluation starts,
//! finite and bounded magnitudes, epsilon division check, operand types.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Denominators smaller than this are a division by zero.
pub const DIV_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Lt,
    Gt,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Pow => "pow",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
        }
    }
}

impl CompareOp {
    pub fn name(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Lt => "lt",
            CompareOp::Gt => "gt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawExpr", into = "RawExpr")]
pub enum Expr {
    Num(f64),
    Ref(String),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Clamp(Box<Expr>, Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Piecewise { branches: Vec<Branch>, otherwise: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub when: Expr,
    pub then: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RawPiecewise {
    branches: Vec<Branch>,
    #[serde(rename = "else")]
    otherwise: Box<Expr>,
}

/// JSON shape of [`Expr`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawExpr {
    Ref(String),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    Clamp(Box<Expr>, Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Piecewise(RawPiecewise),
    #[serde(untagged)]
    Num(f64),
}

impl From<RawExpr> for Expr {
    fn from(raw: RawExpr) -> Self {
        use BinaryOp::*;
        match raw {
            RawExpr::Num(n) => Expr::Num(n),
            RawExpr::Ref(id) => Expr::Ref(id),
            RawExpr::Add(a, b) => Expr::Binary(Add, a, b),
            RawExpr::Sub(a, b) => Expr::Binary(Sub, a, b),
            RawExpr::Mul(a, b) => Expr::Binary(Mul, a, b),
            RawExpr::Div(a, b) => Expr::Binary(Div, a, b),
            RawExpr::Pow(a, b) => Expr::Binary(Pow, a, b),
            RawExpr::Min(a, b) => Expr::Binary(Min, a, b),
            RawExpr::Max(a, b) => Expr::Binary(Max, a, b),
            RawExpr::Clamp(v, lo, hi) => Expr::Clamp(v, lo, hi),
            RawExpr::Eq(a, b) => Expr::Compare(CompareOp::Eq, a, b),
            RawExpr::Lt(a, b) => Expr::Compare(CompareOp::Lt, a, b),
            RawExpr::Gt(a, b) => Expr::Compare(CompareOp::Gt, a, b),
            RawExpr::Piecewise(p) => Expr::Piecewise { branches: p.branches, otherwise: p.otherwise },
        }
    }
}

impl From<Expr> for RawExpr {
    fn from(expr: Expr) -> Self {
        match expr {
            Expr::Num(n) => RawExpr::Num(n),
            Expr::Ref(id) => RawExpr::Ref(id),
            Expr::Binary(op, a, b) => match op {
                BinaryOp::Add => RawExpr::Add(a, b),
                BinaryOp::Sub => RawExpr::Sub(a, b),
                BinaryOp::Mul => RawExpr::Mul(a, b),
                BinaryOp::Div => RawExpr::Div(a, b),
                BinaryOp::Pow => RawExpr::Pow(a, b),
                BinaryOp::Min => RawExpr::Min(a, b),
                BinaryOp::Max => RawExpr::Max(a, b),
            },
            Expr::Clamp(v, lo, hi) => RawExpr::Clamp(v, lo, hi),
            Expr::Compare(op, a, b) => match op {
                CompareOp::Eq => RawExpr::Eq(a, b),
                CompareOp::Lt => RawExpr::Lt(a, b),
                CompareOp::Gt => RawExpr::Gt(a, b),
            },
            Expr::Piecewise { branches, otherwise } => {
                RawExpr::Piecewise(RawPiecewise { branches, otherwise })
            }
        }
    }
}

impl Expr {
    pub fn node_count(&self) -> usize {
        1 + match self {
            Expr::Num(_) | Expr::Ref(_) => 0,
            Expr::Binary(_, a, b) | Expr::Compare(_, a, b) => a.node_count() + b.node_count(),
            Expr::Clamp(v, lo, hi) => v.node_count() + lo.node_count() + hi.node_count(),
            Expr::Piecewise { branches, otherwise } => {
                branches
                    .iter()
                    .map(|b| b.when.node_count() + b.then.node_count())
                    .sum::<usize>()
                    + otherwise.node_count()
            }
        }
    }

    /// Every id cited by a `ref` node.
    pub fn refs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Num(_) => {}
            Expr::Ref(id) => out.push(id),
            Expr::Binary(_, a, b) | Expr::Compare(_, a, b) => {
                a.collect_refs(out);
                b.collect_refs(out);
            }
            Expr::Clamp(v, lo, hi) => {
                v.collect_refs(out);
                lo.collect_refs(out);
                hi.collect_refs(out);
            }
            Expr::Piecewise { branches, otherwise } => {
                for b in branches {
                    b.when.collect_refs(out);
                    b.then.collect_refs(out);
                }
                otherwise.collect_refs(out);
            }
        }
    }
}

/// Intermediate result of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Num(f64),
    Bool(bool),
}

impl Scalar {
    fn kind(&self) -> &'static str {
        match self {
            Scalar::Num(_) => "number",
            Scalar::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Num(n) => write!(f, "{}", n),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// One visited node: operator, operand values, result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStep {
    pub op: &'static str,
    pub inputs: Vec<Scalar>,
    pub result: Scalar,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalLimits {
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    #[serde(default = "default_max_magnitude")]
    pub max_magnitude: f64,
}

fn default_max_nodes() -> usize { 256 }
fn default_max_magnitude() -> f64 { 1e9 }

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            max_magnitude: default_max_magnitude(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("Expression has {count} nodes, limit is {max}")]
    TooManyNodes { count: usize, max: usize },

    #[error("Unknown reference '{id}'")]
    UnknownReference { id: String },

    #[error("Non-finite value from {op}")]
    NonFinite { op: &'static str },

    #[error("Value {value} from {op} exceeds magnitude limit {max}")]
    MagnitudeExceeded { op: &'static str, value: f64, max: f64 },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Type mismatch in {op}: expected {expected}, found {found}")]
    TypeMismatch { op: &'static str, expected: &'static str, found: &'static str },

    #[error("Expression evaluates to a boolean, a number is required")]
    BooleanResult,
}

impl EvalError {
    pub fn code(&self) -> &'static str {
        match self {
            EvalError::TooManyNodes { .. } => "too_many_nodes",
            EvalError::UnknownReference { .. } => "unknown_reference",
            EvalError::NonFinite { .. } => "non_finite",
            EvalError::MagnitudeExceeded { .. } => "magnitude_exceeded",
            EvalError::DivisionByZero => "division_by_zero",
            EvalError::TypeMismatch { .. } => "type_mismatch",
            EvalError::BooleanResult => "boolean_result",
        }
    }
}

/// Resolves `ref` nodes to numbers.
pub trait Scope {
    fn lookup(&self, id: &str) -> Option<f64>;
}

impl Scope for BTreeMap<String, f64> {
    fn lookup(&self, id: &str) -> Option<f64> {
        self.get(id).copied()
    }
}

impl Scope for HashMap<String, f64> {
    fn lookup(&self, id: &str) -> Option<f64> {
        self.get(id).copied()
    }
}

/// Expression evaluator.
pub struct Evaluator<'s> {
    scope: &'s dyn Scope,
    limits: EvalLimits,
    trace: Option<Vec<TraceStep>>,
}

impl<'s> Evaluator<'s> {
    pub fn new(scope: &'s dyn Scope, limits: EvalLimits) -> Self {
        Self { scope, limits, trace: None }
    }

    /// Record a [`TraceStep`] for every visited node.
    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Vec::new());
        self
    }

    pub fn trace(&self) -> &[TraceStep] {
        self.trace.as_deref().unwrap_or(&[])
    }

    pub fn take_trace(&mut self) -> Vec<TraceStep> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Evaluate to a number. A boolean at the top level is an error.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<f64, EvalError> {
        let count = expr.node_count();
        if count > self.limits.max_nodes {
            return Err(EvalError::TooManyNodes { count, max: self.limits.max_nodes });
        }
        match self.eval(expr)? {
            Scalar::Num(n) => Ok(n),
            Scalar::Bool(_) => Err(EvalError::BooleanResult),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Scalar, EvalError> {
        let (op, inputs, result) = match expr {
            Expr::Num(n) => ("literal", vec![], Scalar::Num(self.check("literal", *n)?)),
            Expr::Ref(id) => {
                let v = self
                    .scope
                    .lookup(id)
                    .ok_or_else(|| EvalError::UnknownReference { id: id.clone() })?;
                ("ref", vec![], Scalar::Num(self.check("ref", v)?))
            }
            Expr::Binary(op, a, b) => {
                let name = op.name();
                let x = self.number(name, a)?;
                let y = self.number(name, b)?;
                let v = match op {
                    BinaryOp::Add => x + y,
                    BinaryOp::Sub => x - y,
                    BinaryOp::Mul => x * y,
                    BinaryOp::Div => {
                        if y.abs() < DIV_EPSILON {
                            return Err(EvalError::DivisionByZero);
                        }
                        x / y
                    }
                    BinaryOp::Pow => x.powf(y),
                    BinaryOp::Min => x.min(y),
                    BinaryOp::Max => x.max(y),
                };
                (name, vec![Scalar::Num(x), Scalar::Num(y)], Scalar::Num(self.check(name, v)?))
            }
            Expr::Clamp(v, lo, hi) => {
                let x = self.number("clamp", v)?;
                let lo = self.number("clamp", lo)?;
                let hi = self.number("clamp", hi)?;
                // lower bound wins when lo > hi
                let r = x.min(hi).max(lo);
                (
                    "clamp",
                    vec![Scalar::Num(x), Scalar::Num(lo), Scalar::Num(hi)],
                    Scalar::Num(self.check("clamp", r)?),
                )
            }
            Expr::Compare(op, a, b) => {
                let name = op.name();
                let x = self.number(name, a)?;
                let y = self.number(name, b)?;
                let r = match op {
                    CompareOp::Eq => x == y,
                    CompareOp::Lt => x < y,
                    CompareOp::Gt => x > y,
                };
                (name, vec![Scalar::Num(x), Scalar::Num(y)], Scalar::Bool(r))
            }
            Expr::Piecewise { branches, otherwise } => {
                let mut chosen = None;
                let mut conditions = Vec::new();
                for branch in branches {
                    let hit = self.boolean("piecewise", &branch.when)?;
                    conditions.push(Scalar::Bool(hit));
                    if hit {
                        chosen = Some(&branch.then);
                        break;
                    }
                }
                let result = self.eval(chosen.unwrap_or(otherwise))?;
                ("piecewise", conditions, result)
            }
        };

        if let Some(trace) = self.trace.as_mut() {
            trace.push(TraceStep { op, inputs, result });
        }
        Ok(result)
    }

    fn number(&mut self, op: &'static str, expr: &Expr) -> Result<f64, EvalError> {
        match self.eval(expr)? {
            Scalar::Num(n) => Ok(n),
            other => Err(EvalError::TypeMismatch { op, expected: "number", found: other.kind() }),
        }
    }

    fn boolean(&mut self, op: &'static str, expr: &Expr) -> Result<bool, EvalError> {
        match self.eval(expr)? {
            Scalar::Bool(b) => Ok(b),
            other => Err(EvalError::TypeMismatch { op, expected: "boolean", found: other.kind() }),
        }
    }

    fn check(&self, op: &'static str, value: f64) -> Result<f64, EvalError> {
        if !value.is_finite() {
            return Err(EvalError::NonFinite { op });
        }
        if value.abs() > self.limits.max_magnitude {
            return Err(EvalError::MagnitudeExceeded { op, value, max: self.limits.max_magnitude });
        }
        Ok(value)
    }
}

/// Evaluate `expr` against `scope` without tracing.
pub fn evaluate(expr: &Expr, scope: &dyn Scope, limits: EvalLimits) -> Result<f64, EvalError> {
    Evaluator::new(scope, limits).evaluate(expr)
}
