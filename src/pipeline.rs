//! Validation Pipeline - Single Entry Point
//!
//! Every command goes through here: resolve the tree, build the engine,
//! register the configured plugins in a fixed order, report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::{ConfigError, OrderEntry, RuleSet};
use crate::engine::ConstraintEngine;
use crate::expr::{EvalError, Evaluator, Expr, Scope, TraceStep};
use crate::hashing::snapshot_hash;
use crate::plugins::{
    ContrastPlugin, CrossAxisPlugin, MonotonicPlugin, ThresholdPlugin, TokenScope,
};
use crate::poset::{Digraph, RenderOptions};
use crate::sources::SourceError;
use crate::tokens::{flatten, ResolveError, TokenId, TokenValue};
use crate::validation::{summarize, ConstraintIssue, LevelCounts};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("Unknown token: {0}")]
    UnknownToken(String),

    #[error("No order declared for axis '{0}'")]
    UnknownAxis(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub engine_version: String,
    pub generated_at: DateTime<Utc>,
    pub snapshot_hash: String,
    pub token_count: usize,
    pub issues: Vec<ConstraintIssue>,
    /// Order cycles per axis; reported, never fatal.
    pub cycles: BTreeMap<String, Vec<Vec<String>>>,
    pub summary: BTreeMap<String, LevelCounts>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReport {
    pub affected: Vec<TokenId>,
    pub issues: Vec<ConstraintIssue>,
    pub patch: BTreeMap<TokenId, TokenValue>,
    pub snapshot_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub value: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TraceStep>,
}

/// Reduced order graph for one axis plus what is currently broken in it.
#[derive(Debug, Clone)]
pub struct HasseView {
    pub axis: String,
    pub graph: Digraph,
    pub cycles: Vec<Vec<String>>,
    /// `(greater, lesser)` edges whose declaration does not hold.
    pub violations: BTreeMap<(String, String), String>,
}

impl HasseView {
    pub fn render_options(&self, title: Option<String>) -> RenderOptions {
        RenderOptions {
            title,
            highlight_nodes: self
                .violations
                .keys()
                .flat_map(|(a, b)| [a.clone(), b.clone()])
                .collect(),
            highlight_edges: self.violations.keys().cloned().collect(),
            edge_labels: self.violations.clone(),
        }
    }
}

pub struct ValidationPipeline {
    rules: RuleSet,
}

impl ValidationPipeline {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn monotonic(entry: &OrderEntry) -> MonotonicPlugin {
        MonotonicPlugin::new(&entry.axis, entry.triples().to_vec(), entry.parser)
            .with_where(entry.location.clone())
    }

    /// Resolve `tree` and register plugins: contrast, thresholds, orders, cross-axis.
    pub fn build_engine(&self, tree: &Value) -> Result<ConstraintEngine, PipelineError> {
        let resolution = flatten(tree)?;
        let mut engine = ConstraintEngine::from_resolution(&resolution);

        if !self.rules.contrast.is_empty() {
            engine.register(Box::new(ContrastPlugin::new(self.rules.contrast.clone())));
        }
        if !self.rules.thresholds.is_empty() {
            engine.register(Box::new(
                ThresholdPlugin::new(self.rules.thresholds.clone()).with_limits(self.rules.limits),
            ));
        }
        for entry in &self.rules.orders {
            engine.register(Box::new(Self::monotonic(entry)));
        }
        if !self.rules.cross_axis.is_empty() {
            engine.register(Box::new(CrossAxisPlugin::new(self.rules.cross_axis.clone())));
        }
        Ok(engine)
    }

    pub fn validate(&self, tree: &Value) -> Result<ValidationReport, PipelineError> {
        let engine = self.build_engine(tree)?;
        let issues = engine.evaluate_all();

        let mut cycles = BTreeMap::new();
        for entry in &self.rules.orders {
            let found = Digraph::from_triples(entry.triples()).detect_cycles();
            if !found.is_empty() {
                tracing::debug!(axis = %entry.axis, cycles = found.len(), "order cycles detected");
                cycles.insert(entry.axis.clone(), found);
            }
        }

        let valid = !issues.iter().any(ConstraintIssue::is_error);
        tracing::debug!(tokens = engine.values().len(), issues = issues.len(), valid, "validated");

        Ok(ValidationReport {
            valid,
            engine_version: ENGINE_VERSION.to_string(),
            generated_at: Utc::now(),
            snapshot_hash: snapshot_hash(engine.values())?,
            token_count: engine.values().len(),
            summary: summarize(&issues),
            issues,
            cycles,
        })
    }

    pub fn commit(&self, tree: &Value, id: &str, value: TokenValue) -> Result<CommitReport, PipelineError> {
        let mut engine = self.build_engine(tree)?;
        if engine.get(id).is_none() {
            return Err(PipelineError::UnknownToken(id.to_string()));
        }
        let result = engine.commit(id, value);
        Ok(CommitReport {
            snapshot_hash: snapshot_hash(engine.values())?,
            affected: result.affected,
            issues: result.issues,
            patch: result.patch,
        })
    }

    pub fn hasse(&self, tree: &Value, axis: &str) -> Result<HasseView, PipelineError> {
        let entry = self
            .rules
            .order(axis)
            .ok_or_else(|| PipelineError::UnknownAxis(axis.to_string()))?;
        let engine = self.build_engine(tree)?;
        let full = Digraph::from_triples(entry.triples());

        let plugin = Self::monotonic(entry);
        let violations: BTreeMap<(String, String), String> = plugin
            .violations(&engine)
            .iter()
            .map(|v| {
                let (greater, lesser) = v.triple.edge();
                ((greater.to_string(), lesser.to_string()), plugin.describe(v))
            })
            .collect();

        // Violated edges stay visible even when reduction made them redundant.
        let mut graph = full.transitive_reduction();
        for (greater, lesser) in violations.keys() {
            if !graph.has_edge(greater, lesser) {
                graph.add_edge(greater, lesser);
            }
        }

        Ok(HasseView {
            axis: axis.to_string(),
            cycles: full.detect_cycles(),
            graph,
            violations,
        })
    }

    /// Evaluate `expr` with refs bound to resolved token sizes in px.
    pub fn eval(&self, tree: &Value, expr: &Expr, trace: bool) -> Result<EvalReport, PipelineError> {
        let engine = self.build_engine(tree)?;
        let scope = TokenScope(&engine);
        let mut evaluator = Evaluator::new(&scope as &dyn Scope, self.rules.limits);
        if trace {
            evaluator = evaluator.with_trace();
        }
        let value = evaluator.evaluate(expr)?;
        Ok(EvalReport {
            value,
            trace: evaluator.take_trace(),
        })
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::new(RuleSet::default())
    }
}
