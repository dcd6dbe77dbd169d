//! Constraint Engine - Incremental Evaluation
//!
//! Holds current values, the dependency graph and the registered plugins.
//! `commit` re-checks only what a single edit could have changed.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::deps::DependencyGraph;
use crate::tokens::{substitute, Resolution, TokenId, TokenValue};
use crate::validation::{ConstraintIssue, ConstraintPlugin, TokenView};

/// Result of a single-value edit.
#[derive(Debug, Clone, Serialize)]
pub struct CommitResult {
    pub affected: Vec<TokenId>,
    pub issues: Vec<ConstraintIssue>,
    pub patch: BTreeMap<TokenId, TokenValue>,
}

pub struct ConstraintEngine {
    values: BTreeMap<TokenId, TokenValue>,
    raw: BTreeMap<TokenId, TokenValue>,
    graph: DependencyGraph,
    plugins: Vec<Box<dyn ConstraintPlugin>>,
}

impl ConstraintEngine {
    /// `edges` are `(referenced, dependent)` pairs.
    pub fn new(values: BTreeMap<TokenId, TokenValue>, edges: &[(TokenId, TokenId)]) -> Self {
        let graph = DependencyGraph::build(values.keys().cloned(), edges.iter().cloned());
        Self {
            raw: values.clone(),
            values,
            graph,
            plugins: Vec::new(),
        }
    }

    pub fn from_resolution(resolution: &Resolution) -> Self {
        let mut engine = Self::new(resolution.values(), &resolution.edges);
        engine.raw = resolution.raws();
        engine
    }

    pub fn register(&mut self, plugin: Box<dyn ConstraintPlugin>) {
        tracing::debug!(plugin = plugin.id(), "registered constraint plugin");
        self.plugins.push(plugin);
    }

    pub fn with_plugin(mut self, plugin: Box<dyn ConstraintPlugin>) -> Self {
        self.register(plugin);
        self
    }

    pub fn plugin_ids(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.id()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&TokenValue> {
        self.values.get(id)
    }

    /// Direct write. No validation, no propagation.
    pub fn set(&mut self, id: &str, value: TokenValue) {
        self.values.insert(id.to_string(), value);
    }

    pub fn values(&self) -> &BTreeMap<TokenId, TokenValue> {
        &self.values
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Every id transitively depending on `id`, excluding `id`.
    pub fn affected(&self, id: &str) -> Vec<TokenId> {
        self.graph.affected(id)
    }

    /// Run every plugin in registration order and concatenate their issues.
    pub fn evaluate(&self, candidates: &BTreeSet<TokenId>) -> Vec<ConstraintIssue> {
        let mut issues = Vec::new();
        for plugin in &self.plugins {
            let found = plugin.evaluate(self, candidates);
            tracing::trace!(plugin = plugin.id(), issues = found.len(), "plugin evaluated");
            issues.extend(found);
        }
        issues
    }

    /// Full pass over every known id.
    pub fn evaluate_all(&self) -> Vec<ConstraintIssue> {
        let candidates: BTreeSet<TokenId> = self.values.keys().cloned().collect();
        self.evaluate(&candidates)
    }

    /// Set one value, refresh the aliases that depend on it, and evaluate
    /// with `{id} ∪ affected(id)` as the candidate set.
    pub fn commit(&mut self, id: &str, value: TokenValue) -> CommitResult {
        let resolved = substitute(&value, |r| self.values.get(r));
        self.raw.insert(id.to_string(), value.clone());
        self.values.insert(id.to_string(), resolved);

        let affected = self.affected(id);
        self.refresh(&affected);

        let mut candidates: BTreeSet<TokenId> = affected.iter().cloned().collect();
        candidates.insert(id.to_string());
        let issues = self.evaluate(&candidates);

        tracing::debug!(
            id,
            affected = affected.len(),
            issues = issues.len(),
            "committed token value"
        );

        CommitResult {
            affected,
            issues,
            patch: BTreeMap::from([(id.to_string(), value)]),
        }
    }

    /// Re-derive `ids` from their raw declarations in dependency order.
    fn refresh(&mut self, ids: &[TokenId]) {
        let subset: BTreeSet<TokenId> = ids.iter().cloned().collect();
        let (order, _) = self.graph.kahn_order(Some(&subset));
        for dep in order {
            let Some(raw) = self.raw.get(&dep) else {
                continue;
            };
            if !raw.has_placeholder() {
                continue;
            }
            let value = substitute(raw, |r| self.values.get(r));
            self.values.insert(dep, value);
        }
    }
}

impl TokenView for ConstraintEngine {
    fn value(&self, id: &str) -> Option<&TokenValue> {
        self.values.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::flatten;
    use crate::validation::pair_id;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Reports one issue per candidate it sees, and records each call.
    struct Echo {
        name: &'static str,
        calls: Rc<RefCell<Vec<BTreeSet<String>>>>,
    }

    impl ConstraintPlugin for Echo {
        fn id(&self) -> &str {
            self.name
        }

        fn evaluate(&self, view: &dyn TokenView, candidates: &BTreeSet<String>) -> Vec<ConstraintIssue> {
            self.calls.borrow_mut().push(candidates.clone());
            candidates
                .iter()
                .map(|c| {
                    let v = view.value(c).map(|v| v.to_string()).unwrap_or_default();
                    ConstraintIssue::warn(c.clone(), self.name, v)
                })
                .collect()
        }
    }

    fn engine() -> ConstraintEngine {
        let tree = json!({
            "base": { "$value": "#000000" },
            "alias": { "$value": "{base}" },
            "shadow": { "$value": "0 1px {alias}" },
            "other": { "$value": "12px" }
        });
        ConstraintEngine::from_resolution(&flatten(&tree).unwrap())
    }

    #[test]
    fn test_get_and_set_are_direct() {
        let mut e = engine();
        e.set("alias", TokenValue::from("#fff"));
        assert_eq!(e.get("alias"), Some(&TokenValue::from("#fff")));
        assert_eq!(e.get("shadow"), Some(&TokenValue::from("0 1px #000000")));
    }

    #[test]
    fn test_commit_reports_affected_and_patch() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut e = engine().with_plugin(Box::new(Echo { name: "echo", calls: calls.clone() }));

        let result = e.commit("base", TokenValue::from("#ffffff"));
        assert_eq!(result.affected, vec!["alias", "shadow"]);
        assert_eq!(result.patch, BTreeMap::from([("base".to_string(), TokenValue::from("#ffffff"))]));

        let seen: Vec<&str> = result.issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(seen, vec!["alias", "base", "shadow"]);
        assert!(!seen.contains(&"other"));

        assert_eq!(e.get("alias"), Some(&TokenValue::from("#ffffff")));
        assert_eq!(e.get("shadow"), Some(&TokenValue::from("0 1px #ffffff")));
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_commit_of_leaf_has_no_affected() {
        let mut e = engine();
        let result = e.commit("other", TokenValue::from("16px"));
        assert!(result.affected.is_empty());
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_commit_resolves_new_aliases_against_current_values() {
        let mut e = engine();
        e.commit("other", TokenValue::from("{base}"));
        assert_eq!(e.get("other"), Some(&TokenValue::from("#000000")));
    }

    #[test]
    fn test_plugins_run_in_registration_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let e = engine()
            .with_plugin(Box::new(Echo { name: "first", calls: calls.clone() }))
            .with_plugin(Box::new(Echo { name: "second", calls: calls.clone() }));
        assert_eq!(e.plugin_ids(), vec!["first", "second"]);

        let candidates: BTreeSet<String> = ["other".to_string()].into();
        let issues = e.evaluate(&candidates);
        let rules: Vec<&str> = issues.iter().map(|i| i.rule.as_str()).collect();
        assert_eq!(rules, vec!["first", "second"]);
        assert_eq!(issues[0].message, "12px");
    }

    #[test]
    fn test_evaluate_all_covers_every_id() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let e = engine().with_plugin(Box::new(Echo { name: "echo", calls }));
        assert_eq!(e.evaluate_all().len(), 4);
        assert_eq!(pair_id("a", "b"), "a|b");
    }
}
