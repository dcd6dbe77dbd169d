//! Dependency Graph - Immutable Reference Adjacency
//!
//! Edges point from a referenced token to the token that cites it.
//! Built once, then only read.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// referenced -> dependents
    successors: BTreeMap<String, BTreeSet<String>>,
    /// dependent -> referenced
    predecessors: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Build from `(referenced, dependent)` edges. Both endpoints become nodes.
    pub fn from_edges<I, S>(edges: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Self::build(std::iter::empty::<String>(), edges)
    }

    /// Build with an explicit node set, so isolated tokens are present too.
    pub fn build<N, I, S>(nodes: N, edges: I) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut graph = Self::default();
        for node in nodes {
            let node = node.into();
            graph.successors.entry(node.clone()).or_default();
            graph.predecessors.entry(node).or_default();
        }
        for (from, to) in edges {
            let (from, to) = (from.into(), to.into());
            graph.successors.entry(to.clone()).or_default();
            graph.predecessors.entry(from.clone()).or_default();
            graph.successors.entry(from.clone()).or_default().insert(to.clone());
            graph.predecessors.entry(to).or_default().insert(from);
        }
        graph
    }

    pub fn contains(&self, id: &str) -> bool {
        self.successors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.successors.keys().map(String::as_str)
    }

    pub fn edge_count(&self) -> usize {
        self.successors.values().map(BTreeSet::len).sum()
    }

    /// Tokens that cite `id` directly.
    pub fn dependents(&self, id: &str) -> impl Iterator<Item = &str> {
        self.successors.get(id).into_iter().flatten().map(String::as_str)
    }

    /// Tokens that `id` cites directly.
    pub fn references(&self, id: &str) -> impl Iterator<Item = &str> {
        self.predecessors.get(id).into_iter().flatten().map(String::as_str)
    }

    /// Every id reachable forward from `id`, excluding `id` itself. Sorted.
    pub fn affected(&self, id: &str) -> Vec<String> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut stack: Vec<&str> = self.dependents(id).collect();

        while let Some(node) = stack.pop() {
            if node == id || !seen.insert(node) {
                continue;
            }
            stack.extend(self.dependents(node));
        }

        seen.into_iter().map(str::to_string).collect()
    }

    /// Kahn's algorithm over `subset` (or all nodes). Edges leaving the subset
    /// are ignored. Returns the topological order and the nodes left over
    /// because they sit on or behind a cycle.
    pub fn kahn_order(&self, subset: Option<&BTreeSet<String>>) -> (Vec<String>, Vec<String>) {
        let in_scope = |id: &str| subset.map_or(true, |s| s.contains(id));

        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        for node in self.nodes().filter(|n| in_scope(*n)) {
            let degree = self.references(node).filter(|r| in_scope(*r)).count();
            in_degree.insert(node, degree);
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&k, _)| k)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            for dependent in self.dependents(node) {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        let done: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let stuck = in_degree
            .keys()
            .filter(|k| !done.contains(*k))
            .map(|k| k.to_string())
            .collect();
        (order, stuck)
    }

    /// Walk references from the first stuck node until one repeats.
    /// Returns the closed cycle, e.g. `[a, b, a]` for `a -> b -> a`.
    pub fn find_cycle(&self, stuck: &[String]) -> Option<Vec<String>> {
        let stuck_set: BTreeSet<&str> = stuck.iter().map(String::as_str).collect();
        let mut path: Vec<&str> = vec![stuck.first()?.as_str()];

        loop {
            let current = *path.last()?;
            let next = self.references(current).find(|r| stuck_set.contains(r))?;
            if let Some(pos) = path.iter().position(|p| *p == next) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
                cycle.push(next.to_string());
                return Some(cycle);
            }
            path.push(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> DependencyGraph {
        // a <- b <- c, a <- d
        DependencyGraph::build(["e"], [("a", "b"), ("b", "c"), ("a", "d")])
    }

    #[test]
    fn test_affected_is_transitive_and_excludes_self() {
        let g = chain();
        assert_eq!(g.affected("a"), vec!["b", "c", "d"]);
        assert_eq!(g.affected("b"), vec!["c"]);
        assert!(g.affected("c").is_empty());
        assert!(g.affected("missing").is_empty());
    }

    #[test]
    fn test_endpoints_are_nodes() {
        let g = chain();
        for id in ["a", "b", "c", "d", "e"] {
            assert!(g.contains(id));
        }
        assert_eq!(g.edge_count(), 3);
    }

    #[test]
    fn test_kahn_order_respects_edges() {
        let (order, stuck) = chain().kahn_order(None);
        assert!(stuck.is_empty());
        let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
        assert_eq!(order.len(), 5);
    }

    #[test]
    fn test_cycle_is_found_from_stuck_nodes() {
        let g = DependencyGraph::from_edges([("a", "b"), ("b", "a"), ("b", "c")]);
        let (order, stuck) = g.kahn_order(None);
        assert!(order.is_empty());
        assert_eq!(stuck, vec!["a", "b", "c"]);
        assert_eq!(g.find_cycle(&stuck).unwrap(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_affected_terminates_on_cycles() {
        let g = DependencyGraph::from_edges([("a", "b"), ("b", "a")]);
        assert_eq!(g.affected("a"), vec!["b"]);
    }
}
