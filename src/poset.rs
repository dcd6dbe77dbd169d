//! Order Engine - Posets and Hasse Diagrams
//!
//! Order triples become a directed graph whose edges point from the
//! greater element to the lesser one: `a >= b` is `a -> b`, `a <= b` is
//! `b -> a`. Every operation here is loop-safe on cyclic input.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
}

impl Relation {
    pub fn symbol(&self) -> &'static str {
        match self {
            Relation::Le => "<=",
            Relation::Ge => ">=",
        }
    }

    pub fn holds(&self, a: f64, b: f64) -> bool {
        match self {
            Relation::Le => a <= b,
            Relation::Ge => a >= b,
        }
    }
}

/// `[a, "<=" | ">=", b]` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTriple(pub String, pub Relation, pub String);

impl OrderTriple {
    pub fn new(a: impl Into<String>, rel: Relation, b: impl Into<String>) -> Self {
        Self(a.into(), rel, b.into())
    }

    /// `(greater, lesser)`
    pub fn edge(&self) -> (&str, &str) {
        match self.1 {
            Relation::Ge => (&self.0, &self.2),
            Relation::Le => (&self.2, &self.0),
        }
    }
}

impl std::fmt::Display for OrderTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.0, self.1.symbol(), self.2)
    }
}

/// An order-declaration document: `{ "order": [[a, "<=", b], ...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderDocument {
    #[serde(default)]
    pub order: Vec<OrderTriple>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Digraph {
    adj: BTreeMap<String, BTreeSet<String>>,
}

impl Digraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_triples(triples: &[OrderTriple]) -> Self {
        let mut g = Self::new();
        for t in triples {
            let (from, to) = t.edge();
            g.add_edge(from, to);
        }
        g
    }

    pub fn add_node(&mut self, id: &str) {
        self.adj.entry(id.to_string()).or_default();
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(to);
        self.adj.entry(from.to_string()).or_default().insert(to.to_string());
    }

    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        self.adj.get_mut(from).map_or(false, |s| s.remove(to))
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.adj.get(from).map_or(false, |s| s.contains(to))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.adj.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.adj.keys().map(String::as_str)
    }

    pub fn successors(&self, id: &str) -> impl Iterator<Item = &str> {
        self.adj.get(id).into_iter().flatten().map(String::as_str)
    }

    pub fn edges(&self) -> Vec<(String, String)> {
        self.adj
            .iter()
            .flat_map(|(from, tos)| tos.iter().map(move |to| (from.clone(), to.clone())))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.adj.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adj.values().map(BTreeSet::len).sum()
    }

    /// Is `to` reachable from `from` without taking the direct `from -> to` edge?
    fn reaches_indirectly(&self, from: &str, to: &str) -> bool {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut stack: Vec<&str> = self.successors(from).filter(|s| *s != to).collect();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if node == from || !visited.insert(node) {
                continue;
            }
            stack.extend(self.successors(node));
        }
        false
    }

    /// Drop every edge implied by a longer path.
    pub fn transitive_reduction(&self) -> Digraph {
        let mut reduced = self.clone();
        for (u, v) in self.edges() {
            if reduced.reaches_indirectly(&u, &v) {
                reduced.remove_edge(&u, &v);
            }
        }
        reduced
    }

    /// Three-color DFS. Each cycle is closed: `[a, b, a]`.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn visit<'a>(
            g: &'a Digraph,
            node: &'a str,
            colors: &mut BTreeMap<&'a str, Color>,
            path: &mut Vec<&'a str>,
            cycles: &mut Vec<Vec<String>>,
        ) {
            colors.insert(node, Color::Gray);
            path.push(node);
            for next in g.successors(node) {
                match colors.get(next).copied().unwrap_or(Color::White) {
                    Color::White => visit(g, next, colors, path, cycles),
                    Color::Gray => {
                        if let Some(pos) = path.iter().position(|p| *p == next) {
                            let mut cycle: Vec<String> =
                                path[pos..].iter().map(|s| s.to_string()).collect();
                            cycle.push(next.to_string());
                            cycles.push(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
            path.pop();
            colors.insert(node, Color::Black);
        }

        let mut colors: BTreeMap<&str, Color> = BTreeMap::new();
        let mut cycles = Vec::new();
        let mut path = Vec::new();
        for node in self.nodes() {
            if colors.get(node).copied().unwrap_or(Color::White) == Color::White {
                visit(self, node, &mut colors, &mut path, &mut cycles);
            }
        }
        cycles
    }

    /// Subgraph on `keep`, with every edge whose endpoints both survive.
    pub fn induced(&self, keep: &BTreeSet<String>) -> Digraph {
        let mut g = Digraph::new();
        for node in self.nodes().filter(|n| keep.contains(*n)) {
            g.add_node(node);
            for to in self.successors(node).filter(|t| keep.contains(*t)) {
                g.add_edge(node, to);
            }
        }
        g
    }

    /// Keep nodes under any of the dotted `prefixes` (whole segments only).
    pub fn filter_by_prefix<S: AsRef<str>>(&self, prefixes: &[S]) -> Digraph {
        let keep = self
            .nodes()
            .filter(|n| prefixes.iter().any(|p| matches_prefix(n, p.as_ref())))
            .map(str::to_string)
            .collect();
        self.induced(&keep)
    }

    /// Drop nodes under any of the dotted `prefixes` (whole segments only).
    pub fn filter_exclude_prefix<S: AsRef<str>>(&self, prefixes: &[S]) -> Digraph {
        let keep = self
            .nodes()
            .filter(|n| !prefixes.iter().any(|p| matches_prefix(n, p.as_ref())))
            .map(str::to_string)
            .collect();
        self.induced(&keep)
    }

    /// Exact ids, or `prefix*` patterns matched against the raw id text.
    pub fn select_seeds<S: AsRef<str>>(&self, patterns: &[S]) -> BTreeSet<String> {
        let mut seeds = BTreeSet::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_suffix('*') {
                Some(prefix) => {
                    seeds.extend(self.nodes().filter(|n| n.starts_with(prefix)).map(str::to_string));
                }
                None if self.contains(pattern) => {
                    seeds.insert(pattern.to_string());
                }
                None => {}
            }
        }
        seeds
    }

    /// Nodes within `k` undirected hops of `seeds`, as an induced directed subgraph.
    pub fn neighborhood(&self, seeds: &BTreeSet<String>, k: usize) -> Digraph {
        let mut undirected: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (from, tos) in &self.adj {
            undirected.entry(from.as_str()).or_default();
            for to in tos {
                undirected.entry(from.as_str()).or_default().insert(to.as_str());
                undirected.entry(to.as_str()).or_default().insert(from.as_str());
            }
        }

        let mut depth: BTreeMap<&str, usize> = BTreeMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        for seed in seeds {
            if let Some((&key, _)) = undirected.get_key_value(seed.as_str()) {
                depth.insert(key, 0);
                queue.push_back(key);
            }
        }

        while let Some(node) = queue.pop_front() {
            let d = depth[node];
            if d >= k {
                continue;
            }
            for &next in undirected.get(node).into_iter().flatten() {
                if !depth.contains_key(next) {
                    depth.insert(next, d + 1);
                    queue.push_back(next);
                }
            }
        }

        let keep = depth.keys().map(|s| s.to_string()).collect();
        self.induced(&keep)
    }

    pub fn to_mermaid(&self, opts: &RenderOptions) -> String {
        let ids = sanitized_ids(self, mermaid_id);
        let mut out = String::new();

        if let Some(title) = &opts.title {
            let _ = writeln!(out, "---\ntitle: {}\n---", mermaid_text(title));
        }
        out.push_str("flowchart TD\n");
        for cycle in self.detect_cycles() {
            let _ = writeln!(out, "  %% cycle: {}", mermaid_text(&cycle.join(" -> ")));
        }
        for node in self.nodes() {
            let _ = writeln!(out, "  {}[\"{}\"]", ids[node], mermaid_text(node));
        }

        let mut highlighted_links = Vec::new();
        for (index, (from, to)) in self.edges().into_iter().enumerate() {
            let key = (from, to);
            match opts.edge_labels.get(&key) {
                Some(label) => {
                    let _ = writeln!(
                        out,
                        "  {} -->|\"{}\"| {}",
                        ids[key.0.as_str()],
                        mermaid_text(label),
                        ids[key.1.as_str()]
                    );
                }
                None => {
                    let _ = writeln!(out, "  {} --> {}", ids[key.0.as_str()], ids[key.1.as_str()]);
                }
            }
            if opts.highlight_edges.contains(&key) {
                highlighted_links.push(index.to_string());
            }
        }

        let marked: Vec<&str> = self
            .nodes()
            .filter(|n| opts.highlight_nodes.contains(*n))
            .map(|n| ids[n].as_str())
            .collect();
        if !marked.is_empty() || !highlighted_links.is_empty() {
            out.push_str("  classDef violation stroke:#d33,stroke-width:2px;\n");
        }
        if !marked.is_empty() {
            let _ = writeln!(out, "  class {} violation;", marked.join(","));
        }
        if !highlighted_links.is_empty() {
            let _ = writeln!(
                out,
                "  linkStyle {} stroke:#d33,stroke-width:2px;",
                highlighted_links.join(",")
            );
        }
        out
    }

    pub fn to_dot(&self, opts: &RenderOptions) -> String {
        let mut out = String::new();
        match &opts.title {
            Some(title) => {
                let _ = writeln!(out, "digraph \"{}\" {{", dot_text(title));
                let _ = writeln!(out, "  label=\"{}\";\n  labelloc=t;", dot_text(title));
            }
            None => out.push_str("digraph hasse {\n"),
        }
        out.push_str("  rankdir=TB;\n  node [shape=box];\n");
        for cycle in self.detect_cycles() {
            let _ = writeln!(out, "  // cycle: {}", dot_text(&cycle.join(" -> ")));
        }
        for node in self.nodes() {
            if opts.highlight_nodes.contains(node) {
                let _ = writeln!(out, "  \"{}\" [color=\"#d33\", penwidth=2];", dot_text(node));
            } else {
                let _ = writeln!(out, "  \"{}\";", dot_text(node));
            }
        }
        for key in self.edges() {
            let mut attrs = Vec::new();
            if let Some(label) = opts.edge_labels.get(&key) {
                attrs.push(format!("label=\"{}\"", dot_text(label)));
            }
            if opts.highlight_edges.contains(&key) {
                attrs.push("color=\"#d33\"".to_string());
                attrs.push("penwidth=2".to_string());
            }
            let attrs = if attrs.is_empty() {
                String::new()
            } else {
                format!(" [{}]", attrs.join(", "))
            };
            let _ = writeln!(out, "  \"{}\" -> \"{}\"{};", dot_text(&key.0), dot_text(&key.1), attrs);
        }
        out.push_str("}\n");
        out
    }
}

/// Rendering knobs shared by both formats.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub title: Option<String>,
    pub highlight_nodes: BTreeSet<String>,
    pub highlight_edges: BTreeSet<(String, String)>,
    pub edge_labels: BTreeMap<(String, String), String>,
}

fn matches_prefix(id: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('.');
    if prefix.is_empty() {
        return false;
    }
    id == prefix || (id.starts_with(prefix) && id[prefix.len()..].starts_with('.'))
}

fn mermaid_id(id: &str) -> String {
    let body: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("n_{}", body)
}

/// One unique format-safe identifier per node.
fn sanitized_ids<'g>(g: &'g Digraph, f: fn(&str) -> String) -> BTreeMap<&'g str, String> {
    let mut taken: BTreeSet<String> = BTreeSet::new();
    let mut ids = BTreeMap::new();
    for node in g.nodes() {
        let base = f(node);
        let mut candidate = base.clone();
        let mut n = 2;
        while taken.contains(&candidate) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        taken.insert(candidate.clone());
        ids.insert(node, candidate);
    }
    ids
}

fn mermaid_text(s: &str) -> String {
    s.replace('"', "#quot;").replace('\n', " ")
}

fn dot_text(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn triple(a: &str, rel: Relation, b: &str) -> OrderTriple {
        OrderTriple::new(a, rel, b)
    }

    fn headings() -> Digraph {
        Digraph::from_triples(&[
            triple("h1", Relation::Ge, "h2"),
            triple("h2", Relation::Ge, "h3"),
            triple("h1", Relation::Ge, "h3"),
        ])
    }

    #[test]
    fn test_edges_point_greater_to_lesser() {
        let g = Digraph::from_triples(&[triple("sm", Relation::Le, "lg")]);
        assert!(g.has_edge("lg", "sm"));
        assert!(!g.has_edge("sm", "lg"));
        assert!(g.contains("sm"));
    }

    #[test]
    fn test_hasse_reduction_removes_implied_edge() {
        let reduced = headings().transitive_reduction();
        assert!(reduced.has_edge("h1", "h2"));
        assert!(reduced.has_edge("h2", "h3"));
        assert!(!reduced.has_edge("h1", "h3"));
        assert_eq!(reduced.edge_count(), 2);
    }

    #[test]
    fn test_reduction_terminates_on_cycles() {
        let g = Digraph::from_triples(&[
            triple("a", Relation::Ge, "b"),
            triple("b", Relation::Ge, "c"),
            triple("c", Relation::Ge, "a"),
        ]);
        let reduced = g.transitive_reduction();
        assert_eq!(reduced.node_count(), 3);
    }

    #[test]
    fn test_cycle_detection() {
        assert!(headings().detect_cycles().is_empty());
        let g = Digraph::from_triples(&[
            triple("a", Relation::Ge, "b"),
            triple("b", Relation::Ge, "a"),
        ]);
        assert_eq!(g.detect_cycles(), vec![vec!["a".to_string(), "b".into(), "a".into()]]);
    }

    #[test]
    fn test_prefix_filters_match_whole_segments() {
        let g = Digraph::from_triples(&[
            triple("size.lg", Relation::Ge, "size.md"),
            triple("sizes.x", Relation::Ge, "size.md"),
            triple("space.lg", Relation::Ge, "space.md"),
        ]);
        let only = g.filter_by_prefix(&["size"]);
        assert_eq!(only.nodes().collect::<Vec<_>>(), vec!["size.lg", "size.md"]);
        assert!(only.has_edge("size.lg", "size.md"));

        let without = g.filter_exclude_prefix(&["size."]);
        assert_eq!(without.nodes().collect::<Vec<_>>(), vec!["sizes.x", "space.lg", "space.md"]);
        assert_eq!(without.edge_count(), 1);
    }

    #[test]
    fn test_neighborhood_is_undirected_then_induced() {
        // a -> b -> c -> d, e -> c
        let mut g = Digraph::new();
        g.add_edge("a", "b");
        g.add_edge("b", "c");
        g.add_edge("c", "d");
        g.add_edge("e", "c");

        let seeds = g.select_seeds(&["d"]);
        let one = g.neighborhood(&seeds, 1);
        assert_eq!(one.nodes().collect::<Vec<_>>(), vec!["c", "d"]);

        let two = g.neighborhood(&seeds, 2);
        assert_eq!(two.nodes().collect::<Vec<_>>(), vec!["b", "c", "d", "e"]);
        assert!(two.has_edge("e", "c"));
        assert!(!two.contains("a"));
    }

    #[test]
    fn test_seed_patterns() {
        let g = headings();
        assert_eq!(g.select_seeds(&["h*"]).len(), 3);
        assert_eq!(g.select_seeds(&["h2", "missing"]).into_iter().collect::<Vec<_>>(), vec!["h2"]);
    }

    #[test]
    fn test_mermaid_rendering() {
        let mut g = Digraph::new();
        g.add_edge("type.h1", "type.h2");
        let mut opts = RenderOptions {
            title: Some("Type \"scale\"".into()),
            ..Default::default()
        };
        let edge = ("type.h1".to_string(), "type.h2".to_string());
        opts.highlight_edges.insert(edge.clone());
        opts.highlight_nodes.insert("type.h1".into());
        opts.edge_labels.insert(edge, "16px < 24px".into());

        let text = g.to_mermaid(&opts);
        assert!(text.starts_with("---\ntitle: Type #quot;scale#quot;\n---\nflowchart TD\n"));
        assert!(text.contains("  n_type_h1[\"type.h1\"]\n"));
        assert!(text.contains("  n_type_h1 -->|\"16px < 24px\"| n_type_h2\n"));
        assert!(text.contains("class n_type_h1 violation;"));
        assert!(text.contains("linkStyle 0 stroke"));
    }

    #[test]
    fn test_mermaid_ids_are_unique() {
        let mut g = Digraph::new();
        g.add_edge("a.b", "a_b");
        let text = g.to_mermaid(&RenderOptions::default());
        assert!(text.contains("n_a_b[\"a.b\"]"));
        assert!(text.contains("n_a_b_2[\"a_b\"]"));
    }

    #[test]
    fn test_dot_rendering_and_cycle_annotation() {
        let g = Digraph::from_triples(&[
            triple("a", Relation::Ge, "b"),
            triple("b", Relation::Ge, "a"),
        ]);
        let text = g.to_dot(&RenderOptions::default());
        assert!(text.starts_with("digraph hasse {\n"));
        assert!(text.contains("  // cycle: a -> b -> a\n"));
        assert!(text.contains("  \"a\" -> \"b\";\n"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_order_document_wire_form() {
        let doc: OrderDocument =
            serde_json::from_str(r#"{"order": [["h1", ">=", "h2"], ["sm", "<=", "lg"]]}"#).unwrap();
        assert_eq!(doc.order[0], triple("h1", Relation::Ge, "h2"));
        assert_eq!(doc.order[1].to_string(), "sm <= lg");
    }
}
