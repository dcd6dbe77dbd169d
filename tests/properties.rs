//! Property tests over randomly generated colors, orders and alias chains.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use tokenguard_core::{
    color::{contrast_ratio, relative_luminance, Rgba},
    flatten,
    plugins::{MonotonicPlugin, ValueParser},
    ConstraintPlugin, Digraph, OrderTriple, Relation, TokenValue,
};

fn reachable(g: &Digraph, from: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<String> = g.successors(from).map(str::to_string).collect();
    while let Some(n) = stack.pop() {
        if seen.insert(n.clone()) {
            stack.extend(g.successors(&n).map(str::to_string));
        }
    }
    seen
}

fn node(i: usize) -> String {
    format!("n{}", i)
}

/// Random DAG: edges only run from lower to higher index.
fn dag_triples() -> impl Strategy<Value = Vec<OrderTriple>> {
    prop::collection::vec((0usize..8, 0usize..8), 0..20).prop_map(|pairs| {
        pairs
            .into_iter()
            .filter(|(a, b)| a < b)
            .map(|(a, b)| OrderTriple::new(node(a), Relation::Ge, node(b)))
            .collect()
    })
}

proptest! {
    #[test]
    fn contrast_is_symmetric_and_bounded(
        a in (0u8..=255, 0u8..=255, 0u8..=255),
        b in (0u8..=255, 0u8..=255, 0u8..=255),
    ) {
        let la = relative_luminance(&Rgba::new(a.0 as f64, a.1 as f64, a.2 as f64, 1.0));
        let lb = relative_luminance(&Rgba::new(b.0 as f64, b.1 as f64, b.2 as f64, 1.0));
        let r1 = contrast_ratio(la, lb);
        let r2 = contrast_ratio(lb, la);
        prop_assert!((r1 - r2).abs() < 1e-12);
        prop_assert!(r1 >= 1.0 - 1e-12);
        prop_assert!(r1 <= 21.0 + 1e-9);
    }

    #[test]
    fn reduction_preserves_reachability(triples in dag_triples()) {
        let g = Digraph::from_triples(&triples);
        let reduced = g.transitive_reduction();
        prop_assert!(reduced.edge_count() <= g.edge_count());
        for n in g.nodes() {
            prop_assert_eq!(reachable(&g, n), reachable(&reduced, n));
        }
        // Nothing left to remove.
        prop_assert_eq!(reduced.transitive_reduction().edge_count(), reduced.edge_count());
    }

    #[test]
    fn disjoint_candidates_yield_no_issues(
        sizes in prop::collection::vec(0u32..64, 8),
        triples in dag_triples(),
    ) {
        let values: BTreeMap<String, TokenValue> = sizes
            .iter()
            .enumerate()
            .map(|(i, s)| (node(i), TokenValue::from(format!("{}px", s))))
            .collect();
        let plugin = MonotonicPlugin::new("size", triples, ValueParser::Size);
        let outsiders: BTreeSet<String> = ["elsewhere".to_string()].into();
        prop_assert!(plugin.evaluate(&values, &outsiders).is_empty());
    }

    #[test]
    fn alias_chains_resolve_to_the_base(len in 1usize..12, base in "[a-z]{1,8}") {
        let mut tree = Map::new();
        tree.insert("t0".into(), json!({ "$value": base.clone() }));
        for i in 1..=len {
            tree.insert(format!("t{}", i), json!({ "$value": format!("{{t{}}}", i - 1) }));
        }
        let resolution = flatten(&Value::Object(tree)).unwrap();
        let last = resolution.get(&format!("t{}", len)).unwrap();
        prop_assert_eq!(&last.value, &TokenValue::from(base));
        prop_assert_eq!(resolution.edges.len(), len);
    }
}
