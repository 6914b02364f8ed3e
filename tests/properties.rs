use std::collections::BTreeSet;

use proptest::prelude::*;

use ruomics::diagnostics::Diagnostics;
use ruomics::export::TensorBundle;
use ruomics::graph::{dedup_edges, Edge, Graph, IndexMap};
use ruomics::interval_set::{ChromSizes, IntervalSet, JoinMode};
use ruomics::node_attributes::{NodeAttributeTable, NodeRecord, FEATURE_COUNT};
use ruomics::ruomics_structs::Interval;
use ruomics::vocab::{EdgeType, NodeType};

const CHROMS: [&str; 3] = ["chr1", "chr2", "chrX"];

fn interval() -> impl Strategy<Value = Interval> {
    (prop::sample::select(CHROMS.to_vec()), 0u32..10_000, 1u32..500)
        .prop_map(|(chrom, start, len)| Interval::new(chrom, start, start + len, "."))
}

fn intervals() -> impl Strategy<Value = Vec<Interval>> {
    prop::collection::vec(interval(), 0..60)
}

fn sorted_set() -> impl Strategy<Value = IntervalSet> {
    intervals().prop_map(|v| IntervalSet::new("set", v).sorted())
}

fn edge() -> impl Strategy<Value = Edge> {
    let names = vec!["ENSG00000000001", "ENSG00000000002", "GATA1_tf", "chr1_100_E1", "chr2_5_E2"];
    (
        prop::sample::select(names.clone()),
        prop::sample::select(names),
        prop::sample::select(EdgeType::ALL.to_vec()),
    )
        .prop_map(|(a, b, t)| Edge::unweighted(a, b, t))
}

fn pairs(a: &IntervalSet, b: &IntervalSet, mode: JoinMode) -> BTreeSet<(usize, usize)> {
    a.intersect(b, mode)
        .unwrap()
        .map(|o| (o.query_idx, o.hit_idx))
        .collect()
}

proptest! {
    #[test]
    fn sorted_sets_are_ordered(v in intervals()) {
        let set = IntervalSet::new("set", v).sorted();
        for w in set.intervals().windows(2) {
            let (a, b) = (&w[0], &w[1]);
            prop_assert!(a.chrom < b.chrom || (a.chrom == b.chrom && a.start <= b.start));
        }
    }

    #[test]
    fn slop_is_clipped_to_the_chromosome(v in intervals(), w in 0u32..20_000) {
        let sizes = ChromSizes::from_pairs([("chr1", 20_000u32), ("chr2", 10_200), ("chrX", 10_100)]);
        let set = IntervalSet::new("set", v);
        let slopped = set.slop(&sizes, w).unwrap();
        for (i, s) in set.iter().zip(slopped.iter()) {
            let len = sizes.get(&i.chrom).unwrap();
            prop_assert_eq!(s.start, i.start.saturating_sub(w));
            prop_assert_eq!(s.end, (i.end + w).min(len));
        }
    }

    #[test]
    fn windowed_join_contains_direct_join(a in sorted_set(), b in sorted_set(), w in 1u32..5_000) {
        let direct = pairs(&a, &b, JoinMode::Direct);
        let windowed = pairs(&a, &b, JoinMode::Windowed(w));
        prop_assert!(direct.is_subset(&windowed));
    }

    #[test]
    fn dedup_is_idempotent(edges in prop::collection::vec(edge(), 0..40)) {
        let once = dedup_edges(edges);
        let twice = dedup_edges(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn index_map_is_a_stable_bijection(names in prop::collection::vec("[a-z]{1,6}", 0..40)) {
        let map = IndexMap::from_names(names.iter().cloned());
        let reversed = IndexMap::from_names(names.iter().rev().cloned());
        prop_assert_eq!(&map, &reversed);

        for id in 0..map.len() {
            let name = map.name(id).unwrap();
            prop_assert_eq!(map.id(name), Some(id));
        }
        for name in &names {
            prop_assert!(map.id(name).is_some());
        }
    }

    #[test]
    fn every_assembled_node_has_a_full_feature_vector(edges in prop::collection::vec(edge(), 0..40)) {
        let mut reference = NodeAttributeTable::new();
        reference.insert(NodeRecord::new("ENSG00000000001", Some(NodeType::Gene), "chr1", 0, 100));
        reference.insert(NodeRecord::new("chr1_100_E1", Some(NodeType::Enhancer), "chr1", 100, 200));

        let graph = Graph::assemble(edges, &reference, "liver", &mut Diagnostics::new());
        for e in graph.edges() {
            prop_assert!(graph.node(&e.source).is_some());
            prop_assert!(graph.node(&e.target).is_some());
        }
        for n in graph.nodes() {
            prop_assert_eq!(n.features().len(), FEATURE_COUNT);
            prop_assert!(n.features().iter().all(|v| v.is_finite()));
        }

        let bundle = TensorBundle::build(&graph).unwrap();
        prop_assert_eq!(bundle.node_feat.len(), graph.num_nodes());
    }
}

#[test]
fn reversed_duplicates_from_two_node_types_collapse() {
    let reference = NodeAttributeTable::new();
    let from_enhancers = vec![Edge::unweighted("X", "Y", EdgeType::Local)];
    let from_promoters = vec![Edge::unweighted("Y", "X", EdgeType::Local)];

    let graph = Graph::assemble(
        from_enhancers.into_iter().chain(from_promoters),
        &reference,
        "liver",
        &mut Diagnostics::new(),
    );
    assert_eq!(graph.num_edges(), 1);
    assert_eq!(graph.edges()[0].source, "X_liver");
    assert_eq!(graph.num_nodes(), 2);
}
