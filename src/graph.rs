//! Graph assembly: edge union, node attachment, tissue suffixing,
//! deduplication, composition and dense re-indexing.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::diagnostics::Diagnostics;
use crate::errors::{GraphError, Result};
use crate::io::{open_reader, write_rows};
use crate::node_attributes::{NodeAttributeTable, NodeRecord};
use crate::vocab::{EdgeType, NodeClass};

/// Weight of binary edges.
pub const UNWEIGHTED: f64 = -1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    pub edge_type: EdgeType,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, weight: f64, edge_type: EdgeType) -> Self {
        Edge {
            source: source.into(),
            target: target.into(),
            weight,
            edge_type,
        }
    }

    pub fn unweighted(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType) -> Self {
        Edge::new(source, target, UNWEIGHTED, edge_type)
    }

    /// Undirected identity: an edge and its reverse share a key.
    pub fn key(&self) -> (&str, &str) {
        if self.source <= self.target {
            (&self.source, &self.target)
        } else {
            (&self.target, &self.source)
        }
    }

    pub fn to_line(&self) -> String {
        format!("{}\t{}\t{}\t{}", self.source, self.target, self.weight, self.edge_type)
    }

    pub fn parse_line(line: &str, path: &str, line_no: usize) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        let [source, target, weight, edge_type] = fields[..] else {
            return Err(GraphError::MalformedInterval {
                path: path.to_string(),
                line: line_no,
                reason: format!("expected 4 columns, found {}", fields.len()),
            });
        };
        let weight = weight.parse().map_err(|_| GraphError::MalformedInterval {
            path: path.to_string(),
            line: line_no,
            reason: format!("non-numeric weight '{weight}'"),
        })?;
        Ok(Edge::new(source, target, weight, edge_type.parse()?))
    }
}

pub fn write_edges(path: &Path, edges: &[Edge]) -> Result<()> {
    write_rows(path, None, edges.iter().map(Edge::to_line))
}

pub fn read_edges(path: &Path, diagnostics: &mut Diagnostics) -> Result<Vec<Edge>> {
    let source = path.display().to_string();
    let mut edges = Vec::new();
    for (n, line) in open_reader(path)?.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match Edge::parse_line(&line, &source, n + 1) {
            Ok(edge) => edges.push(edge),
            Err(e) if e.is_recoverable() => diagnostics.record(&source, &e),
            Err(e) => return Err(e),
        }
    }
    Ok(edges)
}

/// Collapses an edge and its reverse, and parallel edges, into the first one
/// seen.
pub fn dedup_edges<I: IntoIterator<Item = Edge>>(edges: I) -> Vec<Edge> {
    let mut seen: FxHashSet<(String, String)> = FxHashSet::default();
    let mut out = Vec::new();
    for edge in edges {
        let (a, b) = edge.key();
        if seen.insert((a.to_string(), b.to_string())) {
            out.push(edge);
        }
    }
    out
}

/// Gene and TF names are shared across tissues; every other name is
/// suffixed with the tissue.
pub fn tissue_name(name: &str, class: NodeClass, tissue: &str) -> String {
    if class.is_shared() {
        name.to_string()
    } else {
        format!("{name}_{tissue}")
    }
}

/// Bijection between node names and dense ids `0..N`, in lexicographic name
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMap {
    names: Vec<String>,
    ids: FxHashMap<String, usize>,
}

impl IndexMap {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort_unstable();
        names.dedup();
        let ids = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        IndexMap { names, ids }
    }

    pub fn id(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_rows(
            path,
            None,
            self.names.iter().enumerate().map(|(i, n)| format!("{n}\t{i}")),
        )
    }
}

/// An assembled graph: deduplicated edges and one record per referenced node.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<String, NodeRecord>,
    edges: Vec<Edge>,
}

impl Graph {
    /// Assembles one tissue's graph from its edges and attribute reference.
    ///
    /// Edges with an empty endpoint are dropped. Referenced nodes missing from
    /// `reference` get a zero record. Both are counted in `diagnostics`.
    pub fn assemble<I>(
        edges: I,
        reference: &NodeAttributeTable,
        tissue: &str,
        diagnostics: &mut Diagnostics,
    ) -> Graph
    where
        I: IntoIterator<Item = Edge>,
    {
        let mut nodes: BTreeMap<String, NodeRecord> = BTreeMap::new();
        // unsuffixed name -> suffixed name, resolved once per node
        let mut renamed: FxHashMap<String, String> = FxHashMap::default();
        let mut dropped = 0;
        let mut zero_filled = 0;

        let mut attach = |name: &str| -> String {
            if let Some(n) = renamed.get(name) {
                return n.clone();
            }
            let record = match reference.get(name) {
                Some(r) => r.clone(),
                None => {
                    zero_filled += 1;
                    NodeRecord::zero(name)
                }
            };
            let new_name = tissue_name(name, record.class, tissue);
            nodes
                .entry(new_name.clone())
                .or_insert_with(|| record.renamed(new_name.clone()));
            renamed.insert(name.to_string(), new_name.clone());
            new_name
        };

        let mut suffixed = Vec::new();
        for edge in edges {
            if edge.source.is_empty() || edge.target.is_empty() {
                dropped += 1;
                continue;
            }
            let source = attach(&edge.source);
            let target = attach(&edge.target);
            suffixed.push(Edge { source, target, ..edge });
        }

        let before = suffixed.len();
        let edges = dedup_edges(suffixed);

        diagnostics.dropped("assembly: empty endpoint", dropped);
        diagnostics.zero_filled("assembly: missing attributes", zero_filled);
        log::info!(
            "{tissue}: {} nodes, {} edges ({} duplicates collapsed, {} zero-filled)",
            nodes.len(),
            edges.len(),
            before - edges.len(),
            zero_filled
        );

        Graph { nodes, edges }
    }

    pub fn from_parts(nodes: impl IntoIterator<Item = NodeRecord>, edges: Vec<Edge>) -> Graph {
        let mut map = BTreeMap::new();
        for record in nodes {
            map.entry(record.name.clone()).or_insert(record);
        }
        Graph {
            nodes: map,
            edges: dedup_edges(edges),
        }
    }

    /// Disjoint union on node name. First-seen node records and edges win.
    pub fn compose<I: IntoIterator<Item = Graph>>(graphs: I) -> Graph {
        let mut nodes = BTreeMap::new();
        let mut edges = Vec::new();
        for g in graphs {
            for (name, record) in g.nodes {
                nodes.entry(name).or_insert(record);
            }
            edges.extend(g.edges);
        }
        Graph {
            nodes,
            edges: dedup_edges(edges),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    pub fn node(&self, name: &str) -> Option<&NodeRecord> {
        self.nodes.get(name)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Every edge endpoint plus every attached node.
    pub fn index_map(&self) -> IndexMap {
        IndexMap::from_names(
            self.nodes
                .keys()
                .map(String::as_str)
                .chain(self.edges.iter().flat_map(|e| [e.source.as_str(), e.target.as_str()])),
        )
    }

    /// Writes `nodes.tsv` (the attribute reference layout) and `edges.tsv`.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let mut table = NodeAttributeTable::new();
        for record in self.nodes.values() {
            table.insert(record.clone());
        }
        table.write(&dir.join("nodes.tsv"))?;
        write_edges(&dir.join("edges.tsv"), &self.edges)
    }

    pub fn read(dir: &Path, diagnostics: &mut Diagnostics) -> Result<Graph> {
        let table = NodeAttributeTable::load(&dir.join("nodes.tsv"), diagnostics)?;
        let edges = read_edges(&dir.join("edges.tsv"), diagnostics)?;
        Ok(Graph::from_parts(table.iter().cloned(), edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::NodeType;
    use pretty_assertions::assert_eq;

    fn reference() -> NodeAttributeTable {
        let mut t = NodeAttributeTable::new();
        t.insert(NodeRecord::new("ENSG00000000001", Some(NodeType::Gene), "chr1", 0, 100));
        t.insert(NodeRecord::new("chr1_500_E1", Some(NodeType::Enhancer), "chr1", 500, 600));
        t
    }

    #[test]
    fn reverse_duplicates_collapse_to_first() {
        let edges = vec![
            Edge::unweighted("X", "Y", EdgeType::Local),
            Edge::new("Y", "X", 2.0, EdgeType::Circuits),
            Edge::unweighted("X", "Z", EdgeType::Local),
        ];
        let deduped = dedup_edges(edges);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0], Edge::unweighted("X", "Y", EdgeType::Local));
        assert_eq!(dedup_edges(deduped.clone()), deduped);
    }

    #[test]
    fn assemble_suffixes_and_zero_fills() {
        let mut diag = Diagnostics::new();
        let g = Graph::assemble(
            vec![
                Edge::unweighted("chr1_500_E1", "ENSG00000000001", EdgeType::EnhancerGene),
                Edge::unweighted("ENSG00000000001", "chr1_500_E1", EdgeType::Local),
                Edge::unweighted("GATA1_tf", "ENSG00000000001", EdgeType::TfMarker),
                Edge::unweighted("", "ENSG00000000001", EdgeType::Ppi),
            ],
            &reference(),
            "liver",
            &mut diag,
        );

        assert_eq!(g.num_edges(), 2);
        assert_eq!(g.edges()[0].source, "chr1_500_E1_liver");
        assert_eq!(g.edges()[0].target, "ENSG00000000001");
        let names: Vec<&str> = g.nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["ENSG00000000001", "GATA1_tf", "chr1_500_E1_liver"]);
        assert_eq!(g.node("chr1_500_E1_liver").unwrap().node_type, Some(NodeType::Enhancer));
        assert_eq!(g.node("GATA1_tf").unwrap().class, NodeClass::Tf);
        assert_eq!(diag.total().zero_filled, 1);
        assert_eq!(diag.total().dropped, 1);
    }

    #[test]
    fn compose_shares_genes_across_tissues() {
        let mut diag = Diagnostics::new();
        let edge = || vec![Edge::unweighted("chr1_500_E1", "ENSG00000000001", EdgeType::EnhancerGene)];
        let liver = Graph::assemble(edge(), &reference(), "liver", &mut diag);
        let lung = Graph::assemble(edge(), &reference(), "lung", &mut diag);

        let all = Graph::compose([liver, lung]);
        assert_eq!(all.num_nodes(), 3);
        assert_eq!(all.num_edges(), 2);
    }

    #[test]
    fn index_map_is_sorted_and_insertion_independent() {
        let a = IndexMap::from_names(["b", "a", "c", "a"]);
        let b = IndexMap::from_names(["c", "b", "a"]);
        assert_eq!(a, b);
        assert_eq!(a.id("a"), Some(0));
        assert_eq!(a.name(2), Some("c"));
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn graph_files_round_trip() {
        let g = Graph::assemble(
            vec![Edge::new("chr1_500_E1", "ENSG00000000001", 0.75, EdgeType::Circuits)],
            &reference(),
            "liver",
            &mut Diagnostics::new(),
        );
        let dir = tempfile::tempdir().unwrap();
        g.write(dir.path()).unwrap();

        let back = Graph::read(dir.path(), &mut Diagnostics::new()).unwrap();
        assert_eq!(back.edges(), g.edges());
        assert_eq!(back.num_nodes(), g.num_nodes());
        assert_eq!(back.node("chr1_500_E1_liver"), g.node("chr1_500_E1_liver"));
    }

    #[test]
    fn malformed_edge_lines() {
        assert!(Edge::parse_line("a\tb\tx\tppi", "f", 1).is_err());
        assert!(matches!(
            Edge::parse_line("a\tb\t1\tbogus", "f", 1),
            Err(GraphError::CallerConfiguration { .. })
        ));
        assert_eq!(
            Edge::parse_line("a\tb\t-1\tg_g", "f", 1).unwrap(),
            Edge::unweighted("a", "b", EdgeType::GeneGene)
        );
    }
}
