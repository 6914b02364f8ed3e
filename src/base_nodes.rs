//! Nodes that only appear in interaction tables (TFs, active miRNAs and
//! enhancers from the enhancer index) have no prepared feature file. Their
//! loci are collected here so they are aggregated like prepared nodes before
//! assembly.

use std::collections::BTreeMap;
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::diagnostics::Diagnostics;
use crate::errors::Result;
use crate::graph::Edge;
use crate::interval_set::IntervalSet;
use crate::node_attributes::NodeAttributeTable;
use crate::reference::EnhancerIndex;
use crate::ruomics_structs::Interval;
use crate::vocab::NodeType;

pub const TF_SUFFIX: &str = "_tf";

/// Node name -> node type and locus. The first locus registered for a name
/// wins.
#[derive(Debug, Clone, Default)]
pub struct BaseNodeLoci {
    loci: FxHashMap<String, (NodeType, Interval)>,
}

impl BaseNodeLoci {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, node_type: NodeType, interval: Interval) {
        self.loci
            .entry(interval.name.clone())
            .or_insert((node_type, interval));
    }

    pub fn add<'a, I>(&mut self, node_type: NodeType, intervals: I)
    where
        I: IntoIterator<Item = &'a Interval>,
    {
        for interval in intervals {
            self.insert(node_type, interval.clone());
        }
    }

    /// Registers each gene under its id and under its TF name.
    pub fn add_genes(&mut self, genes: &IntervalSet) {
        for gene in genes.iter() {
            self.insert(NodeType::Gene, gene.clone());
            self.insert(
                NodeType::Gene,
                Interval {
                    name: format!("{}{TF_SUFFIX}", gene.name),
                    ..gene.clone()
                },
            );
        }
    }

    /// Tissue-active miRNAs, a BED file named by its 4th column.
    pub fn add_mirnas(&mut self, path: &Path, diagnostics: &mut Diagnostics) -> Result<()> {
        let set = IntervalSet::load(path, diagnostics)?;
        self.add(NodeType::MirnaTarget, set.iter());
        Ok(())
    }

    pub fn add_enhancers(&mut self, index: &EnhancerIndex) {
        self.add(NodeType::Enhancer, index.loci());
    }

    pub fn get(&self, name: &str) -> Option<(NodeType, &Interval)> {
        self.loci.get(name).map(|(t, i)| (*t, i))
    }

    pub fn len(&self) -> usize {
        self.loci.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loci.is_empty()
    }

    /// Edge endpoints missing from `reference` that have a known locus,
    /// grouped by node type and sorted. Endpoints without a locus are left for
    /// zero-fill at assembly.
    pub fn resolve<'a, I>(&self, edges: I, reference: &NodeAttributeTable) -> BTreeMap<NodeType, IntervalSet>
    where
        I: IntoIterator<Item = &'a Edge>,
    {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut by_type: BTreeMap<NodeType, Vec<Interval>> = BTreeMap::new();
        let mut without_locus = 0;

        for edge in edges {
            for name in [edge.source.as_str(), edge.target.as_str()] {
                if name.is_empty() || reference.get(name).is_some() || !seen.insert(name) {
                    continue;
                }
                match self.loci.get(name) {
                    Some((node_type, interval)) => by_type.entry(*node_type).or_default().push(interval.clone()),
                    None => without_locus += 1,
                }
            }
        }

        let sets: BTreeMap<NodeType, IntervalSet> = by_type
            .into_iter()
            .map(|(t, intervals)| (t, IntervalSet::new(format!("basenodes_{t}"), intervals).sorted()))
            .collect();
        log::info!(
            "base nodes: {} with a locus, {} without",
            sets.values().map(IntervalSet::len).sum::<usize>(),
            without_locus
        );
        sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::EdgeType;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn iv(chrom: &str, start: u32, end: u32, name: &str) -> Interval {
        Interval::new(chrom, start, end, name)
    }

    #[test]
    fn interaction_only_endpoints_get_loci() {
        let dir = tempfile::tempdir().unwrap();
        let active = dir.path().join("active.bed");
        fs::write(&active, "chr2\t20000\t20100\thsa-miR-21\n").unwrap();
        let index_path = dir.path().join("index.txt");
        fs::write(&index_path, "EH1\tchr3:700-900\n").unwrap();
        let index = EnhancerIndex::load(&index_path, &mut Diagnostics::new()).unwrap();

        let genes = IntervalSet::new("gencode", vec![iv("chr1", 5000, 9000, "ENSG00000000001")]);
        let mut loci = BaseNodeLoci::new();
        loci.add_genes(&genes);
        loci.add_mirnas(&active, &mut Diagnostics::new()).unwrap();
        loci.add_enhancers(&index);
        assert_eq!(loci.len(), 4);

        let mut reference = NodeAttributeTable::new();
        reference.add_node_type(NodeType::Gene, &genes, &[]).unwrap();

        let edges = vec![
            Edge::unweighted("hsa-miR-21", "ENSG00000000001", EdgeType::Mirna),
            Edge::unweighted("ENSG00000000001_tf", "ENSG00000000001", EdgeType::TfMarker),
            Edge::unweighted("hsa-miR-21", "ENSG_UNKNOWN", EdgeType::Mirna),
            Edge::unweighted("enhancer_chr3_700", "ENSG00000000001", EdgeType::EnhancerGene),
        ];
        let sets = loci.resolve(&edges, &reference);

        assert_eq!(
            sets.keys().copied().collect::<Vec<_>>(),
            vec![NodeType::Enhancer, NodeType::Gene, NodeType::MirnaTarget]
        );
        assert_eq!(
            sets[&NodeType::Enhancer].intervals(),
            &[iv("chr3", 700, 900, "enhancer_chr3_700")]
        );
        assert_eq!(
            sets[&NodeType::MirnaTarget].intervals(),
            &[iv("chr2", 20000, 20100, "hsa-miR-21")]
        );
        assert_eq!(
            sets[&NodeType::Gene].intervals(),
            &[iv("chr1", 5000, 9000, "ENSG00000000001_tf")]
        );
        assert!(sets[&NodeType::Gene].is_sorted());
    }

    #[test]
    fn first_locus_for_a_name_wins() {
        let mut loci = BaseNodeLoci::new();
        loci.add(NodeType::MirnaTarget, &[iv("chr1", 10, 20, "m"), iv("chr9", 1, 2, "m")]);
        let (t, i) = loci.get("m").unwrap();
        assert_eq!((t, i.chrom.as_str()), (NodeType::MirnaTarget, "chr1"));
    }
}
