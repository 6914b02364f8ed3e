//! Per-datatype normalisation of raw interval files: sort, blacklist
//! anti-join, alternate-contig removal and renaming to globally unique node
//! names.

use std::path::Path;
use std::time::Instant;

use crate::diagnostics::Diagnostics;
use crate::errors::Result;
use crate::interval_set::IntervalSet;
use crate::ruomics_structs::Interval;
use crate::vocab::{Attribute, NodeType};

/// What a prepared file becomes: graph nodes, or an attribute track that is
/// only aggregated onto nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Node(NodeType),
    Track(Attribute),
}

impl FeatureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FeatureKind::Node(t) => t.as_str(),
            FeatureKind::Track(a) => a.as_str(),
        }
    }
}

/// Merged blacklist regions, shared read-only by every preparer.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    regions: IntervalSet,
}

impl Blacklist {
    pub fn load(path: &Path, diagnostics: &mut Diagnostics) -> Result<Self> {
        let regions = IntervalSet::load(path, diagnostics)?.sorted();
        Self::from_set(regions)
    }

    pub fn from_set(regions: IntervalSet) -> Result<Self> {
        let merged = regions.sorted().merge(0)?.with_label("blacklist");
        log::debug!("blacklist: {} merged regions", merged.len());
        Ok(Blacklist { regions: merged })
    }

    pub fn empty() -> Self {
        Blacklist {
            regions: IntervalSet::new("blacklist", Vec::new()),
        }
    }

    pub fn regions(&self) -> &IntervalSet {
        &self.regions
    }
}

/// Alternate, unplaced and random contigs, e.g. `chr1_KI270706v1_random`.
pub fn is_alt_contig(chrom: &str) -> bool {
    chrom.contains('_') || chrom.contains("alt")
}

/// The globally unique name of a node interval after preparation.
pub fn node_name(node_type: NodeType, interval: &Interval) -> String {
    match node_type {
        NodeType::Gene => interval.name.clone(),
        t if t.uses_synthetic_name() || interval.name == "." => {
            format!("{}_{}_{}", interval.chrom, interval.start, t.as_str())
        }
        _ => format!("{}_{}_{}", interval.chrom, interval.start, interval.name),
    }
}

/// Runs the four preparation steps on an already loaded set.
pub fn prepare(mut set: IntervalSet, kind: FeatureKind, blacklist: &Blacklist) -> Result<IntervalSet> {
    let start = Instant::now();
    let before = set.len();

    set.sort();
    let mut set = set.subtract(blacklist.regions())?;
    let after_blacklist = set.len();
    set.retain(|i| !is_alt_contig(&i.chrom));

    if let FeatureKind::Node(node_type) = kind {
        set.map_names(|i| node_name(node_type, i));
    }

    log::debug!(
        "prepared {}: {} -> {} intervals ({} blacklisted, {} on alt contigs) in {:?}",
        kind.label(),
        before,
        set.len(),
        before - after_blacklist,
        after_blacklist - set.len(),
        start.elapsed()
    );

    Ok(set.with_label(kind.label()))
}

pub fn prepare_file(
    path: &Path,
    kind: FeatureKind,
    blacklist: &Blacklist,
    diagnostics: &mut Diagnostics,
) -> Result<IntervalSet> {
    let set = IntervalSet::load(path, diagnostics)?;
    prepare(set, kind, blacklist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn iv(chrom: &str, start: u32, end: u32, name: &str) -> Interval {
        Interval::new(chrom, start, end, name)
    }

    fn blacklist() -> Blacklist {
        Blacklist::from_set(IntervalSet::new(
            "bl",
            vec![iv("chr1", 500, 600, "."), iv("chr1", 550, 700, ".")],
        ))
        .unwrap()
    }

    #[test]
    fn blacklist_is_merged() {
        assert_eq!(blacklist().regions().intervals(), &[iv("chr1", 500, 700, "2")]);
    }

    #[test]
    fn alt_contigs() {
        assert!(is_alt_contig("chr1_KI270706v1_random"));
        assert!(is_alt_contig("chr6_alt"));
        assert!(!is_alt_contig("chrX"));
    }

    #[test]
    fn prepares_enhancers() {
        let raw = IntervalSet::new(
            "raw",
            vec![
                iv("chr2", 10, 20, "EH1"),
                iv("chr1", 650, 800, "EH2"),
                iv("chr1", 100, 200, "EH3"),
                iv("chrUn_GL000220v1", 1, 5, "EH4"),
            ],
        );
        let prepared = prepare(raw, FeatureKind::Node(NodeType::Enhancer), &blacklist()).unwrap();

        let names: Vec<&str> = prepared.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["chr1_100_EH3", "chr2_10_EH1"]);
        assert_eq!(prepared.label(), "enhancers");
        assert!(prepared.is_sorted());
    }

    #[test]
    fn renaming_rules() {
        let gene = iv("chr1", 10, 20, "ENSG00000123");
        let cpg = iv("chr1", 10, 20, "CpG:_41");
        let unnamed = iv("chr3", 7, 9, ".");
        assert_eq!(node_name(NodeType::Gene, &gene), "ENSG00000123");
        assert_eq!(node_name(NodeType::CpgIsland, &cpg), "chr1_10_cpgislands");
        assert_eq!(node_name(NodeType::Promoter, &unnamed), "chr3_7_promoters");
        assert_eq!(node_name(NodeType::Promoter, &gene), "chr1_10_ENSG00000123");
    }

    #[test]
    fn tracks_keep_their_names() {
        let raw = IntervalSet::new("raw", vec![iv("chr1", 0, 10, "1.25")]);
        let prepared = prepare(
            raw,
            FeatureKind::Track(Attribute::Recombination),
            &Blacklist::empty(),
        )
        .unwrap();
        assert_eq!(prepared.intervals()[0].name, "1.25");
        assert_eq!(prepared.label(), "recombination");
    }
}
