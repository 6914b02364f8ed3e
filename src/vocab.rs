//! Closed vocabularies for node types, attribute tracks, edge types and loop
//! callers.
//!
//! Strings from configuration or file names are converted into these tags once,
//! at ingestion. Nothing downstream re-derives a type from a string.

use std::fmt;
use std::str::FromStr;

use crate::errors::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    ChromatinLoop,
    CpgIsland,
    Enhancer,
    Gene,
    HistoneCluster,
    MirnaTarget,
    PolyASite,
    Promoter,
    RbpSite,
    Tad,
    TfBindingCluster,
    Tss,
}

impl NodeType {
    /// One-hot order.
    pub const ALL: [NodeType; 12] = [
        NodeType::ChromatinLoop,
        NodeType::CpgIsland,
        NodeType::Enhancer,
        NodeType::Gene,
        NodeType::HistoneCluster,
        NodeType::MirnaTarget,
        NodeType::PolyASite,
        NodeType::Promoter,
        NodeType::RbpSite,
        NodeType::Tad,
        NodeType::TfBindingCluster,
        NodeType::Tss,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::ChromatinLoop => "chromatinloops",
            NodeType::CpgIsland => "cpgislands",
            NodeType::Enhancer => "enhancers",
            NodeType::Gene => "gencode",
            NodeType::HistoneCluster => "histones",
            NodeType::MirnaTarget => "mirnatargets",
            NodeType::PolyASite => "polyasites",
            NodeType::Promoter => "promoters",
            NodeType::RbpSite => "rbpbindingsites",
            NodeType::Tad => "tads",
            NodeType::TfBindingCluster => "tfbindingclusters",
            NodeType::Tss => "tss",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Local-context window in bp. `None` for types that define their own
    /// scale and are only joined by direct overlap.
    pub fn default_window(&self) -> Option<u32> {
        match self {
            NodeType::ChromatinLoop | NodeType::Tad => None,
            NodeType::Gene => Some(2500),
            NodeType::MirnaTarget | NodeType::PolyASite | NodeType::RbpSite => Some(1000),
            NodeType::CpgIsland
            | NodeType::Enhancer
            | NodeType::HistoneCluster
            | NodeType::Promoter
            | NodeType::TfBindingCluster
            | NodeType::Tss => Some(2000),
        }
    }

    pub fn is_direct_only(&self) -> bool {
        self.default_window().is_none()
    }

    /// Source files for these types carry no stable identifier, so prepared
    /// intervals are named after the type instead.
    pub fn uses_synthetic_name(&self) -> bool {
        matches!(self, NodeType::CpgIsland)
    }

    pub fn one_hot(&self) -> [f64; 12] {
        let mut v = [0.0; 12];
        v[self.index()] = 1.0;
        v
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| GraphError::CallerConfiguration {
                kind: "node type",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Gc,
    Cpg,
    Ctcf,
    Dnase,
    H3k27ac,
    H3k27me3,
    H3k36me3,
    H3k4me1,
    H3k4me3,
    H3k9me3,
    Line,
    Ltr,
    Microsatellites,
    Phastcons,
    Polr2a,
    Recombination,
    Rnarepeat,
    Simplerepeats,
    Sine,
}

impl Attribute {
    pub const ALL: [Attribute; 19] = [
        Attribute::Gc,
        Attribute::Cpg,
        Attribute::Ctcf,
        Attribute::Dnase,
        Attribute::H3k27ac,
        Attribute::H3k27me3,
        Attribute::H3k36me3,
        Attribute::H3k4me1,
        Attribute::H3k4me3,
        Attribute::H3k9me3,
        Attribute::Line,
        Attribute::Ltr,
        Attribute::Microsatellites,
        Attribute::Phastcons,
        Attribute::Polr2a,
        Attribute::Recombination,
        Attribute::Rnarepeat,
        Attribute::Simplerepeats,
        Attribute::Sine,
    ];

    /// Recombination keeps a sum and a mean.
    pub const COLUMNS: usize = Attribute::ALL.len() + 1;

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Gc => "gc",
            Attribute::Cpg => "cpg",
            Attribute::Ctcf => "ctcf",
            Attribute::Dnase => "dnase",
            Attribute::H3k27ac => "h3k27ac",
            Attribute::H3k27me3 => "h3k27me3",
            Attribute::H3k36me3 => "h3k36me3",
            Attribute::H3k4me1 => "h3k4me1",
            Attribute::H3k4me3 => "h3k4me3",
            Attribute::H3k9me3 => "h3k9me3",
            Attribute::Line => "line",
            Attribute::Ltr => "ltr",
            Attribute::Microsatellites => "microsatellites",
            Attribute::Phastcons => "phastcons",
            Attribute::Polr2a => "polr2a",
            Attribute::Recombination => "recombination",
            Attribute::Rnarepeat => "rnarepeat",
            Attribute::Simplerepeats => "simplerepeats",
            Attribute::Sine => "sine",
        }
    }

    /// First column this attribute occupies in the attribute block.
    pub fn column(&self) -> usize {
        let idx = *self as usize;
        if idx > Attribute::Recombination as usize {
            idx + 1
        } else {
            idx
        }
    }

    pub fn column_names() -> Vec<String> {
        let mut names = Vec::with_capacity(Attribute::COLUMNS);
        for attribute in Attribute::ALL {
            if attribute == Attribute::Recombination {
                names.push("recombination_sum".to_string());
                names.push("recombination_mean".to_string());
            } else {
                names.push(attribute.as_str().to_string());
            }
        }
        names
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| GraphError::CallerConfiguration {
                kind: "attribute",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeType {
    Ppi,
    Mirna,
    TfMarker,
    Circuits,
    EnhancerEnhancer,
    EnhancerGene,
    Local,
    GeneGene,
}

impl EdgeType {
    pub const ALL: [EdgeType; 8] = [
        EdgeType::Ppi,
        EdgeType::Mirna,
        EdgeType::TfMarker,
        EdgeType::Circuits,
        EdgeType::EnhancerEnhancer,
        EdgeType::EnhancerGene,
        EdgeType::Local,
        EdgeType::GeneGene,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Ppi => "ppi",
            EdgeType::Mirna => "mirna",
            EdgeType::TfMarker => "tf_marker",
            EdgeType::Circuits => "circuits",
            EdgeType::EnhancerEnhancer => "enhancer-enhancer",
            EdgeType::EnhancerGene => "enhancer-gene",
            EdgeType::Local => "local",
            EdgeType::GeneGene => "g_g",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn one_hot(&self) -> [u8; 8] {
        let mut v = [0u8; 8];
        v[self.index()] = 1;
        v
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeType::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| GraphError::CallerConfiguration {
                kind: "edge type",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCaller {
    /// BEDPE: chr1 start1 end1 chr2 start2 end2 [score ...]
    Peakachu,
    /// chr1:start1-end1 <tab> chr2:start2-end2 <tab> score
    Deeploop,
}

impl FromStr for LoopCaller {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "peakachu" => Ok(LoopCaller::Peakachu),
            "deeploop" => Ok(LoopCaller::Deeploop),
            other => Err(GraphError::CallerConfiguration {
                kind: "loop caller",
                value: other.to_string(),
            }),
        }
    }
}

/// Identity class of a node, derived from its name exactly once when the
/// node enters a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    Gene,
    Tf,
    Other,
}

impl NodeClass {
    pub fn of(name: &str) -> NodeClass {
        if name.ends_with("_tf") {
            NodeClass::Tf
        } else if is_stable_gene_id(name) {
            NodeClass::Gene
        } else {
            NodeClass::Other
        }
    }

    /// Gene and TF identifiers are shared across tissues.
    pub fn is_shared(&self) -> bool {
        !matches!(self, NodeClass::Other)
    }
}

fn is_stable_gene_id(name: &str) -> bool {
    name.strip_prefix("ENSG")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_digit())
}
