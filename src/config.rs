//! Run configuration: a JSON document read with serde, then validated into
//! typed settings before any data file is opened.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{GraphError, Result};
use crate::interactions::{
    InteractionSource, CIRCUITS_PERCENTILE, DEFAULT_MIN_METHODS, ENHANCER_ENHANCER_PERCENTILE,
    ENHANCER_GENE_PERCENTILE,
};
use crate::loops::{LoopEdgeSpec, DEFAULT_TSS_WINDOW};
use crate::vocab::{Attribute, EdgeType, LoopCaller, NodeType};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub tissue: String,
    pub out_dir: PathBuf,
    pub chrom_sizes: PathBuf,
    pub blacklist: PathBuf,
    #[serde(default)]
    pub reference_fasta: Option<PathBuf>,
    /// Named windows around genes; local-context records are tagged with them.
    pub gene_windows: PathBuf,
    pub gene_lookup: PathBuf,
    #[serde(default)]
    pub enhancer_index: Option<PathBuf>,
    /// Node type name -> interval file.
    pub features: BTreeMap<String, PathBuf>,
    /// Attribute name -> track file.
    #[serde(default)]
    pub attributes: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub interactions: Vec<RawInteraction>,
    #[serde(default)]
    pub loops: Option<RawLoops>,
    /// Node type name -> local-context window.
    #[serde(default)]
    pub windows: BTreeMap<String, u32>,
    #[serde(default)]
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawInteraction {
    pub kind: String,
    pub path: PathBuf,
    #[serde(default)]
    pub tissue_column: Option<String>,
    #[serde(default)]
    pub min_methods: Option<u32>,
    #[serde(default)]
    pub active: Option<PathBuf>,
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub percentile: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawLoops {
    pub caller: String,
    pub path: PathBuf,
    #[serde(default)]
    pub top_n: Option<usize>,
    pub edges: Vec<RawLoopEdge>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawLoopEdge {
    pub edge_type: String,
    #[serde(default)]
    pub direct: Vec<String>,
    /// `true` joins TSS at the default distance; a number sets the distance.
    #[serde(default)]
    pub tss: Option<TssWindow>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TssWindow {
    Enabled(bool),
    Distance(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub caller: LoopCaller,
    pub path: PathBuf,
    pub top_n: Option<usize>,
    pub edges: Vec<LoopEdgeSpec>,
}

/// Validated settings for one tissue run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub tissue: String,
    pub out_dir: PathBuf,
    pub chrom_sizes: PathBuf,
    pub blacklist: PathBuf,
    pub reference_fasta: Option<PathBuf>,
    pub gene_windows: PathBuf,
    pub gene_lookup: PathBuf,
    pub enhancer_index: Option<PathBuf>,
    pub features: BTreeMap<NodeType, PathBuf>,
    pub attributes: BTreeMap<Attribute, PathBuf>,
    pub interactions: Vec<InteractionSource>,
    pub loops: Option<LoopSettings>,
    pub windows: BTreeMap<NodeType, u32>,
    pub threads: Option<usize>,
}

fn missing(kind: &str, field: &str) -> GraphError {
    GraphError::Configuration(format!("{kind} interactions need '{field}'"))
}

impl RawInteraction {
    fn validate(self, tissue: &str) -> Result<InteractionSource> {
        let kind: EdgeType = self.kind.parse()?;
        let source = match kind {
            EdgeType::Ppi => InteractionSource::Ppi {
                path: self.path,
                tissue_column: self.tissue_column.unwrap_or_else(|| tissue.to_string()),
                min_methods: self.min_methods.unwrap_or(DEFAULT_MIN_METHODS),
            },
            EdgeType::Mirna => InteractionSource::Mirna {
                targets: self.path,
                active: self.active.ok_or_else(|| missing("mirna", "active"))?,
            },
            EdgeType::TfMarker => InteractionSource::TfMarkers {
                path: self.path,
                marker: self.marker,
            },
            EdgeType::Circuits => InteractionSource::Circuits {
                path: self.path,
                percentile: self.percentile.unwrap_or(CIRCUITS_PERCENTILE),
            },
            EdgeType::EnhancerEnhancer => InteractionSource::EnhancerEnhancer {
                path: self.path,
                percentile: self.percentile.unwrap_or(ENHANCER_ENHANCER_PERCENTILE),
            },
            EdgeType::EnhancerGene => InteractionSource::EnhancerGene {
                path: self.path,
                percentile: self.percentile.unwrap_or(ENHANCER_GENE_PERCENTILE),
            },
            EdgeType::Local | EdgeType::GeneGene => {
                return Err(GraphError::CallerConfiguration {
                    kind: "interaction source",
                    value: self.kind,
                })
            }
        };
        if let Some(p) = source_percentile(&source) {
            if !(0.0..=100.0).contains(&p) {
                return Err(GraphError::Configuration(format!("percentile {p} outside 0..=100")));
            }
        }
        Ok(source)
    }
}

fn source_percentile(source: &InteractionSource) -> Option<f64> {
    match source {
        InteractionSource::Circuits { percentile, .. }
        | InteractionSource::EnhancerEnhancer { percentile, .. }
        | InteractionSource::EnhancerGene { percentile, .. } => Some(*percentile),
        _ => None,
    }
}

impl RawLoops {
    fn validate(self) -> Result<LoopSettings> {
        let caller: LoopCaller = self.caller.parse()?;
        let edges = self
            .edges
            .into_iter()
            .map(|e| {
                let direct = e
                    .direct
                    .iter()
                    .map(|t| t.parse())
                    .collect::<Result<Vec<NodeType>>>()?;
                let tss_window = match e.tss {
                    None | Some(TssWindow::Enabled(false)) => None,
                    Some(TssWindow::Enabled(true)) => Some(DEFAULT_TSS_WINDOW),
                    Some(TssWindow::Distance(d)) => Some(d),
                };
                Ok(LoopEdgeSpec {
                    edge_type: e.edge_type.parse()?,
                    direct,
                    tss_window,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(LoopSettings {
            caller,
            path: self.path,
            top_n: self.top_n,
            edges,
        })
    }
}

impl RawConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parses every vocabulary string and checks cross references. Touches no
    /// data file.
    pub fn validate(self) -> Result<PipelineConfig> {
        if self.tissue.is_empty() {
            return Err(GraphError::Configuration("tissue must not be empty".into()));
        }

        let features = self
            .features
            .into_iter()
            .map(|(k, v)| Ok((k.parse::<NodeType>()?, v)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let attributes = self
            .attributes
            .into_iter()
            .map(|(k, v)| Ok((k.parse::<Attribute>()?, v)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        if attributes.contains_key(&Attribute::Gc) {
            return Err(GraphError::Configuration(
                "gc is computed from reference_fasta, not from a track".into(),
            ));
        }
        let windows = self
            .windows
            .into_iter()
            .map(|(k, v)| {
                let node_type = k.parse::<NodeType>()?;
                if node_type.is_direct_only() {
                    return Err(GraphError::CallerConfiguration {
                        kind: "window for direct-only node type",
                        value: k,
                    });
                }
                Ok((node_type, v))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let tissue = self.tissue;
        let interactions = self
            .interactions
            .into_iter()
            .map(|i| i.validate(&tissue))
            .collect::<Result<Vec<_>>>()?;
        let loops = self.loops.map(RawLoops::validate).transpose()?;

        if self.enhancer_index.is_none() {
            if let Some(s) = interactions.iter().find(|s| s.needs_enhancer_index()) {
                return Err(GraphError::Configuration(format!(
                    "{} interactions need 'enhancer_index'",
                    s.name()
                )));
            }
        }
        if let Some(loops) = &loops {
            for spec in &loops.edges {
                if spec.tss_window.is_some() && !features.contains_key(&NodeType::Tss) {
                    return Err(GraphError::Configuration(format!(
                        "loop edges of type {} join TSS but no tss features are configured",
                        spec.edge_type
                    )));
                }
                if let Some(t) = spec.direct.iter().find(|t| !features.contains_key(t)) {
                    return Err(GraphError::Configuration(format!(
                        "loop edges of type {} use {t} features, which are not configured",
                        spec.edge_type
                    )));
                }
            }
        }
        if self.threads == Some(0) {
            return Err(GraphError::Configuration("threads must be at least 1".into()));
        }

        Ok(PipelineConfig {
            tissue,
            out_dir: self.out_dir,
            chrom_sizes: self.chrom_sizes,
            blacklist: self.blacklist,
            reference_fasta: self.reference_fasta,
            gene_windows: self.gene_windows,
            gene_lookup: self.gene_lookup,
            enhancer_index: self.enhancer_index,
            features,
            attributes,
            interactions,
            loops,
            windows,
            threads: self.threads,
        })
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| GraphError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        RawConfig::from_json(&text)?.validate()
    }

    /// Local-context window for a node type, `None` for direct-only types.
    pub fn window(&self, node_type: NodeType) -> Option<u32> {
        if node_type.is_direct_only() {
            return None;
        }
        self.windows
            .get(&node_type)
            .copied()
            .or_else(|| node_type.default_window())
    }

    pub fn needs_enhancer_index(&self) -> bool {
        self.interactions.iter().any(InteractionSource::needs_enhancer_index)
    }
}
