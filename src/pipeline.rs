//! One tissue run, end to end, and composition of finished tissues.
//!
//! Each stage fans out over node types (or node type x attribute pairs) on the
//! rayon pool and ends in a checked barrier: if any task failed the stage
//! raises `IncompleteBarrier` naming the failed tasks. Local-context work and
//! long-range extraction share no state and run side by side. Nodes that only
//! long-range edges reference are aggregated once both branches are done.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use crate::aggregate::{
    aggregate_track, attribute_path, gc_rows, write_attribute_rows, zero_rows, AttributeRow,
};
use crate::base_nodes::BaseNodeLoci;
use crate::config::PipelineConfig;
use crate::diagnostics::Diagnostics;
use crate::errors::{GraphError, Result};
use crate::export::{export, Summary};
use crate::graph::{write_edges, Edge, Graph};
use crate::interactions::{extract, InteractionSource, Lookups};
use crate::interval_set::{ChromSizes, IntervalSet};
use crate::io::write_atomic;
use crate::local_context::{
    all_features, join_node_type, write_gene_splits, write_records, LocalEdgeRecord,
};
use crate::loops::{loop_edges, read_loops, TssSet};
use crate::node_attributes::NodeAttributeTable;
use crate::prepare::{prepare_file, Blacklist, FeatureKind};
use crate::reference::{EnhancerIndex, GeneLookup};
use crate::vocab::{Attribute, EdgeType, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphVariant {
    /// Long-range edges only.
    Base,
    /// Long-range plus local-context edges.
    Full,
}

impl GraphVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphVariant::Base => "base",
            GraphVariant::Full => "full",
        }
    }

    pub fn dir(&self, tissue_dir: &Path) -> PathBuf {
        tissue_dir.join("graph").join(self.as_str())
    }
}

#[derive(Debug)]
pub struct TissueOutputs {
    pub tissue: String,
    pub out_dir: PathBuf,
    pub base: Summary,
    pub full: Summary,
    pub diagnostics: Diagnostics,
}

/// Reference data loaded once and shared read-only by every worker.
struct References {
    sizes: ChromSizes,
    blacklist: Blacklist,
    genes: GeneLookup,
    enhancers: Option<EnhancerIndex>,
    gene_windows: IntervalSet,
}

impl References {
    fn load(config: &PipelineConfig, diagnostics: &mut Diagnostics) -> Result<Self> {
        let enhancers = match &config.enhancer_index {
            Some(path) => Some(EnhancerIndex::load(path, diagnostics)?),
            None => None,
        };
        Ok(References {
            sizes: ChromSizes::load(&config.chrom_sizes)?,
            blacklist: Blacklist::load(&config.blacklist, diagnostics)?,
            genes: GeneLookup::load(&config.gene_lookup, diagnostics)?,
            enhancers,
            gene_windows: IntervalSet::load(&config.gene_windows, diagnostics)?.sorted(),
        })
    }
}

/// Fan-in of one parallel stage. Every task must have succeeded.
fn barrier<K: fmt::Display, T>(stage: &str, results: Vec<(K, Result<T>)>) -> Result<Vec<(K, T)>> {
    let expected = results.len();
    let mut done = Vec::with_capacity(expected);
    let mut failed = Vec::new();
    for (key, result) in results {
        match result {
            Ok(v) => done.push((key, v)),
            Err(e) => {
                log::error!("{stage}: {key} failed: {e}");
                failed.push(key.to_string());
            }
        }
    }
    if !failed.is_empty() {
        return Err(GraphError::IncompleteBarrier {
            stage: stage.to_string(),
            expected,
            completed: done.len(),
            failed,
        });
    }
    log::debug!("{stage}: {expected} tasks complete");
    Ok(done)
}

fn prepare_node_type(
    node_type: NodeType,
    path: &Path,
    refs: &References,
    out_dir: &Path,
) -> Result<(IntervalSet, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let mut set = prepare_file(path, FeatureKind::Node(node_type), &refs.blacklist, &mut diagnostics)?;

    let before = set.len();
    set.retain(|i| refs.sizes.get(&i.chrom).is_some());
    diagnostics.dropped(&format!("{node_type}: chromosome not in size table"), before - set.len());

    set.write_bed(&out_dir.join("prepared").join(format!("{node_type}.bed")))?;
    Ok((set, diagnostics))
}

fn local_context(
    config: &PipelineConfig,
    refs: &References,
    prepared: &BTreeMap<NodeType, IntervalSet>,
) -> Result<Vec<LocalEdgeRecord>> {
    let start = Instant::now();
    let edges_dir = config.out_dir.join("edges");
    let features = all_features(prepared.iter().map(|(t, s)| (*t, s)));

    let results: Vec<_> = prepared
        .par_iter()
        .map(|(&node_type, set)| {
            let result = join_node_type(
                node_type,
                set,
                &features,
                &refs.gene_windows,
                config.window(node_type),
            )
            .and_then(|records| {
                write_records(&edges_dir.join("local").join(format!("{node_type}.tsv")), &records)?;
                Ok(records)
            });
            (node_type, result)
        })
        .collect();

    let records: Vec<LocalEdgeRecord> = barrier("local context", results)?
        .into_iter()
        .flat_map(|(_, records)| records)
        .collect();
    write_records(&edges_dir.join("local_context.tsv"), &records)?;
    let genes = write_gene_splits(&edges_dir.join("genes"), &records)?;

    log::info!(
        "local context: {} records across {} node types and {} gene windows in {:?}",
        records.len(),
        prepared.len(),
        genes,
        start.elapsed()
    );
    Ok(records)
}

/// Per node type, the rows of every aggregated attribute.
type AttributeRows = BTreeMap<NodeType, Vec<(Attribute, Vec<AttributeRow>)>>;

fn aggregate_pair(
    stem: &str,
    nodes: &IntervalSet,
    attribute: Attribute,
    track: &IntervalSet,
    out_dir: &Path,
) -> Result<(Vec<AttributeRow>, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let rows = aggregate_track(nodes, attribute, track, &mut diagnostics)?;
    write_attribute_rows(&attribute_path(out_dir, stem, attribute), &rows)?;
    Ok((rows, diagnostics))
}

fn gc_content(
    config: &PipelineConfig,
    sets: &BTreeMap<NodeType, IntervalSet>,
    prefix: &str,
) -> Result<Vec<(NodeType, Vec<AttributeRow>)>> {
    let nodes: Vec<&IntervalSet> = sets.values().collect();
    let rows = match &config.reference_fasta {
        Some(fasta) => gc_rows(fasta, &nodes)?,
        None => {
            log::warn!("no reference_fasta configured; gc is 0 for every node");
            nodes.iter().map(|s| zero_rows(s, Attribute::Gc)).collect()
        }
    };
    let rows: Vec<_> = sets.keys().copied().zip(rows).collect();
    for (node_type, r) in &rows {
        let stem = format!("{prefix}{node_type}");
        write_attribute_rows(&attribute_path(&config.out_dir, &stem, Attribute::Gc), r)?;
    }
    Ok(rows)
}

fn prepare_tracks(
    config: &PipelineConfig,
    refs: &References,
) -> Result<(BTreeMap<Attribute, IntervalSet>, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let results: Vec<_> = config
        .attributes
        .par_iter()
        .map(|(&attribute, path)| {
            let mut diag = Diagnostics::new();
            let result = prepare_file(path, FeatureKind::Track(attribute), &refs.blacklist, &mut diag)
                .map(|set| (set, diag));
            (attribute, result)
        })
        .collect();
    let mut tracks = BTreeMap::new();
    for (attribute, (set, diag)) in barrier("prepare tracks", results)? {
        diagnostics.merge(diag);
        tracks.insert(attribute, set);
    }
    Ok((tracks, diagnostics))
}

/// Aggregates gc and every track onto each set. Attribute files are named
/// after `{prefix}{node_type}`.
fn aggregate_sets(
    config: &PipelineConfig,
    tracks: &BTreeMap<Attribute, IntervalSet>,
    sets: &BTreeMap<NodeType, IntervalSet>,
    prefix: &str,
) -> Result<(AttributeRows, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let pairs: Vec<(NodeType, Attribute)> = sets
        .keys()
        .flat_map(|t| tracks.keys().map(move |a| (*t, *a)))
        .collect();

    let (gc, results) = rayon::join(
        || gc_content(config, sets, prefix),
        || {
            pairs
                .par_iter()
                .map(|&(node_type, attribute)| {
                    let stem = format!("{prefix}{node_type}");
                    let result = aggregate_pair(
                        &stem,
                        &sets[&node_type],
                        attribute,
                        &tracks[&attribute],
                        &config.out_dir,
                    );
                    (format!("{stem} x {attribute}"), result.map(|r| (node_type, attribute, r)))
                })
                .collect::<Vec<_>>()
        },
    );

    let mut by_type = AttributeRows::new();
    for (node_type, rows) in gc? {
        by_type.entry(node_type).or_default().push((Attribute::Gc, rows));
    }
    let stage = match prefix.trim_end_matches('_') {
        "" => "aggregate".to_string(),
        p => format!("aggregate {p}"),
    };
    for (_, (node_type, attribute, (rows, diag))) in barrier(&stage, results)? {
        diagnostics.merge(diag);
        by_type.entry(node_type).or_default().push((attribute, rows));
    }
    Ok((by_type, diagnostics))
}

fn add_to_table(
    table: &mut NodeAttributeTable,
    sets: &BTreeMap<NodeType, IntervalSet>,
    rows: &AttributeRows,
) -> Result<()> {
    for (node_type, set) in sets {
        let rows = rows.get(node_type).map(Vec::as_slice).unwrap_or(&[]);
        table.add_node_type(*node_type, set, rows)?;
    }
    Ok(())
}

fn aggregate(
    config: &PipelineConfig,
    refs: &References,
    prepared: &BTreeMap<NodeType, IntervalSet>,
) -> Result<(NodeAttributeTable, BTreeMap<Attribute, IntervalSet>, Diagnostics)> {
    let start = Instant::now();
    let (tracks, mut diagnostics) = prepare_tracks(config, refs)?;
    let (rows, diag) = aggregate_sets(config, &tracks, prepared, "")?;
    diagnostics.merge(diag);

    let mut table = NodeAttributeTable::new();
    add_to_table(&mut table, prepared, &rows)?;

    log::info!(
        "aggregated {} attribute tracks onto {} nodes in {:?}",
        tracks.len(),
        table.len(),
        start.elapsed()
    );
    Ok((table, tracks, diagnostics))
}

/// Locates long-range endpoints missing from `table` (TFs, miRNAs, indexed
/// enhancers), aggregates them and adds them to `table`.
fn base_nodes(
    config: &PipelineConfig,
    refs: &References,
    prepared: &BTreeMap<NodeType, IntervalSet>,
    tracks: &BTreeMap<Attribute, IntervalSet>,
    edges: &[Edge],
    table: &mut NodeAttributeTable,
) -> Result<Diagnostics> {
    let start = Instant::now();
    let mut diagnostics = Diagnostics::new();

    let mut loci = BaseNodeLoci::new();
    if let Some(genes) = prepared.get(&NodeType::Gene) {
        loci.add_genes(genes);
    }
    for source in &config.interactions {
        if let InteractionSource::Mirna { active, .. } = source {
            loci.add_mirnas(active, &mut diagnostics)?;
        }
    }
    if let Some(index) = &refs.enhancers {
        loci.add_enhancers(index);
    }

    let sets = loci.resolve(edges, table);
    if sets.is_empty() {
        return Ok(diagnostics);
    }
    IntervalSet::concat("basenodes", sets.values())
        .write_bed(&config.out_dir.join("prepared").join("basenodes.bed"))?;

    let (rows, diag) = aggregate_sets(config, tracks, &sets, "basenodes_")?;
    diagnostics.merge(diag);
    let before = table.len();
    add_to_table(table, &sets, &rows)?;

    log::info!(
        "{} base nodes aggregated in {:?}",
        table.len() - before,
        start.elapsed()
    );
    Ok(diagnostics)
}

fn long_range(
    config: &PipelineConfig,
    refs: &References,
    prepared: &BTreeMap<NodeType, IntervalSet>,
) -> Result<(Vec<Edge>, Diagnostics)> {
    let start = Instant::now();
    let mut diagnostics = Diagnostics::new();
    let lookups = Lookups {
        genes: &refs.genes,
        enhancers: refs.enhancers.as_ref(),
    };

    let results: Vec<_> = config
        .interactions
        .par_iter()
        .map(|source| {
            let mut diag = Diagnostics::new();
            let result = extract(source, lookups, &mut diag).map(|edges| (edges, diag));
            (source.name(), result)
        })
        .collect();
    let mut edges = Vec::new();
    for (_, (e, diag)) in barrier("interactions", results)? {
        diagnostics.merge(diag);
        edges.extend(e);
    }

    if let Some(loops) = &config.loops {
        let calls = read_loops(&loops.path, loops.caller, loops.top_n, &mut diagnostics)?;
        let tss = match config.features.get(&NodeType::Tss) {
            Some(path) if loops.edges.iter().any(|e| e.tss_window.is_some()) => {
                Some(TssSet::load(path, &refs.blacklist, &mut diagnostics)?)
            }
            _ => None,
        };
        for spec in &loops.edges {
            let features = IntervalSet::concat(
                format!("{} loop features", spec.edge_type),
                spec.direct.iter().filter_map(|t| prepared.get(t)),
            );
            edges.extend(loop_edges(
                &calls,
                spec,
                &features,
                tss.as_ref(),
                &refs.genes,
                &mut diagnostics,
            )?);
        }
    }

    write_edges(&config.out_dir.join("edges").join("interaction_edges.tsv"), &edges)?;
    log::info!("long-range: {} edges in {:?}", edges.len(), start.elapsed());
    Ok((edges, diagnostics))
}

fn write_diagnostics(path: &Path, diagnostics: &Diagnostics) -> Result<()> {
    write_atomic(path, |w| {
        serde_json::to_writer_pretty(&mut *w, diagnostics)?;
        writeln!(w)?;
        Ok(())
    })
}

fn run_tissue(config: &PipelineConfig) -> Result<TissueOutputs> {
    let start = Instant::now();
    let out = &config.out_dir;
    let mut diagnostics = Diagnostics::new();
    log::info!("{}: starting run into {:?}", config.tissue, out);

    let mut refs = References::load(config, &mut diagnostics)?;

    let results: Vec<_> = config
        .features
        .par_iter()
        .map(|(&node_type, path)| (node_type, prepare_node_type(node_type, path, &refs, out)))
        .collect();
    let mut prepared = BTreeMap::new();
    for (node_type, (set, diag)) in barrier("prepare", results)? {
        diagnostics.merge(diag);
        prepared.insert(node_type, set);
    }
    if let (Some(index), Some(enhancers)) = (refs.enhancers.as_mut(), prepared.get(&NodeType::Enhancer)) {
        index.align(enhancers);
    }

    let (local, long) = rayon::join(
        || -> Result<_> {
            let records = local_context(config, &refs, &prepared)?;
            let (table, tracks, diag) = aggregate(config, &refs, &prepared)?;
            Ok((records, table, tracks, diag))
        },
        || long_range(config, &refs, &prepared),
    );
    let (records, mut table, tracks, local_diag) = local?;
    let (long_edges, long_diag) = long?;
    diagnostics.merge(local_diag);
    diagnostics.merge(long_diag);

    diagnostics.merge(base_nodes(config, &refs, &prepared, &tracks, &long_edges, &mut table)?);
    table.write(&out.join("attributes").join("node_attributes.tsv"))?;

    // base is a subset of full; only the full assembly is counted
    let base = Graph::assemble(long_edges.iter().cloned(), &table, &config.tissue, &mut Diagnostics::new());
    let local_edges = records.iter().map(|r| {
        let (query, hit) = r.endpoints();
        Edge::unweighted(query, hit, EdgeType::Local)
    });
    let full = Graph::assemble(long_edges.into_iter().chain(local_edges), &table, &config.tissue, &mut diagnostics);

    let write_variant = |variant: GraphVariant, graph: &Graph| -> Result<Summary> {
        let dir = variant.dir(out);
        graph.write(&dir)?;
        export(graph, &dir)
    };
    let base_summary = write_variant(GraphVariant::Base, &base)?;
    let full_summary = write_variant(GraphVariant::Full, &full)?;

    write_diagnostics(&out.join("diagnostics.json"), &diagnostics)?;
    diagnostics.log_summary(&config.tissue);
    log::info!("{}: finished in {:?}", config.tissue, start.elapsed());

    Ok(TissueOutputs {
        tissue: config.tissue.clone(),
        out_dir: out.clone(),
        base: base_summary,
        full: full_summary,
        diagnostics,
    })
}

/// Runs one tissue, on a dedicated pool when a thread count is configured.
pub fn run(config: &PipelineConfig) -> Result<TissueOutputs> {
    match config.threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| GraphError::Configuration(e.to_string()))?;
            pool.install(|| run_tissue(config))
        }
        None => run_tissue(config),
    }
}

/// Disjoint union of finished tissue runs, re-indexed and exported to `out`.
pub fn compose(tissue_dirs: &[PathBuf], variant: GraphVariant, out: &Path) -> Result<Summary> {
    let mut diagnostics = Diagnostics::new();
    let graphs = tissue_dirs
        .iter()
        .map(|dir| Graph::read(&variant.dir(dir), &mut diagnostics))
        .collect::<Result<Vec<_>>>()?;
    let graph = Graph::compose(graphs);
    graph.write(out)?;
    let summary = export(&graph, out)?;
    diagnostics.log_summary("compose");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barrier_names_every_failed_task() {
        let results: Vec<(NodeType, Result<u32>)> = vec![
            (NodeType::Enhancer, Ok(1)),
            (NodeType::Tss, Err(GraphError::MissingChromosome("chr9".into()))),
            (NodeType::Gene, Err(GraphError::Configuration("boom".into()))),
        ];
        match barrier("prepare", results) {
            Err(GraphError::IncompleteBarrier {
                stage,
                expected,
                completed,
                failed,
            }) => {
                assert_eq!(stage, "prepare");
                assert_eq!((expected, completed), (3, 1));
                assert_eq!(failed, vec!["tss".to_string(), "gencode".to_string()]);
            }
            other => panic!("expected an incomplete barrier, got {other:?}"),
        }
    }

    #[test]
    fn barrier_passes_complete_stages_through_in_order() {
        let results: Vec<(&str, Result<u32>)> = vec![("a", Ok(1)), ("b", Ok(2))];
        let done = barrier("stage", results).unwrap();
        assert_eq!(done, vec![("a", 1), ("b", 2)]);
    }
}
