//! Long-range edges from curated interaction tables.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Instant;

use polars::prelude::*;

use crate::diagnostics::Diagnostics;
use crate::errors::{GraphError, Result};
use crate::graph::Edge;
use crate::io::open_reader;
use crate::reference::{ActiveMirnas, EnhancerIndex, GeneLookup};
use crate::stats::percentile;
use crate::vocab::EdgeType;

pub const DEFAULT_MIN_METHODS: u32 = 3;
pub const CIRCUITS_PERCENTILE: f64 = 80.0;
pub const ENHANCER_ENHANCER_PERCENTILE: f64 = 30.0;
pub const ENHANCER_GENE_PERCENTILE: f64 = 70.0;

const TF_RELATIONSHIPS: [&str; 3] = ["TF", "I Marker", "TFMarker"];

/// One configured interaction table.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionSource {
    Ppi {
        path: PathBuf,
        tissue_column: String,
        min_methods: u32,
    },
    Mirna {
        targets: PathBuf,
        active: PathBuf,
    },
    TfMarkers {
        path: PathBuf,
        marker: Option<String>,
    },
    Circuits {
        path: PathBuf,
        percentile: f64,
    },
    EnhancerEnhancer {
        path: PathBuf,
        percentile: f64,
    },
    EnhancerGene {
        path: PathBuf,
        percentile: f64,
    },
}

impl InteractionSource {
    pub fn name(&self) -> &'static str {
        match self {
            InteractionSource::Ppi { .. } => "ppi",
            InteractionSource::Mirna { .. } => "mirna",
            InteractionSource::TfMarkers { .. } => "tf_marker",
            InteractionSource::Circuits { .. } => "circuits",
            InteractionSource::EnhancerEnhancer { .. } => "enhancer-enhancer",
            InteractionSource::EnhancerGene { .. } => "enhancer-gene",
        }
    }

    pub fn needs_enhancer_index(&self) -> bool {
        matches!(
            self,
            InteractionSource::EnhancerEnhancer { .. } | InteractionSource::EnhancerGene { .. }
        )
    }
}

/// Shared read-only lookups for the extractors.
#[derive(Debug, Clone, Copy)]
pub struct Lookups<'a> {
    pub genes: &'a GeneLookup,
    pub enhancers: Option<&'a EnhancerIndex>,
}

pub fn extract(
    source: &InteractionSource,
    lookups: Lookups<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Edge>> {
    let start = Instant::now();
    let edges = match source {
        InteractionSource::Ppi {
            path,
            tissue_column,
            min_methods,
        } => ppi_edges(path, tissue_column, *min_methods, lookups.genes, diagnostics)?,
        InteractionSource::Mirna { targets, active } => {
            let active = ActiveMirnas::load(active)?;
            mirna_edges(targets, &active, lookups.genes, diagnostics)?
        }
        InteractionSource::TfMarkers { path, marker } => {
            tf_marker_edges(path, marker.as_deref(), lookups.genes, diagnostics)?
        }
        InteractionSource::Circuits { path, percentile } => {
            circuit_edges(path, *percentile, lookups.genes, diagnostics)?
        }
        InteractionSource::EnhancerEnhancer { path, percentile } => {
            let index = enhancer_index(lookups)?;
            enhancer_enhancer_edges(path, *percentile, index, diagnostics)?
        }
        InteractionSource::EnhancerGene { path, percentile } => {
            let index = enhancer_index(lookups)?;
            enhancer_gene_edges(path, *percentile, index, lookups.genes, diagnostics)?
        }
    };
    log::info!("{}: {} edges in {:?}", source.name(), edges.len(), start.elapsed());
    Ok(edges)
}

fn enhancer_index(lookups: Lookups<'_>) -> Result<&EnhancerIndex> {
    lookups
        .enhancers
        .ok_or_else(|| GraphError::Configuration("enhancer networks need an enhancer index".into()))
}

/// Resolves a symbol, counting a miss against `source`.
fn resolve<'a>(
    genes: &'a GeneLookup,
    symbol: &str,
    source: &str,
    diagnostics: &mut Diagnostics,
) -> Option<&'a str> {
    match genes.resolve(symbol) {
        Ok(id) => Some(id),
        Err(e) => {
            diagnostics.record(source, &e);
            None
        }
    }
}

fn require_columns(df: &DataFrame, path: &Path, columns: &[&str]) -> Result<()> {
    for column in columns {
        if df.column(column).is_err() {
            return Err(GraphError::MissingColumn {
                path: path.display().to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Protein-protein interactions with experimental evidence, at least
/// `min_methods` detection methods and a positive tissue score.
pub fn ppi_edges(
    path: &Path,
    tissue_column: &str,
    min_methods: u32,
    genes: &GeneLookup,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Edge>> {
    let source = path.display().to_string();
    let parse_options = CsvParseOptions::default().with_separator(b'\t');
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_parse_options(parse_options)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    require_columns(
        &df,
        path,
        &["symbol1", "symbol2", "evidence_type", "n_methods", tissue_column],
    )?;

    let filtered = df
        .lazy()
        .select([
            col("symbol1").cast(DataType::String),
            col("symbol2").cast(DataType::String),
            col("evidence_type").cast(DataType::String),
            col("n_methods").cast(DataType::Float64),
            col(tissue_column).cast(DataType::Float64).alias("tissue_score"),
        ])
        .filter(
            col("n_methods")
                .gt_eq(lit(min_methods as f64))
                .and(col("tissue_score").gt(lit(0.0))),
        )
        .collect()?;

    let symbol1 = filtered.column("symbol1")?.str()?;
    let symbol2 = filtered.column("symbol2")?.str()?;
    let evidence = filtered.column("evidence_type")?.str()?;

    let mut edges = Vec::new();
    for ((a, b), ev) in symbol1.into_iter().zip(symbol2).zip(evidence) {
        let (Some(a), Some(b), Some(ev)) = (a, b, ev) else {
            continue;
        };
        if !ev.contains("exp") {
            continue;
        }
        let (Some(id_a), Some(id_b)) = (
            resolve(genes, a, &source, diagnostics),
            resolve(genes, b, &source, diagnostics),
        ) else {
            continue;
        };
        edges.push(Edge::unweighted(id_a, id_b, EdgeType::Ppi));
    }
    Ok(edges)
}

/// miRNA -> target gene, for miRNAs active in the tissue.
pub fn mirna_edges(
    targets: &Path,
    active: &ActiveMirnas,
    genes: &GeneLookup,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Edge>> {
    let source = targets.display().to_string();
    let mut edges = Vec::new();
    let mut inactive = 0;

    for line in open_reader(targets)?.lines() {
        let line = line?;
        let mut fields = line.split('\t');
        let (Some(mirna), Some(symbol)) = (fields.next(), fields.next()) else {
            continue;
        };
        if !active.contains(mirna) {
            inactive += 1;
            continue;
        }
        if let Some(id) = resolve(genes, symbol, &source, diagnostics) {
            edges.push(Edge::unweighted(mirna, id, EdgeType::Mirna));
        }
    }

    diagnostics.dropped(&source, inactive);
    Ok(edges)
}

/// TF -> gene marker relationships. Gene lists separated by `;` fan out into
/// one edge per gene; for "I Marker" rows the gene list holds the TFs.
pub fn tf_marker_edges(
    path: &Path,
    marker: Option<&str>,
    genes: &GeneLookup,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Edge>> {
    let source = path.display().to_string();
    let mut edges = Vec::new();

    for line in open_reader(path)?.lines().skip(1) {
        let line = line?;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() <= 10 {
            continue;
        }
        let relationship = fields[2];
        if !TF_RELATIONSHIPS.contains(&relationship) {
            continue;
        }
        if marker.is_some_and(|m| m != fields[5]) {
            continue;
        }

        let gene = fields[1];
        for listed in fields[10].split(';').filter(|s| !s.is_empty()) {
            let (tf, target) = if relationship == "I Marker" {
                (listed, gene)
            } else {
                (gene, listed)
            };
            let (Some(tf_id), Some(target_id)) = (
                resolve(genes, tf, &source, diagnostics),
                resolve(genes, target, &source, diagnostics),
            ) else {
                continue;
            };
            edges.push(Edge::unweighted(format!("{tf_id}_tf"), target_id, EdgeType::TfMarker));
        }
    }
    Ok(edges)
}

/// Reads `(fields, score)` rows of a scored table, skipping `header_rows`.
/// Rows with a non-numeric score are counted as malformed.
fn scored_rows(
    path: &Path,
    header_rows: usize,
    score_column: usize,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<(Vec<String>, f64)>> {
    let source = path.display().to_string();
    let mut rows = Vec::new();
    for (n, line) in open_reader(path)?.lines().enumerate().skip(header_rows) {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let fields: Vec<String> = line.split('\t').map(String::from).collect();
        match fields.get(score_column).and_then(|s| s.trim().parse::<f64>().ok()) {
            Some(score) => rows.push((fields, score)),
            None => diagnostics.record(
                &source,
                &GraphError::MalformedInterval {
                    path: source.clone(),
                    line: n + 1,
                    reason: "missing or non-numeric score".into(),
                },
            ),
        }
    }
    Ok(rows)
}

/// Score cutoff over every row of the file, before any filtering.
fn cutoff(path: &Path, rows: &[(Vec<String>, f64)], q: f64) -> Option<f64> {
    let scores: Vec<f64> = rows.iter().map(|(_, s)| *s).collect();
    let cutoff = percentile(&scores, q);
    if let Some(c) = cutoff {
        log::debug!("{:?}: {q}th percentile cutoff {c}", path);
    }
    cutoff
}

/// Regulatory circuits `TF, gene, score`, kept at or above the percentile
/// cutoff and weighted by score.
pub fn circuit_edges(
    path: &Path,
    q: f64,
    genes: &GeneLookup,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Edge>> {
    let source = path.display().to_string();
    let rows = scored_rows(path, 0, 2, diagnostics)?;
    let Some(cutoff) = cutoff(path, &rows, q) else {
        return Ok(Vec::new());
    };

    let mut edges = Vec::new();
    for (fields, score) in rows.iter().filter(|(_, s)| *s >= cutoff) {
        let (Some(tf), Some(gene)) = (
            resolve(genes, &fields[0], &source, diagnostics),
            resolve(genes, &fields[1], &source, diagnostics),
        ) else {
            continue;
        };
        edges.push(Edge::new(format!("{tf}_tf"), gene, *score, EdgeType::Circuits));
    }
    Ok(edges)
}

/// Enhancer-enhancer links `enhancer, enhancer, score` (header row).
pub fn enhancer_enhancer_edges(
    path: &Path,
    q: f64,
    index: &EnhancerIndex,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Edge>> {
    let source = path.display().to_string();
    let rows = scored_rows(path, 1, 2, diagnostics)?;
    let Some(cutoff) = cutoff(path, &rows, q) else {
        return Ok(Vec::new());
    };

    let mut edges = Vec::new();
    let mut unindexed = 0;
    for (fields, _) in rows.iter().filter(|(_, s)| *s >= cutoff) {
        match (index.get(&fields[0]), index.get(&fields[1])) {
            (Some(a), Some(b)) => edges.push(Edge::unweighted(a, b, EdgeType::EnhancerEnhancer)),
            _ => unindexed += 1,
        }
    }
    diagnostics.unresolved(&source, unindexed);
    Ok(edges)
}

/// Enhancer-gene links `enhancer, _, symbol, score` (header row).
pub fn enhancer_gene_edges(
    path: &Path,
    q: f64,
    index: &EnhancerIndex,
    genes: &GeneLookup,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Edge>> {
    let source = path.display().to_string();
    let rows = scored_rows(path, 1, 3, diagnostics)?;
    let Some(cutoff) = cutoff(path, &rows, q) else {
        return Ok(Vec::new());
    };

    let mut edges = Vec::new();
    for (fields, _) in rows.iter().filter(|(_, s)| *s >= cutoff) {
        let Some(enhancer) = index.get(&fields[0]) else {
            diagnostics.record(&source, &GraphError::unresolved(&fields[0], "enhancer index"));
            continue;
        };
        if let Some(gene) = resolve(genes, &fields[2], &source, diagnostics) {
            edges.push(Edge::unweighted(enhancer, gene, EdgeType::EnhancerGene));
        }
    }
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn genes() -> GeneLookup {
        GeneLookup::from_pairs([("A", "ENSG0001"), ("B", "ENSG0002"), ("C", "ENSG0003")])
    }

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn ppi_requires_three_methods_experimental_evidence_and_tissue_signal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "ppi.tsv",
            "symbol1\tsymbol2\tevidence_type\tn_methods\tliver\tlung\n\
             A\tB\texp;ortho\t3\t1\t0\n\
             A\tC\texp;ortho\t2\t1\t1\n\
             B\tC\tpred\t5\t1\t1\n\
             B\tC\texp\t4\t0\t1\n\
             A\tZZZ\texp\t4\t1\t1\n",
        );
        let mut diag = Diagnostics::new();
        let edges = ppi_edges(&path, "liver", DEFAULT_MIN_METHODS, &genes(), &mut diag).unwrap();

        assert_eq!(edges, vec![Edge::unweighted("ENSG0001", "ENSG0002", EdgeType::Ppi)]);
        assert_eq!(diag.total().unresolved, 1);
    }

    #[test]
    fn ppi_missing_tissue_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "ppi.tsv",
            "symbol1\tsymbol2\tevidence_type\tn_methods\tliver\nA\tB\texp\t3\t1\n",
        );
        let err = ppi_edges(&path, "brain", 3, &genes(), &mut Diagnostics::new()).unwrap_err();
        assert!(matches!(err, GraphError::MissingColumn { column, .. } if column == "brain"));
    }

    #[test]
    fn mirna_targets_filtered_by_activity() {
        let dir = tempfile::tempdir().unwrap();
        let targets = write(&dir, "targets.tsv", "miR-1\tA\nmiR-2\tB\nmiR-1\tNOPE\n");
        let active: ActiveMirnas = ["miR-1"].into_iter().collect();
        let mut diag = Diagnostics::new();
        let edges = mirna_edges(&targets, &active, &genes(), &mut diag).unwrap();

        assert_eq!(edges, vec![Edge::unweighted("miR-1", "ENSG0001", EdgeType::Mirna)]);
        assert_eq!(diag.total().dropped, 1);
        assert_eq!(diag.total().unresolved, 1);
    }

    #[test]
    fn tf_markers_fan_out_and_reverse() {
        let dir = tempfile::tempdir().unwrap();
        let row = |gene: &str, rel: &str, marker: &str, list: &str| {
            format!("x\t{gene}\t{rel}\tx\tx\t{marker}\tx\tx\tx\tx\t{list}\n")
        };
        let content = format!(
            "header\n{}{}{}{}x\tA\tTF\n",
            row("A", "TF", "liver", "B;C"),
            row("C", "I Marker", "liver", "A"),
            row("A", "Marker", "liver", "B"),
            row("B", "TF", "lung", "C"),
        );
        let path = write(&dir, "markers.tsv", &content);

        let edges = tf_marker_edges(&path, Some("liver"), &genes(), &mut Diagnostics::new()).unwrap();
        assert_eq!(
            edges,
            vec![
                Edge::unweighted("ENSG0001_tf", "ENSG0002", EdgeType::TfMarker),
                Edge::unweighted("ENSG0001_tf", "ENSG0003", EdgeType::TfMarker),
                Edge::unweighted("ENSG0001_tf", "ENSG0003", EdgeType::TfMarker),
            ]
        );

        let all = tf_marker_edges(&path, None, &genes(), &mut Diagnostics::new()).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn circuits_keep_top_scores_as_weights() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = String::new();
        for i in 1..=10 {
            content.push_str(&format!("A\tB\t{i}\n"));
        }
        content.push_str("A\tB\tnan-ish\n");
        let path = write(&dir, "circuits.tsv", &content);

        let mut diag = Diagnostics::new();
        let edges = circuit_edges(&path, CIRCUITS_PERCENTILE, &genes(), &mut diag).unwrap();
        let weights: Vec<f64> = edges.iter().map(|e| e.weight).collect();
        // 80th percentile of 1..=10 is 8.2
        assert_eq!(weights, vec![9.0, 10.0]);
        assert_eq!(edges[0].source, "ENSG0001_tf");
        assert_eq!(diag.total().malformed, 1);
    }

    #[test]
    fn enhancer_networks_use_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = EnhancerIndex::from_pairs([("e1", "enhancer_chr1_100"), ("e2", "enhancer_chr1_900")]);

        let ee = write(&dir, "ee.tsv", "a\tb\tscore\ne1\te2\t10\ne1\te3\t20\ne2\te1\t1\n");
        let mut diag = Diagnostics::new();
        let edges = enhancer_enhancer_edges(&ee, ENHANCER_ENHANCER_PERCENTILE, &index, &mut diag).unwrap();
        assert_eq!(
            edges,
            vec![Edge::unweighted("enhancer_chr1_100", "enhancer_chr1_900", EdgeType::EnhancerEnhancer)]
        );
        assert_eq!(diag.total().unresolved, 1);

        let eg = write(&dir, "eg.tsv", "e\tx\tsymbol\tscore\ne1\t.\tA\t5\ne2\t.\tB\t1\n");
        let edges =
            enhancer_gene_edges(&eg, ENHANCER_GENE_PERCENTILE, &index, &genes(), &mut Diagnostics::new())
                .unwrap();
        assert_eq!(
            edges,
            vec![Edge::unweighted("enhancer_chr1_100", "ENSG0001", EdgeType::EnhancerGene)]
        );
    }

    #[test]
    fn enhancer_sources_need_an_index() {
        let src = InteractionSource::EnhancerGene {
            path: PathBuf::from("unused"),
            percentile: 70.0,
        };
        let lookups = Lookups {
            genes: &genes(),
            enhancers: None,
        };
        let err = extract(&src, lookups, &mut Diagnostics::new()).unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }
}
