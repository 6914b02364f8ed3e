//! Windowed joins between each node type and every other prepared feature,
//! restricted to gene-proximal windows.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Instant;

use rustc_hash::FxHashSet;

use crate::diagnostics::Diagnostics;
use crate::errors::{GraphError, Result};
use crate::interval_set::{parse_bed_line, IntervalSet, JoinMode};
use crate::io::{open_reader, write_atomic};
use crate::ruomics_structs::Interval;
use crate::vocab::NodeType;

/// A query/hit pair from the local-context join. Both intervals carry their
/// original coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalEdgeRecord {
    pub query: Interval,
    pub hit: Interval,
    pub distance: i64,
    pub gene_window: String,
}

impl LocalEdgeRecord {
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.query.to_bed_line(),
            self.hit.to_bed_line(),
            self.distance,
            self.gene_window
        )
    }

    pub fn parse_line(line: &str, path: &str, line_no: usize) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 10 {
            return Err(GraphError::MalformedInterval {
                path: path.to_string(),
                line: line_no,
                reason: format!("expected 10 columns, found {}", fields.len()),
            });
        }
        let query = parse_bed_line(&fields[0..4].join("\t"), path, line_no)?;
        let hit = parse_bed_line(&fields[4..8].join("\t"), path, line_no)?;
        let distance = fields[8].parse().map_err(|_| GraphError::MalformedInterval {
            path: path.to_string(),
            line: line_no,
            reason: format!("non-numeric distance '{}'", fields[8]),
        })?;

        Ok(LocalEdgeRecord {
            query,
            hit,
            distance,
            gene_window: fields[9].to_string(),
        })
    }

    /// Edge endpoints: the query's name and the hit's name.
    pub fn endpoints(&self) -> (&str, &str) {
        (&self.query.name, &self.hit.name)
    }
}

/// The "all features" set: every prepared type that takes part in windowed
/// joins, concatenated and sorted.
pub fn all_features<'a, I>(prepared: I) -> IntervalSet
where
    I: IntoIterator<Item = (NodeType, &'a IntervalSet)>,
{
    let sets: Vec<&IntervalSet> = prepared
        .into_iter()
        .filter(|(t, _)| !t.is_direct_only())
        .map(|(_, s)| s)
        .collect();
    IntervalSet::concat("all_features", sets)
}

/// Joins one node type against all features.
///
/// `window` is ignored for direct-only types. Self-pairs are removed, and only
/// queries that overlap a gene window survive. A query inside several gene
/// windows yields one record per window.
pub fn join_node_type(
    node_type: NodeType,
    query: &IntervalSet,
    features: &IntervalSet,
    gene_windows: &IntervalSet,
    window: Option<u32>,
) -> Result<Vec<LocalEdgeRecord>> {
    let start = Instant::now();

    let mode = match window {
        Some(w) if !node_type.is_direct_only() => JoinMode::Windowed(w),
        _ => JoinMode::Direct,
    };

    // query index -> overlapping gene windows
    let mut gene_window: Vec<Vec<&str>> = vec![Vec::new(); query.len()];
    for o in query.intersect(gene_windows, JoinMode::Direct)? {
        gene_window[o.query_idx].push(o.hit.name.as_str());
    }

    let mut seen = FxHashSet::default();
    let mut records = Vec::new();
    let mut self_pairs = 0usize;

    for o in query.intersect(features, mode)? {
        if o.query == o.hit {
            self_pairs += 1;
            continue;
        }
        let distance = o.query.signed_distance(o.hit);
        for window_id in &gene_window[o.query_idx] {
            let record = LocalEdgeRecord {
                query: o.query.clone(),
                hit: o.hit.clone(),
                distance,
                gene_window: window_id.to_string(),
            };
            if seen.insert(record.clone()) {
                records.push(record);
            }
        }
    }

    log::info!(
        "{}: {} local-context records ({:?}, {} self-pairs removed) in {:?}",
        node_type,
        records.len(),
        mode,
        self_pairs,
        start.elapsed()
    );

    Ok(records)
}

pub fn write_records(path: &Path, records: &[LocalEdgeRecord]) -> Result<()> {
    write_atomic(path, |w| {
        for record in records {
            writeln!(w, "{}", record.to_line())?;
        }
        Ok(())
    })
}

/// Records grouped by gene window, in window name order.
pub fn by_gene_window(records: &[LocalEdgeRecord]) -> BTreeMap<&str, Vec<&LocalEdgeRecord>> {
    let mut groups: BTreeMap<&str, Vec<&LocalEdgeRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.gene_window.as_str()).or_default().push(record);
    }
    groups
}

/// Writes `{dir}/{gene_window}.tsv` for every gene window that has records.
/// Returns the number of files written.
pub fn write_gene_splits(dir: &Path, records: &[LocalEdgeRecord]) -> Result<usize> {
    let groups = by_gene_window(records);
    for (window_id, group) in &groups {
        write_atomic(&dir.join(format!("{window_id}.tsv")), |w| {
            for record in group {
                writeln!(w, "{}", record.to_line())?;
            }
            Ok(())
        })?;
    }
    Ok(groups.len())
}

pub fn read_records(path: &Path, diagnostics: &mut Diagnostics) -> Result<Vec<LocalEdgeRecord>> {
    let source = path.display().to_string();
    let mut records = Vec::new();
    for (n, line) in open_reader(path)?.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match LocalEdgeRecord::parse_line(&line, &source, n + 1) {
            Ok(r) => records.push(r),
            Err(e) => diagnostics.record(&source, &e),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn iv(chrom: &str, start: u32, end: u32, name: &str) -> Interval {
        Interval::new(chrom, start, end, name)
    }

    fn set(label: &str, intervals: Vec<Interval>) -> IntervalSet {
        IntervalSet::new(label, intervals).sorted()
    }

    fn fixture() -> (IntervalSet, IntervalSet, IntervalSet, IntervalSet) {
        let enhancers = set(
            "enhancers",
            vec![iv("chr1", 1000, 1200, "chr1_1000_E1"), iv("chr1", 90_000, 90_100, "chr1_90000_E2")],
        );
        let promoters = set("promoters", vec![iv("chr1", 2500, 2600, "chr1_2500_P1")]);
        let tads = set("tads", vec![iv("chr1", 0, 100_000, "chr1_0_tads")]);
        let genes = set("gene_windows", vec![iv("chr1", 0, 5000, "ENSG00000001")]);
        (enhancers, promoters, tads, genes)
    }

    #[test]
    fn all_features_excludes_direct_only_types() {
        let (enhancers, promoters, tads, _) = fixture();
        let all = all_features([
            (NodeType::Enhancer, &enhancers),
            (NodeType::Promoter, &promoters),
            (NodeType::Tad, &tads),
        ]);
        assert_eq!(all.len(), 3);
        assert!(all.is_sorted());
    }

    #[test]
    fn windowed_join_with_distance_and_gene_window() {
        let (enhancers, promoters, _, genes) = fixture();
        let all = all_features([(NodeType::Enhancer, &enhancers), (NodeType::Promoter, &promoters)]);

        let records =
            join_node_type(NodeType::Enhancer, &enhancers, &all, &genes, Some(2000)).unwrap();

        // E1 reaches P1 within 2kb; E2 is outside every gene window; self-pairs are gone
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.endpoints(), ("chr1_1000_E1", "chr1_2500_P1"));
        assert_eq!(r.distance, 1300);
        assert_eq!(r.gene_window, "ENSG00000001");
    }

    #[test]
    fn direct_only_types_ignore_the_window() {
        let (enhancers, promoters, tads, genes) = fixture();
        let all = all_features([(NodeType::Enhancer, &enhancers), (NodeType::Promoter, &promoters)]);

        let records = join_node_type(NodeType::Tad, &tads, &all, &genes, Some(2000)).unwrap();
        let hits: Vec<&str> = records.iter().map(|r| r.hit.name.as_str()).collect();
        assert_eq!(hits, vec!["chr1_1000_E1", "chr1_2500_P1", "chr1_90000_E2"]);
        assert!(records.iter().all(|r| r.distance < 0));
    }

    #[test]
    fn query_in_two_gene_windows_is_tagged_with_both() {
        let enhancers = set("enhancers", vec![iv("chr1", 1000, 1100, "chr1_1000_E1")]);
        let promoters = set("promoters", vec![iv("chr1", 2500, 2600, "chr1_2500_P1")]);
        let genes = set(
            "gene_windows",
            vec![iv("chr1", 0, 5000, "GENEA"), iv("chr1", 900, 3000, "GENEB")],
        );
        let all = all_features([(NodeType::Enhancer, &enhancers), (NodeType::Promoter, &promoters)]);

        let records = join_node_type(NodeType::Enhancer, &enhancers, &all, &genes, Some(2000)).unwrap();
        let windows: Vec<&str> = records.iter().map(|r| r.gene_window.as_str()).collect();
        assert_eq!(windows, vec!["GENEA", "GENEB"]);
        assert!(records.iter().all(|r| r.endpoints() == ("chr1_1000_E1", "chr1_2500_P1")));

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(write_gene_splits(dir.path(), &records).unwrap(), 2);
        for gene in ["GENEA", "GENEB"] {
            let back = read_records(&dir.path().join(format!("{gene}.tsv")), &mut Diagnostics::new()).unwrap();
            assert_eq!(back.len(), 1);
            assert_eq!(back[0].gene_window, gene);
        }
    }

    #[test]
    fn records_round_trip_through_tsv() {
        let (enhancers, promoters, _, genes) = fixture();
        let all = all_features([(NodeType::Enhancer, &enhancers), (NodeType::Promoter, &promoters)]);
        let records =
            join_node_type(NodeType::Promoter, &promoters, &all, &genes, Some(2000)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("promoters.tsv");
        write_records(&path, &records).unwrap();
        let back = read_records(&path, &mut Diagnostics::new()).unwrap();
        assert_eq!(back, records);
    }
}
