//! Aggregation of attribute tracks onto node intervals.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use bio::io::fasta;
use rustc_hash::FxHashMap;

use crate::diagnostics::Diagnostics;
use crate::errors::{GraphError, Result};
use crate::interval_set::IntervalSet;
use crate::io::{open_reader, write_rows};
use crate::overlaps_two_pointer::two_pointer_accumulate;
use crate::ruomics_structs::Interval;
use crate::vocab::Attribute;

/// One node's aggregated value(s) for one attribute. Recombination carries
/// `[sum, mean]`, every other attribute a single value.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRow {
    pub node: Interval,
    pub values: Vec<f64>,
}

impl AttributeRow {
    pub fn size(&self) -> u32 {
        self.node.len()
    }

    pub fn to_line(&self) -> String {
        let mut line = format!("{}\t{}", self.node.to_bed_line(), self.size());
        for v in &self.values {
            line.push('\t');
            line.push_str(&v.to_string());
        }
        line
    }
}

fn width(attribute: Attribute) -> usize {
    if attribute == Attribute::Recombination {
        2
    } else {
        1
    }
}

/// Rows of zeros for an attribute with no configured track.
pub fn zero_rows(nodes: &IntervalSet, attribute: Attribute) -> Vec<AttributeRow> {
    nodes
        .iter()
        .map(|node| AttributeRow {
            node: node.clone(),
            values: vec![0.0; width(attribute)],
        })
        .collect()
}

/// Overlap-weighted aggregation of `track` onto `nodes`. Rows are returned in
/// node order. Both sets must be sorted.
pub fn aggregate_track(
    nodes: &IntervalSet,
    attribute: Attribute,
    track: &IntervalSet,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<AttributeRow>> {
    for set in [nodes, track] {
        if !set.is_sorted() {
            return Err(GraphError::UnsortedIntervals {
                label: set.label().to_string(),
            });
        }
    }
    let start = Instant::now();

    let rows = if attribute == Attribute::Recombination {
        let mut malformed = 0;
        let scores: Vec<f64> = track
            .iter()
            .map(|i| {
                i.name.parse::<f64>().unwrap_or_else(|_| {
                    malformed += 1;
                    0.0
                })
            })
            .collect();
        diagnostics.malformed(track.label(), malformed);

        two_pointer_accumulate(nodes.intervals(), track.intervals(), Some(&scores))
            .into_iter()
            .zip(nodes.iter())
            .map(|(t, node)| AttributeRow {
                node: node.clone(),
                values: vec![t.score_sum, t.score_mean()],
            })
            .collect()
    } else {
        two_pointer_accumulate(nodes.intervals(), track.intervals(), None)
            .into_iter()
            .zip(nodes.iter())
            .map(|(t, node)| AttributeRow {
                node: node.clone(),
                values: vec![t.overlap_bp as f64],
            })
            .collect()
    };

    log::debug!(
        "{} x {}: {} nodes in {:?}",
        nodes.label(),
        attribute,
        nodes.len(),
        start.elapsed()
    );
    Ok(rows)
}

/// G+C fraction of `seq[start..end]`, clipped to the sequence. N bases count
/// toward the length.
pub fn gc_fraction(seq: &[u8], start: u32, end: u32) -> f64 {
    let end = (end as usize).min(seq.len());
    let start = (start as usize).min(end);
    if start == end {
        return 0.0;
    }
    let gc = seq[start..end]
        .iter()
        .filter(|b| matches!(b, b'G' | b'C' | b'g' | b'c'))
        .count();
    gc as f64 / (end - start) as f64
}

/// GC rows for several node sets in one streaming pass over the reference,
/// holding a single chromosome in memory at a time. Nodes on chromosomes
/// missing from the reference get 0.
pub fn gc_rows(fasta_path: &Path, sets: &[&IntervalSet]) -> Result<Vec<Vec<AttributeRow>>> {
    let start = Instant::now();

    let mut values: Vec<Vec<f64>> = sets.iter().map(|s| vec![0.0; s.len()]).collect();

    // chromosome -> (set, node) positions
    let mut by_chrom: FxHashMap<&str, Vec<(usize, usize)>> = FxHashMap::default();
    for (s, set) in sets.iter().enumerate() {
        for (n, node) in set.iter().enumerate() {
            by_chrom.entry(node.chrom.as_str()).or_default().push((s, n));
        }
    }

    let reader = fasta::Reader::new(open_reader(fasta_path)?);
    let mut seen = 0;
    for record in reader.records() {
        let record = record?;
        let Some(positions) = by_chrom.get(record.id()) else {
            continue;
        };
        seen += 1;
        let seq = record.seq();
        for &(s, n) in positions {
            let node = &sets[s].intervals()[n];
            values[s][n] = gc_fraction(seq, node.start, node.end);
        }
    }

    if seen < by_chrom.len() {
        log::warn!(
            "{} of {} chromosomes not found in {:?}; their gc is 0",
            by_chrom.len() - seen,
            by_chrom.len(),
            fasta_path
        );
    }
    log::info!("gc content for {} node sets in {:?}", sets.len(), start.elapsed());

    Ok(sets
        .iter()
        .zip(values)
        .map(|(set, vals)| {
            set.iter()
                .zip(vals)
                .map(|(node, gc)| AttributeRow {
                    node: node.clone(),
                    values: vec![gc],
                })
                .collect()
        })
        .collect())
}

/// `attributes/{attribute}/{stem}_{attribute}.tsv`, where `stem` names the
/// node set.
pub fn attribute_path(out_dir: &Path, stem: impl fmt::Display, attribute: Attribute) -> PathBuf {
    out_dir
        .join("attributes")
        .join(attribute.as_str())
        .join(format!("{stem}_{attribute}.tsv"))
}

pub fn write_attribute_rows(path: &Path, rows: &[AttributeRow]) -> Result<()> {
    write_rows(path, None, rows.iter().map(AttributeRow::to_line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::NodeType;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn iv(chrom: &str, start: u32, end: u32, name: &str) -> Interval {
        Interval::new(chrom, start, end, name)
    }

    fn nodes() -> IntervalSet {
        IntervalSet::new(
            "enhancers",
            vec![iv("chr1", 0, 10, "chr1_0_E1"), iv("chr1", 20, 40, "chr1_20_E2")],
        )
        .sorted()
    }

    #[test]
    fn overlap_weighted_sum() {
        let track = IntervalSet::new(
            "h3k27ac",
            vec![iv("chr1", 5, 25, "."), iv("chr1", 30, 100, ".")],
        )
        .sorted();
        let rows = aggregate_track(&nodes(), Attribute::H3k27ac, &track, &mut Diagnostics::new())
            .unwrap();
        assert_eq!(rows[0].values, vec![5.0]);
        assert_eq!(rows[1].values, vec![15.0]);
        assert_eq!(rows[1].to_line(), "chr1\t20\t40\tchr1_20_E2\t20\t15");
    }

    #[test]
    fn no_overlap_is_zero_not_missing() {
        let track = IntervalSet::new("dnase", vec![iv("chr2", 0, 100, ".")]);
        let rows =
            aggregate_track(&nodes(), Attribute::Dnase, &track, &mut Diagnostics::new()).unwrap();
        assert!(rows.iter().all(|r| r.values == vec![0.0]));
    }

    #[test]
    fn recombination_keeps_sum_and_mean() {
        let track = IntervalSet::new(
            "recombination",
            vec![
                iv("chr1", 0, 3, "1.5"),
                iv("chr1", 4, 6, "0.5"),
                iv("chr1", 8, 9, "n/a"),
            ],
        );
        let mut diag = Diagnostics::new();
        let rows = aggregate_track(&nodes(), Attribute::Recombination, &track, &mut diag).unwrap();
        assert_eq!(rows[0].values, vec![2.0, 2.0 / 3.0]);
        assert_eq!(rows[1].values, vec![0.0, 0.0]);
        assert_eq!(diag.get("recombination").unwrap().malformed, 1);
    }

    #[test]
    fn unsorted_track_is_rejected() {
        let track = IntervalSet::new("ctcf", vec![iv("chr1", 50, 60, "."), iv("chr1", 0, 1, ".")]);
        let err = aggregate_track(&nodes(), Attribute::Ctcf, &track, &mut Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::UnsortedIntervals { .. }));
    }

    #[test]
    fn gc_fraction_clips_and_ignores_case() {
        assert_eq!(gc_fraction(b"GGccAATT", 0, 4), 1.0);
        assert_eq!(gc_fraction(b"GCAT", 2, 100), 0.0);
        assert_eq!(gc_fraction(b"GCAT", 10, 20), 0.0);
    }

    #[test]
    fn gc_rows_stream_the_reference() {
        let dir = tempfile::tempdir().unwrap();
        let fa = dir.path().join("ref.fa");
        fs::write(&fa, ">chr1\nGGGGGGGGGGAAAAAAAAAACCCCCCCCCCTTTTTTTTTT\n>chr2\nACGT\n").unwrap();

        let rows = gc_rows(&fa, &[&nodes()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].values, vec![1.0]);
        assert_eq!(rows[0][1].values, vec![0.5]);
    }

    #[test]
    fn attribute_file_layout() {
        let p = attribute_path(Path::new("/out"), NodeType::Enhancer, Attribute::Gc);
        assert_eq!(p, PathBuf::from("/out/attributes/gc/enhancers_gc.tsv"));
        let p = attribute_path(Path::new("/out"), "basenodes_mirnatargets", Attribute::Cpg);
        assert_eq!(p, PathBuf::from("/out/attributes/cpg/basenodes_mirnatargets_cpg.tsv"));
    }
}
