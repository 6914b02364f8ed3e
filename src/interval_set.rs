use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::diagnostics::Diagnostics;
use crate::errors::{GraphError, Result};
use crate::io::{is_skippable, open_reader, write_atomic};
use crate::merge::sweep_line_merge;
use crate::overlaps::{overlapping_mask, sweep_line_overlaps};
use crate::ruomics_structs::Interval;
use crate::sorts;

/// How the query side of an intersection is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Literal coordinate overlap.
    Direct,
    /// Overlap after extending each query interval by the window on both sides.
    Windowed(u32),
}

impl JoinMode {
    fn slack(self) -> i64 {
        match self {
            JoinMode::Direct => 0,
            JoinMode::Windowed(w) => w as i64,
        }
    }
}

/// Chromosome name -> length, used to clip slopped intervals.
#[derive(Debug, Clone, Default)]
pub struct ChromSizes {
    sizes: FxHashMap<String, u32>,
}

impl ChromSizes {
    pub fn load(path: &Path) -> Result<Self> {
        let reader = open_reader(path)?;
        let mut sizes = FxHashMap::default();

        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if is_skippable(&line) {
                continue;
            }
            let mut fields = line.split('\t');
            let (Some(name), Some(len)) = (fields.next(), fields.next()) else {
                return Err(GraphError::MalformedInterval {
                    path: path.display().to_string(),
                    line: n + 1,
                    reason: "expected name and length".into(),
                });
            };
            let len: u32 = len.trim().parse().map_err(|_| GraphError::MalformedInterval {
                path: path.display().to_string(),
                line: n + 1,
                reason: format!("non-numeric length '{len}'"),
            })?;
            sizes.insert(name.to_string(), len);
        }

        log::debug!("loaded {} chromosome sizes from {:?}", sizes.len(), path);
        Ok(ChromSizes { sizes })
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        ChromSizes {
            sizes: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, chrom: &str) -> Option<u32> {
        self.sizes.get(chrom).copied()
    }
}

/// One reported intersection hit. Coordinates are always the original
/// (unslopped) records.
#[derive(Debug, Clone, Copy)]
pub struct Overlap<'a> {
    pub query_idx: usize,
    pub hit_idx: usize,
    pub query: &'a Interval,
    pub hit: &'a Interval,
    pub overlap_bp: u32,
}

/// A labelled collection of intervals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalSet {
    label: String,
    intervals: Vec<Interval>,
}

/// Parses one BED line. Columns past the fourth are ignored; 3-column lines
/// get the name `.`.
pub fn parse_bed_line(line: &str, path: &str, line_no: usize) -> Result<Interval> {
    let malformed = |reason: String| GraphError::MalformedInterval {
        path: path.to_string(),
        line: line_no,
        reason,
    };

    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
    if fields.len() < 3 {
        return Err(malformed(format!("expected at least 3 columns, found {}", fields.len())));
    }
    if fields[0].is_empty() {
        return Err(malformed("empty chromosome".into()));
    }
    let start: u32 = fields[1]
        .trim()
        .parse()
        .map_err(|_| malformed(format!("non-numeric start '{}'", fields[1])))?;
    let end: u32 = fields[2]
        .trim()
        .parse()
        .map_err(|_| malformed(format!("non-numeric end '{}'", fields[2])))?;
    if start >= end {
        return Err(malformed(format!("start {start} is not before end {end}")));
    }
    let name = fields.get(3).copied().filter(|s| !s.is_empty()).unwrap_or(".");

    Ok(Interval::new(fields[0], start, end, name))
}

impl IntervalSet {
    pub fn new(label: impl Into<String>, intervals: Vec<Interval>) -> Self {
        IntervalSet {
            label: label.into(),
            intervals,
        }
    }

    /// Reads a BED file. Malformed lines are skipped and counted against the
    /// file in `diagnostics`; a file without a single valid interval fails.
    pub fn load(path: &Path, diagnostics: &mut Diagnostics) -> Result<Self> {
        let start = Instant::now();
        let source = path.display().to_string();
        let reader = open_reader(path)?;

        let mut intervals = Vec::new();
        let mut malformed = 0;
        for (n, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| GraphError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            if is_skippable(&line) {
                continue;
            }
            match parse_bed_line(&line, &source, n + 1) {
                Ok(interval) => intervals.push(interval),
                Err(e) => {
                    malformed += 1;
                    diagnostics.record(&source, &e);
                }
            }
        }

        if intervals.is_empty() {
            return Err(GraphError::EmptyIntervalFile {
                path: source,
                malformed,
            });
        }

        log::debug!(
            "read {} intervals ({} malformed) from {:?} in {:?}",
            intervals.len(),
            malformed,
            path,
            start.elapsed()
        );

        let label = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or(source);
        Ok(IntervalSet::new(label, intervals))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn into_intervals(self) -> Vec<Interval> {
        self.intervals
    }

    pub fn retain<F: FnMut(&Interval) -> bool>(&mut self, f: F) {
        self.intervals.retain(f);
    }

    pub fn map_names<F: FnMut(&Interval) -> String>(&mut self, mut f: F) {
        for interval in self.intervals.iter_mut() {
            interval.name = f(interval);
        }
    }

    pub fn sort(&mut self) {
        sorts::sort_intervals(&mut self.intervals);
    }

    pub fn sorted(mut self) -> Self {
        self.sort();
        self
    }

    pub fn is_sorted(&self) -> bool {
        sorts::is_sorted(&self.intervals)
    }

    fn ensure_sorted(&self) -> Result<()> {
        if self.is_sorted() {
            Ok(())
        } else {
            Err(GraphError::UnsortedIntervals {
                label: self.label.clone(),
            })
        }
    }

    /// Merges intervals within `distance` bp of each other. Each merged
    /// interval is named by the number of inputs it absorbed.
    pub fn merge(&self, distance: u32) -> Result<IntervalSet> {
        self.ensure_sorted()?;

        let (chrs, _) = sorts::encode_chromosomes(&self.intervals, &[]);
        let (starts, ends) = sorts::coordinates(&self.intervals);
        let (idxs, starts, ends, counts) = sweep_line_merge(&chrs, &starts, &ends, distance as i64);

        let merged = idxs
            .into_iter()
            .zip(starts)
            .zip(ends)
            .zip(counts)
            .map(|(((idx, start), end), count)| {
                Interval::new(
                    self.intervals[idx].chrom.clone(),
                    start as u32,
                    end as u32,
                    count.to_string(),
                )
            })
            .collect();

        Ok(IntervalSet::new(self.label.clone(), merged))
    }

    /// Extends every interval by `window` on both sides, clipped to
    /// `[0, chromosome length]`.
    pub fn slop(&self, sizes: &ChromSizes, window: u32) -> Result<IntervalSet> {
        let mut slopped = Vec::with_capacity(self.intervals.len());
        for interval in &self.intervals {
            let size = sizes
                .get(&interval.chrom)
                .ok_or_else(|| GraphError::MissingChromosome(interval.chrom.clone()))?;
            slopped.push(Interval {
                start: interval.start.saturating_sub(window),
                end: interval.end.saturating_add(window).min(size),
                ..interval.clone()
            });
        }
        Ok(IntervalSet::new(self.label.clone(), slopped))
    }

    /// All `(query, hit)` pairs between `self` and `other`, in query-index
    /// then hit-index order. Both sets must be sorted.
    pub fn intersect<'a>(
        &'a self,
        other: &'a IntervalSet,
        mode: JoinMode,
    ) -> Result<impl Iterator<Item = Overlap<'a>> + 'a> {
        self.ensure_sorted()?;
        other.ensure_sorted()?;

        let start = Instant::now();
        let (chrs, chrs2) = sorts::encode_chromosomes(&self.intervals, &other.intervals);
        let (starts, ends) = sorts::coordinates(&self.intervals);
        let (starts2, ends2) = sorts::coordinates(&other.intervals);

        let pairs = sweep_line_overlaps(
            &chrs,
            &starts,
            &ends,
            &chrs2,
            &starts2,
            &ends2,
            mode.slack(),
        );
        log::trace!(
            "{} x {}: {} pairs in {:?}",
            self.label,
            other.label,
            pairs.len(),
            start.elapsed()
        );

        Ok(pairs.into_iter().map(move |p| {
            let query = &self.intervals[p.idx];
            let hit = &other.intervals[p.idx2];
            Overlap {
                query_idx: p.idx,
                hit_idx: p.idx2,
                query,
                hit,
                overlap_bp: query.overlap_bp(hit),
            }
        }))
    }

    /// Intervals of `self` that overlap nothing in `other`.
    pub fn subtract(&self, other: &IntervalSet) -> Result<IntervalSet> {
        self.ensure_sorted()?;
        other.ensure_sorted()?;

        let (chrs, chrs2) = sorts::encode_chromosomes(&self.intervals, &other.intervals);
        let (starts, ends) = sorts::coordinates(&self.intervals);
        let (starts2, ends2) = sorts::coordinates(&other.intervals);
        let mask = overlapping_mask(&chrs, &starts, &ends, &chrs2, &starts2, &ends2);

        let kept = self
            .intervals
            .iter()
            .zip(mask)
            .filter(|(_, hit)| !hit)
            .map(|(interval, _)| interval.clone())
            .collect();

        Ok(IntervalSet::new(self.label.clone(), kept))
    }

    /// Sorted concatenation of several sets.
    pub fn concat<'a, I>(label: impl Into<String>, sets: I) -> IntervalSet
    where
        I: IntoIterator<Item = &'a IntervalSet>,
    {
        let intervals = sets
            .into_iter()
            .flat_map(|s| s.intervals.iter().cloned())
            .collect();
        IntervalSet::new(label, intervals).sorted()
    }

    pub fn write_bed(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| {
            for interval in &self.intervals {
                writeln!(w, "{}", interval.to_bed_line())?;
            }
            Ok(())
        })
    }
}

impl FromIterator<Interval> for IntervalSet {
    fn from_iter<T: IntoIterator<Item = Interval>>(iter: T) -> Self {
        IntervalSet::new("", iter.into_iter().collect())
    }
}
