use crate::ruomics_structs::Interval;

/// Per-node totals over every track interval it overlaps.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverlapTotals {
    pub overlap_bp: u64,
    pub hits: u32,
    pub score_sum: f64,
}

impl OverlapTotals {
    pub fn score_mean(&self) -> f64 {
        if self.hits == 0 {
            0.0
        } else {
            self.score_sum / self.hits as f64
        }
    }
}

/// Accumulates overlap totals for every node against a track, both sorted by
/// (chromosome, start, end).
///
/// This uses an incremental two-pointer approach:
///  1. Pointer `j` walks set2 once; a track interval becomes active as soon as
///     it starts before the current node ends.
///  2. Active intervals that end at or before the current node's start can
///     never overlap a later node and are retired.
///  3. Every remaining active interval with a positive overlap is accumulated.
///  4. `j` never moves backward.
///
/// `scores`, when given, is parallel to `tracks` and summed per hit.
pub fn two_pointer_accumulate(
    nodes: &[Interval],
    tracks: &[Interval],
    scores: Option<&[f64]>,
) -> Vec<OverlapTotals> {
    let mut totals = vec![OverlapTotals::default(); nodes.len()];

    if nodes.is_empty() || tracks.is_empty() {
        return totals;
    }

    let mut j = 0;
    let mut active: Vec<usize> = Vec::new();
    let mut current_chrom: Option<&str> = None;

    for (i, node) in nodes.iter().enumerate() {
        if current_chrom != Some(node.chrom.as_str()) {
            active.clear();
            current_chrom = Some(node.chrom.as_str());
            // set2[j] on an earlier chromosome can not overlap anything left
            while j < tracks.len() && tracks[j].chrom.as_str() < node.chrom.as_str() {
                j += 1;
            }
        }

        while j < tracks.len() && tracks[j].chrom == node.chrom && tracks[j].start < node.end {
            active.push(j);
            j += 1;
        }

        active.retain(|&k| tracks[k].end > node.start);

        let acc = &mut totals[i];
        for &k in &active {
            let bp = node.overlap_bp(&tracks[k]);
            if bp == 0 {
                continue;
            }
            acc.overlap_bp += bp as u64;
            acc.hits += 1;
            if let Some(scores) = scores {
                acc.score_sum += scores[k];
            }
        }
    }

    totals
}
