use std::time::Instant;

use crate::sorts;

/// Merges intervals whose gap is at most `distance`. Book-ended intervals
/// merge at distance 0.
///
/// Returns, per merged interval: the index of the interval that closed the
/// cluster (for chromosome lookup), start, end and the number of inputs.
pub fn sweep_line_merge(
    chrs: &[u32],
    starts: &[i64],
    ends: &[i64],
    distance: i64,
) -> (Vec<usize>, Vec<i64>, Vec<i64>, Vec<usize>) {
    let start = Instant::now();

    let mut out_indices = Vec::with_capacity(chrs.len());
    let mut out_starts = Vec::with_capacity(chrs.len());
    let mut out_ends = Vec::with_capacity(chrs.len());
    let mut counts = Vec::with_capacity(chrs.len());

    if chrs.is_empty() {
        return (out_indices, out_starts, out_ends, counts);
    };

    let events = sorts::build_sorted_events_single_collection(chrs, starts, ends, distance, true);

    let mut current_chr = events[0].chr;
    let mut current_start: i64 = 0;
    let mut active_count: i64 = 0;
    let mut current_cluster_count: usize = 0;

    for e in events {
        if e.chr != current_chr {
            active_count = 0;
            current_cluster_count = 0;
            current_chr = e.chr;
        }

        if active_count == 0 {
            current_start = e.pos;
            current_cluster_count = 0;
        }

        if e.is_start {
            active_count += 1;
            current_cluster_count += 1;
        } else {
            active_count -= 1;
            if active_count == 0 {
                out_indices.push(e.idx);
                out_starts.push(current_start);
                out_ends.push(e.pos - distance);
                counts.push(current_cluster_count);
            }
        }
    }

    log::trace!("merged {} intervals in {:?}", chrs.len(), start.elapsed());

    (out_indices, out_starts, out_ends, counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_overlapping_and_book_ended() {
        let (_, starts, ends, counts) =
            sweep_line_merge(&[0, 0, 0, 0], &[0, 5, 20, 30], &[10, 20, 25, 40], 0);
        assert_eq!(starts, vec![0, 30]);
        assert_eq!(ends, vec![25, 40]);
        assert_eq!(counts, vec![3, 1]);
    }

    #[test]
    fn distance_bridges_gaps() {
        let (_, starts, ends, counts) = sweep_line_merge(&[0, 0], &[0, 15], &[10, 20], 5);
        assert_eq!(starts, vec![0]);
        assert_eq!(ends, vec![20]);
        assert_eq!(counts, vec![2]);

        let (_, starts, _, _) = sweep_line_merge(&[0, 0], &[0, 16], &[10, 20], 5);
        assert_eq!(starts, vec![0, 16]);
    }

    #[test]
    fn nested_interval_keeps_outer_end() {
        let (_, starts, ends, _) = sweep_line_merge(&[0, 0], &[0, 2], &[100, 5], 0);
        assert_eq!(starts, vec![0]);
        assert_eq!(ends, vec![100]);
    }

    #[test]
    fn chromosomes_merge_separately() {
        let (idx, starts, _, _) = sweep_line_merge(&[0, 1], &[0, 5], &[10, 20], 0);
        assert_eq!(idx, vec![0, 1]);
        assert_eq!(starts, vec![0, 5]);
    }
}
