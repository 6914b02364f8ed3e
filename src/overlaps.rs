use rustc_hash::FxHashSet;

use crate::ruomics_structs::OverlapPair;
use crate::sorts;

/// Returns all overlapping pairs (idx1, idx2) between intervals in set1 and set2.
/// This uses a line-sweep / active-set approach.
///
/// Algorithm steps:
///   1. Build a list of events (start & end) for each interval in both sets,
///      widening set1 by `slack` on both sides.
///   2. Sort events by coordinate. Where coordinates tie, put end before start.
///   3. Maintain active sets (for set1 and set2). For a start event in set1,
///      record overlap with all active in set2, then insert into active1. Etc.
///   4. Return the cross-set overlaps ordered by (idx1, idx2).
pub fn sweep_line_overlaps(
    chrs: &[u32],
    starts: &[i64],
    ends: &[i64],
    chrs2: &[u32],
    starts2: &[i64],
    ends2: &[i64],
    slack: i64,
) -> Vec<OverlapPair> {
    let mut overlaps = Vec::new();

    if chrs.is_empty() || chrs2.is_empty() {
        return overlaps;
    }

    let events = sorts::build_sorted_events(chrs, starts, ends, chrs2, starts2, ends2, slack);

    let mut active1 = FxHashSet::default();
    let mut active2 = FxHashSet::default();

    let mut current_chr = events[0].chr;

    for e in events {
        if e.chr != current_chr {
            active1.clear();
            active2.clear();
            current_chr = e.chr;
        }

        if e.is_start {
            if e.first_set {
                for &idx2 in active2.iter() {
                    overlaps.push(OverlapPair { idx: e.idx, idx2 });
                }
                active1.insert(e.idx);
            } else {
                for &idx in active1.iter() {
                    overlaps.push(OverlapPair { idx, idx2: e.idx });
                }
                active2.insert(e.idx);
            }
        } else if e.first_set {
            active1.remove(&e.idx);
        } else {
            active2.remove(&e.idx);
        }
    }

    // Hash-set iteration order is arbitrary.
    radsort::sort_by_key(&mut overlaps, |p| p.idx2);
    radsort::sort_by_key(&mut overlaps, |p| p.idx);

    overlaps
}

/// Marks every interval of set1 that overlaps at least one interval of set2.
pub fn overlapping_mask(
    chrs: &[u32],
    starts: &[i64],
    ends: &[i64],
    chrs2: &[u32],
    starts2: &[i64],
    ends2: &[i64],
) -> Vec<bool> {
    let mut mask = vec![false; chrs.len()];
    for pair in sweep_line_overlaps(chrs, starts, ends, chrs2, starts2, ends2, 0) {
        mask[pair.idx] = true;
    }
    mask
}
