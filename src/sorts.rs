use radsort::sort_by_key;
use rustc_hash::FxHashMap;

use crate::ruomics_structs::{Event, Interval};

/// Rank of every chromosome name in lexicographic order, so that radsort can
/// order intervals by chromosome with an integer key.
fn chromosome_ranks(intervals: &[Interval]) -> FxHashMap<String, u32> {
    let mut names: Vec<&str> = intervals.iter().map(|i| i.chrom.as_str()).collect();
    names.sort_unstable();
    names.dedup();

    names
        .into_iter()
        .enumerate()
        .map(|(rank, name)| (name.to_string(), rank as u32))
        .collect()
}

/// Sorts by (chromosome, start, end). radsort is a stable LSD sort, so the
/// passes run from least to most significant key.
pub fn sort_intervals(intervals: &mut [Interval]) {
    let ranks = chromosome_ranks(intervals);

    sort_by_key(intervals, |i| i.end);
    sort_by_key(intervals, |i| i.start);
    sort_by_key(intervals, |i| ranks[i.chrom.as_str()]);
}

pub fn is_sorted(intervals: &[Interval]) -> bool {
    intervals.windows(2).all(|w| {
        let (a, b) = (&w[0], &w[1]);
        (a.chrom.as_str(), a.start, a.end) <= (b.chrom.as_str(), b.start, b.end)
    })
}

/// Maps the chromosome names of two collections onto one shared set of
/// integer codes.
pub fn encode_chromosomes<'a>(intervals: &'a [Interval], intervals2: &'a [Interval]) -> (Vec<u32>, Vec<u32>) {
    let mut global_map: FxHashMap<&'a str, u32> = FxHashMap::default();

    let mut encode = |set: &'a [Interval]| -> Vec<u32> {
        set.iter()
            .map(|i| {
                let next = global_map.len() as u32;
                *global_map.entry(i.chrom.as_str()).or_insert(next)
            })
            .collect()
    };

    let codes = encode(intervals);
    let codes2 = encode(intervals2);
    (codes, codes2)
}

pub fn coordinates(intervals: &[Interval]) -> (Vec<i64>, Vec<i64>) {
    intervals
        .iter()
        .map(|i| (i.start as i64, i.end as i64))
        .unzip()
}

pub fn build_sorted_events(
    chrs: &[u32],
    starts: &[i64],
    ends: &[i64],
    chrs2: &[u32],
    starts2: &[i64],
    ends2: &[i64],
    slack: i64,
) -> Vec<Event> {
    let mut events: Vec<Event> = Vec::with_capacity(2 * (chrs.len() + chrs2.len()));

    // Slack widens the first collection only.
    for i in 0..chrs.len() {
        events.push(Event {
            chr: chrs[i],
            pos: starts[i] - slack,
            is_start: true,
            first_set: true,
            idx: i,
        });
        events.push(Event {
            chr: chrs[i],
            pos: ends[i] + slack,
            is_start: false,
            first_set: true,
            idx: i,
        });
    }

    for j in 0..chrs2.len() {
        events.push(Event {
            chr: chrs2[j],
            pos: starts2[j],
            is_start: true,
            first_set: false,
            idx: j,
        });
        events.push(Event {
            chr: chrs2[j],
            pos: ends2[j],
            is_start: false,
            first_set: false,
            idx: j,
        });
    }

    // Sort events by:
    // 1. chr
    // 2. pos (ascending)
    // 3. ends before starts on ties, so book-ended intervals do not overlap
    sort_by_key(&mut events, |e| e.is_start);
    sort_by_key(&mut events, |e| e.pos);
    sort_by_key(&mut events, |e| e.chr);

    events
}

/// Events for a single collection. End events are pushed out by `slack`;
/// with `starts_first` an interval starting exactly where another one (plus
/// slack) ends is treated as touching it.
pub fn build_sorted_events_single_collection(
    chrs: &[u32],
    starts: &[i64],
    ends: &[i64],
    slack: i64,
    starts_first: bool,
) -> Vec<Event> {
    let mut events: Vec<Event> = Vec::with_capacity(2 * chrs.len());

    for i in 0..chrs.len() {
        events.push(Event {
            chr: chrs[i],
            pos: starts[i],
            is_start: true,
            first_set: true,
            idx: i,
        });
        events.push(Event {
            chr: chrs[i],
            pos: ends[i] + slack,
            is_start: false,
            first_set: true,
            idx: i,
        });
    }

    if starts_first {
        sort_by_key(&mut events, |e| !e.is_start);
    } else {
        sort_by_key(&mut events, |e| e.is_start);
    }
    sort_by_key(&mut events, |e| e.pos);
    sort_by_key(&mut events, |e| e.chr);

    events
}
