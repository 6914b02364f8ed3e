/// A named genomic interval, half-open `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    pub chrom: String,
    pub start: u32,
    pub end: u32,
    pub name: String,
}

impl Interval {
    pub fn new(chrom: impl Into<String>, start: u32, end: u32, name: impl Into<String>) -> Self {
        Interval {
            chrom: chrom.into(),
            start,
            end,
            name: name.into(),
        }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Literal overlap in bp, 0 when the intervals only come within a window
    /// of each other.
    pub fn overlap_bp(&self, other: &Interval) -> u32 {
        if self.chrom != other.chrom {
            return 0;
        }
        self.end
            .min(other.end)
            .saturating_sub(self.start.max(other.start))
    }

    /// `max(starts) - min(ends)`: negative when the intervals overlap, the gap
    /// length otherwise.
    pub fn signed_distance(&self, other: &Interval) -> i64 {
        self.start.max(other.start) as i64 - self.end.min(other.end) as i64
    }

    pub fn to_bed_line(&self) -> String {
        format!("{}\t{}\t{}\t{}", self.chrom, self.start, self.end, self.name)
    }
}

/// An "event" in the sweep line:
/// - `pos`: the coordinate (start or end of an interval, slack applied)
/// - `is_start`: true if it's a start event, false if it's an end event
/// - `first_set`: which collection the interval belongs to
/// - `idx`: the interval's position in its collection
#[derive(Debug, Clone, Hash)]
pub struct Event {
    pub chr: u32,
    pub pos: i64,
    pub is_start: bool,
    pub first_set: bool,
    pub idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlapPair {
    pub idx: usize,
    pub idx2: usize,
}

/// A chromatin loop as its two anchors.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromatinLoop {
    pub first: Interval,
    pub second: Interval,
    pub score: Option<f64>,
}
