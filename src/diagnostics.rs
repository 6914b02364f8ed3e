use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::GraphError;

/// Records dropped or patched while a single source was processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub malformed: usize,
    pub unresolved: usize,
    pub zero_filled: usize,
    pub dropped: usize,
}

impl SourceCounts {
    fn add(&mut self, other: &SourceCounts) {
        self.malformed += other.malformed;
        self.unresolved += other.unresolved;
        self.zero_filled += other.zero_filled;
        self.dropped += other.dropped;
    }

    pub fn total(&self) -> usize {
        self.malformed + self.unresolved + self.zero_filled + self.dropped
    }

    pub fn is_clean(&self) -> bool {
        *self == SourceCounts::default()
    }
}

/// Recoverable-error counters keyed by source (a file, or a stage name).
/// Workers fill their own instance; the pipeline merges them at the barrier.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    sources: BTreeMap<String, SourceCounts>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, source: &str) -> &mut SourceCounts {
        self.sources.entry(source.to_string()).or_default()
    }

    /// Counts a recoverable error against `source`. Fatal errors are not
    /// counted; callers propagate those instead.
    pub fn record(&mut self, source: &str, err: &GraphError) {
        match err {
            GraphError::MalformedInterval { .. } => self.malformed(source, 1),
            GraphError::UnresolvedIdentifier { .. } => self.unresolved(source, 1),
            _ => return,
        }
        log::debug!("{source}: {err}");
    }

    pub fn malformed(&mut self, source: &str, n: usize) {
        if n > 0 {
            self.entry(source).malformed += n;
        }
    }

    pub fn unresolved(&mut self, source: &str, n: usize) {
        if n > 0 {
            self.entry(source).unresolved += n;
        }
    }

    pub fn zero_filled(&mut self, source: &str, n: usize) {
        if n > 0 {
            self.entry(source).zero_filled += n;
        }
    }

    pub fn dropped(&mut self, source: &str, n: usize) {
        if n > 0 {
            self.entry(source).dropped += n;
        }
    }

    pub fn merge(&mut self, other: Diagnostics) {
        for (source, counts) in other.sources {
            self.entry(&source).add(&counts);
        }
    }

    pub fn get(&self, source: &str) -> Option<&SourceCounts> {
        self.sources.get(source)
    }

    pub fn total(&self) -> SourceCounts {
        let mut total = SourceCounts::default();
        for counts in self.sources.values() {
            total.add(counts);
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.sources.values().all(SourceCounts::is_clean)
    }

    pub fn log_summary(&self, stage: &str) {
        if self.is_empty() {
            log::info!("{stage}: no records dropped");
            return;
        }
        for (source, c) in &self.sources {
            log::warn!(
                "{stage}: {source}: {} malformed, {} unresolved, {} zero-filled, {} dropped",
                c.malformed,
                c.unresolved,
                c.zero_filled,
                c.dropped
            );
        }
    }
}
