//! Reference dictionaries loaded once per run and shared read-only.

use std::io::BufRead;
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::diagnostics::Diagnostics;
use crate::errors::{GraphError, Result};
use crate::io::{is_skippable, open_reader};
use crate::interval_set::IntervalSet;
use crate::prepare::is_alt_contig;
use crate::ruomics_structs::Interval;

fn malformed(path: &Path, line: usize, reason: &str) -> GraphError {
    GraphError::MalformedInterval {
        path: path.display().to_string(),
        line,
        reason: reason.to_string(),
    }
}

/// Gene symbol -> stable gene identifier.
#[derive(Debug, Clone, Default)]
pub struct GeneLookup {
    symbol_to_id: FxHashMap<String, String>,
}

impl GeneLookup {
    /// Reads `symbol<TAB>gene_id` lines. The first mapping of a symbol wins.
    pub fn load(path: &Path, diagnostics: &mut Diagnostics) -> Result<Self> {
        let source = path.display().to_string();
        let mut symbol_to_id = FxHashMap::default();

        for (n, line) in open_reader(path)?.lines().enumerate() {
            let line = line?;
            if is_skippable(&line) {
                continue;
            }
            let mut fields = line.split('\t');
            match (fields.next(), fields.next()) {
                (Some(symbol), Some(id)) if !symbol.is_empty() && !id.is_empty() => {
                    symbol_to_id
                        .entry(symbol.to_string())
                        .or_insert_with(|| id.to_string());
                }
                _ => diagnostics.record(&source, &malformed(path, n + 1, "expected symbol and id")),
            }
        }

        log::info!("gene lookup: {} symbols from {:?}", symbol_to_id.len(), path);
        Ok(GeneLookup { symbol_to_id })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        GeneLookup {
            symbol_to_id: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&str> {
        self.symbol_to_id.get(symbol).map(String::as_str)
    }

    pub fn resolve(&self, symbol: &str) -> Result<&str> {
        self.get(symbol)
            .ok_or_else(|| GraphError::unresolved(symbol, "gene lookup"))
    }

    pub fn len(&self) -> usize {
        self.symbol_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbol_to_id.is_empty()
    }
}

/// miRNAs active in the tissue, taken from the 4th column.
#[derive(Debug, Clone, Default)]
pub struct ActiveMirnas(FxHashSet<String>);

impl ActiveMirnas {
    pub fn load(path: &Path) -> Result<Self> {
        let mut active = FxHashSet::default();
        for line in open_reader(path)?.lines() {
            let line = line?;
            if let Some(name) = line.split('\t').nth(3) {
                active.insert(name.to_string());
            }
        }
        log::debug!("{} active miRNAs", active.len());
        Ok(ActiveMirnas(active))
    }

    pub fn contains(&self, mirna: &str) -> bool {
        self.0.contains(mirna)
    }
}

impl<S: Into<String>> FromIterator<S> for ActiveMirnas {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        ActiveMirnas(iter.into_iter().map(Into::into).collect())
    }
}

/// Enhancer identifier -> enhancer node name, `enhancer_{chr}_{start}` until
/// aligned onto prepared enhancers.
#[derive(Debug, Clone, Default)]
pub struct EnhancerIndex {
    names: FxHashMap<String, String>,
    /// node name -> locus, for enhancers with no prepared counterpart
    loci: FxHashMap<String, Interval>,
}

/// `chr1:1000-2000` -> the interval named `enhancer_chr1_1000`.
pub fn enhancer_locus(locus: &str) -> Option<Interval> {
    let (chrom, range) = locus.split_once(':')?;
    let (start, end) = range.split_once('-')?;
    let (start, end) = (start.parse::<u32>().ok()?, end.parse::<u32>().ok()?);
    if end < start {
        return None;
    }
    Some(Interval::new(chrom, start, end, format!("enhancer_{chrom}_{start}")))
}


impl EnhancerIndex {
    /// Reads `id<TAB>chr:start-end` lines. Loci on alternate contigs are left
    /// out of the index.
    pub fn load(path: &Path, diagnostics: &mut Diagnostics) -> Result<Self> {
        let source = path.display().to_string();
        let mut names = FxHashMap::default();
        let mut loci = FxHashMap::default();

        for (n, line) in open_reader(path)?.lines().enumerate() {
            let line = line?;
            if is_skippable(&line) {
                continue;
            }
            let Some((id, locus)) = line.split_once('\t') else {
                diagnostics.record(&source, &malformed(path, n + 1, "expected id and locus"));
                continue;
            };
            let locus = locus.split('\t').next().unwrap_or(locus);
            match enhancer_locus(locus) {
                Some(interval) if is_alt_contig(&interval.chrom) => {}
                Some(interval) => {
                    names.insert(id.to_string(), interval.name.clone());
                    loci.entry(interval.name.clone()).or_insert(interval);
                }
                None => diagnostics.record(&source, &malformed(path, n + 1, "bad locus")),
            }
        }

        log::debug!("enhancer index: {} entries, {} loci", names.len(), loci.len());
        Ok(EnhancerIndex { names, loci })
    }

    /// Renames every indexed enhancer that starts where a prepared enhancer
    /// starts to that enhancer's node name, so both sources share one node.
    /// Returns the number of loci renamed.
    pub fn align(&mut self, prepared: &IntervalSet) -> usize {
        let mut by_start: FxHashMap<(&str, u32), &str> = FxHashMap::default();
        for i in prepared.iter() {
            by_start.entry((i.chrom.as_str(), i.start)).or_insert(i.name.as_str());
        }

        let mut renamed: FxHashMap<String, String> = FxHashMap::default();
        self.loci.retain(|name, locus| match by_start.get(&(locus.chrom.as_str(), locus.start)) {
            Some(prepared_name) => {
                renamed.insert(name.clone(), prepared_name.to_string());
                false
            }
            None => true,
        });
        for name in self.names.values_mut() {
            if let Some(new) = renamed.get(name.as_str()) {
                *name = new.clone();
            }
        }

        log::info!(
            "enhancer index: {} loci aligned to prepared enhancers, {} kept",
            renamed.len(),
            self.loci.len()
        );
        renamed.len()
    }

    /// Loci of indexed enhancers that are not prepared enhancers.
    pub fn loci(&self) -> impl Iterator<Item = &Interval> {
        self.loci.values()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        EnhancerIndex {
            names: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            loci: FxHashMap::default(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }
}
