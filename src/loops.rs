//! Chromatin-loop mediated edges: features at one anchor are linked to
//! features at the other.

use std::io::BufRead;
use std::path::Path;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::diagnostics::Diagnostics;
use crate::errors::{GraphError, Result};
use crate::graph::Edge;
use crate::interval_set::{parse_bed_line, IntervalSet, JoinMode};
use crate::io::{is_skippable, open_reader};
use crate::prepare::{node_name, prepare, Blacklist, FeatureKind};
use crate::reference::GeneLookup;
use crate::ruomics_structs::{ChromatinLoop, Interval};
use crate::vocab::{EdgeType, LoopCaller, NodeType};

pub const DEFAULT_TSS_WINDOW: u32 = 2000;

/// Which features link across a loop, and the type of the resulting edges.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopEdgeSpec {
    pub edge_type: EdgeType,
    /// Feature types taken when they directly overlap an anchor.
    pub direct: Vec<NodeType>,
    /// TSS within this distance of an anchor count as the anchor's genes.
    pub tss_window: Option<u32>,
}

fn anchor(chrom: &str, start: &str, end: &str, path: &str, line: usize) -> Result<Interval> {
    parse_bed_line(&format!("{chrom}\t{start}\t{end}"), path, line)
}

/// `chr1:1000-2000`
fn parse_locus(locus: &str, path: &str, line: usize) -> Result<Interval> {
    let bad = || GraphError::MalformedInterval {
        path: path.to_string(),
        line,
        reason: format!("bad locus '{locus}'"),
    };
    let (chrom, range) = locus.split_once(':').ok_or_else(bad)?;
    let (start, end) = range.split_once('-').ok_or_else(bad)?;
    anchor(chrom, start, end, path, line)
}

fn parse_loop(fields: &[&str], caller: LoopCaller, path: &str, line: usize) -> Result<ChromatinLoop> {
    let too_short = |need: usize| GraphError::MalformedInterval {
        path: path.to_string(),
        line,
        reason: format!("expected at least {need} columns, found {}", fields.len()),
    };
    match caller {
        LoopCaller::Peakachu => {
            if fields.len() < 6 {
                return Err(too_short(6));
            }
            Ok(ChromatinLoop {
                first: anchor(fields[0], fields[1], fields[2], path, line)?,
                second: anchor(fields[3], fields[4], fields[5], path, line)?,
                score: fields.get(6).and_then(|s| s.parse().ok()),
            })
        }
        LoopCaller::Deeploop => {
            if fields.len() < 3 {
                return Err(too_short(3));
            }
            let score = fields[2].trim().parse().map_err(|_| GraphError::MalformedInterval {
                path: path.to_string(),
                line,
                reason: format!("deeploop calls need a score, found '{}'", fields[2]),
            })?;
            Ok(ChromatinLoop {
                first: parse_locus(fields[0], path, line)?,
                second: parse_locus(fields[1], path, line)?,
                score: Some(score),
            })
        }
    }
}

/// Reads loop calls. Deeploop calls are ranked by score and, with `top_n`,
/// only the strongest are kept.
pub fn read_loops(
    path: &Path,
    caller: LoopCaller,
    top_n: Option<usize>,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<ChromatinLoop>> {
    let source = path.display().to_string();
    let mut loops = Vec::new();

    for (n, line) in open_reader(path)?.lines().enumerate() {
        let line = line?;
        if is_skippable(&line) {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        match parse_loop(&fields, caller, &source, n + 1) {
            Ok(l) => loops.push(l),
            Err(e) => diagnostics.record(&source, &e),
        }
    }

    if caller == LoopCaller::Deeploop {
        loops.sort_by(|a, b| {
            b.score
                .unwrap_or(f64::NEG_INFINITY)
                .total_cmp(&a.score.unwrap_or(f64::NEG_INFINITY))
        });
        if let Some(n) = top_n {
            loops.truncate(n);
        }
    }

    log::info!("{} loops from {:?}", loops.len(), path);
    Ok(loops)
}

/// Prepared TSS with the gene symbol parsed from each original name.
#[derive(Debug, Clone, Default)]
pub struct TssSet {
    set: IntervalSet,
    symbols: FxHashMap<String, String>,
}

/// Gene symbol in a TSS name: its 4th `_`-separated field.
pub fn tss_symbol(name: &str) -> Option<&str> {
    name.split('_').nth(3).filter(|s| !s.is_empty())
}

impl TssSet {
    /// Prepares raw TSS intervals. TSS without a gene symbol are discarded.
    pub fn new(raw: IntervalSet, blacklist: &Blacklist) -> Result<Self> {
        let mut symbols = FxHashMap::default();
        let mut with_symbol = Vec::with_capacity(raw.len());
        for interval in raw.into_intervals() {
            if let Some(symbol) = tss_symbol(&interval.name) {
                symbols.insert(node_name(NodeType::Tss, &interval), symbol.to_string());
                with_symbol.push(interval);
            }
        }
        let set = prepare(
            IntervalSet::new("tss", with_symbol),
            FeatureKind::Node(NodeType::Tss),
            blacklist,
        )?;
        Ok(TssSet { set, symbols })
    }

    pub fn load(path: &Path, blacklist: &Blacklist, diagnostics: &mut Diagnostics) -> Result<Self> {
        Self::new(IntervalSet::load(path, diagnostics)?, blacklist)
    }

    pub fn intervals(&self) -> &IntervalSet {
        &self.set
    }

    pub fn gene_id<'a>(&self, name: &str, genes: &'a GeneLookup) -> Option<&'a str> {
        self.symbols.get(name).and_then(|s| genes.get(s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Endpoint {
    Feature(String),
    Tss(String),
}

fn anchor_key(i: &Interval) -> String {
    format!("{}_{}_{}", i.chrom, i.start, i.end)
}

/// Anchor key -> features found at that anchor.
fn anchor_features(
    anchors: &IntervalSet,
    features: &IntervalSet,
    tss: Option<(&TssSet, u32)>,
) -> Result<FxHashMap<String, Vec<Endpoint>>> {
    let mut map: FxHashMap<String, Vec<Endpoint>> = FxHashMap::default();
    for o in anchors.intersect(features, JoinMode::Direct)? {
        map.entry(o.query.name.clone())
            .or_default()
            .push(Endpoint::Feature(o.hit.name.clone()));
    }
    if let Some((tss, window)) = tss {
        for o in anchors.intersect(tss.intervals(), JoinMode::Windowed(window))? {
            map.entry(o.query.name.clone())
                .or_default()
                .push(Endpoint::Tss(o.hit.name.clone()));
        }
    }
    Ok(map)
}

fn anchor_set(label: &str, anchors: impl Iterator<Item = Interval>) -> IntervalSet {
    IntervalSet::new(
        label,
        anchors
            .map(|a| {
                let key = anchor_key(&a);
                Interval { name: key, ..a }
            })
            .collect(),
    )
    .sorted()
}

/// Cross-anchor edges for one loop edge type. `features` holds the prepared direct
/// feature types, sorted.
pub fn loop_edges(
    loops: &[ChromatinLoop],
    spec: &LoopEdgeSpec,
    features: &IntervalSet,
    tss: Option<&TssSet>,
    genes: &GeneLookup,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Edge>> {
    let start = Instant::now();
    let source = format!("loops:{}", spec.edge_type);

    let tss = match (tss, spec.tss_window) {
        (Some(t), Some(w)) => Some((t, w)),
        _ => None,
    };
    let first = anchor_set("first_anchors", loops.iter().map(|l| l.first.clone()));
    let second = anchor_set("second_anchors", loops.iter().map(|l| l.second.clone()));
    let first_map = anchor_features(&first, features, tss)?;
    let second_map = anchor_features(&second, features, tss)?;

    let mut seen: FxHashSet<(&Endpoint, &Endpoint)> = FxHashSet::default();
    let mut candidates = Vec::new();
    for l in loops {
        let (Some(a), Some(b)) = (
            first_map.get(&anchor_key(&l.first)),
            second_map.get(&anchor_key(&l.second)),
        ) else {
            continue;
        };
        for x in a {
            for y in b {
                if seen.insert((x, y)) {
                    candidates.push((x, y));
                }
            }
        }
    }

    let mut edges = Vec::with_capacity(candidates.len());
    let mut unresolved = 0;
    let mut self_pairs = 0;
    for (x, y) in candidates {
        let edge = match (x, y) {
            (Endpoint::Tss(t1), Endpoint::Tss(t2)) => {
                let Some((tss, _)) = tss else {
                    continue;
                };
                match (tss.gene_id(t1, genes), tss.gene_id(t2, genes)) {
                    (Some(g1), Some(g2)) => Edge::unweighted(g1, g2, EdgeType::GeneGene),
                    _ => {
                        unresolved += 1;
                        continue;
                    }
                }
            }
            (Endpoint::Tss(t), Endpoint::Feature(f)) | (Endpoint::Feature(f), Endpoint::Tss(t)) => {
                let Some((tss, _)) = tss else {
                    continue;
                };
                let Some(gene) = tss.gene_id(t, genes) else {
                    unresolved += 1;
                    continue;
                };
                if matches!(x, Endpoint::Tss(_)) {
                    Edge::unweighted(gene, f.as_str(), spec.edge_type)
                } else {
                    Edge::unweighted(f.as_str(), gene, spec.edge_type)
                }
            }
            (Endpoint::Feature(f1), Endpoint::Feature(f2)) => {
                Edge::unweighted(f1.as_str(), f2.as_str(), spec.edge_type)
            }
        };
        // both anchors resolved to the same node, e.g. two TSS of one gene
        if edge.source == edge.target {
            self_pairs += 1;
            continue;
        }
        edges.push(edge);
    }

    diagnostics.unresolved(&source, unresolved);
    diagnostics.dropped(&source, self_pairs);
    log::info!(
        "{source}: {} edges from {} loops ({} unresolved TSS, {} self-pairs) in {:?}",
        edges.len(),
        loops.len(),
        unresolved,
        self_pairs,
        start.elapsed()
    );
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn iv(chrom: &str, start: u32, end: u32, name: &str) -> Interval {
        Interval::new(chrom, start, end, name)
    }

    fn one_loop() -> Vec<ChromatinLoop> {
        vec![ChromatinLoop {
            first: iv("chr1", 1000, 2000, "."),
            second: iv("chr1", 5000, 6000, "."),
            score: None,
        }]
    }

    fn tss() -> TssSet {
        TssSet::new(
            IntervalSet::new(
                "tss",
                vec![
                    iv("chr1", 5100, 5101, "tss_p1_x_GENEA"),
                    iv("chr1", 1200, 1201, "tss_p1_x_GENEB"),
                    iv("chr1", 1300, 1301, "tss_p1_x_UNKNOWN"),
                    iv("chr1", 5200, 5201, "nosymbol"),
                ],
            ),
            &Blacklist::empty(),
        )
        .unwrap()
    }

    fn genes() -> GeneLookup {
        GeneLookup::from_pairs([("GENEA", "ENSG0000A"), ("GENEB", "ENSG0000B")])
    }

    fn enhancers() -> IntervalSet {
        IntervalSet::new("enhancers", vec![iv("chr1", 1500, 1800, "chr1_1500_E1")]).sorted()
    }

    #[test]
    fn tss_symbols_are_parsed_once() {
        let t = tss();
        assert_eq!(t.intervals().len(), 3);
        assert_eq!(t.gene_id("chr1_5100_tss_p1_x_GENEA", &genes()), Some("ENSG0000A"));
        assert_eq!(tss_symbol("a_b_c"), None);
    }

    #[test]
    fn enhancer_to_gene_across_a_loop() {
        let spec = LoopEdgeSpec {
            edge_type: EdgeType::EnhancerGene,
            direct: vec![NodeType::Enhancer],
            tss_window: Some(DEFAULT_TSS_WINDOW),
        };
        let mut diag = Diagnostics::new();
        let edges = loop_edges(&one_loop(), &spec, &enhancers(), Some(&tss()), &genes(), &mut diag).unwrap();

        assert!(edges.contains(&Edge::unweighted("chr1_1500_E1", "ENSG0000A", EdgeType::EnhancerGene)));
        // TSS on both sides become a gene-gene edge
        assert!(edges.contains(&Edge::unweighted("ENSG0000B", "ENSG0000A", EdgeType::GeneGene)));
        // UNKNOWN near anchor 1 can not be resolved
        assert_eq!(diag.total().unresolved, 1);
        assert_eq!(edges.len(), 2);
    }

    fn tss_only() -> LoopEdgeSpec {
        LoopEdgeSpec {
            edge_type: EdgeType::EnhancerGene,
            direct: Vec::new(),
            tss_window: Some(DEFAULT_TSS_WINDOW),
        }
    }

    #[test]
    fn gene_pair_with_an_unknown_symbol_is_dropped() {
        let tss = TssSet::new(
            IntervalSet::new(
                "tss",
                vec![
                    iv("chr1", 1300, 1301, "tss_p1_x_UNKNOWN"),
                    iv("chr1", 5100, 5101, "tss_p1_x_GENEA"),
                ],
            ),
            &Blacklist::empty(),
        )
        .unwrap();
        let none = IntervalSet::new("none", Vec::new());

        let mut diag = Diagnostics::new();
        let edges = loop_edges(&one_loop(), &tss_only(), &none, Some(&tss), &genes(), &mut diag).unwrap();
        assert_eq!(edges, Vec::<Edge>::new());
        let counts = diag.get("loops:enhancer-gene").unwrap();
        assert_eq!((counts.unresolved, counts.dropped), (1, 0));
    }

    #[test]
    fn two_tss_of_one_gene_make_no_self_loop() {
        let tss = TssSet::new(
            IntervalSet::new(
                "tss",
                vec![
                    iv("chr1", 1200, 1201, "tss_p1_x_GENEA"),
                    iv("chr1", 5100, 5101, "tss_p2_x_GENEA"),
                ],
            ),
            &Blacklist::empty(),
        )
        .unwrap();
        let none = IntervalSet::new("none", Vec::new());

        let mut diag = Diagnostics::new();
        let edges = loop_edges(&one_loop(), &tss_only(), &none, Some(&tss), &genes(), &mut diag).unwrap();
        assert!(edges.is_empty());
        let counts = diag.get("loops:enhancer-gene").unwrap();
        assert_eq!((counts.unresolved, counts.dropped), (0, 1));
    }

    #[test]
    fn anchors_without_features_are_skipped() {
        let loops = vec![ChromatinLoop {
            first: iv("chr2", 0, 100, "."),
            second: iv("chr1", 1000, 2000, "."),
            score: None,
        }];
        let spec = LoopEdgeSpec {
            edge_type: EdgeType::EnhancerEnhancer,
            direct: vec![NodeType::Enhancer],
            tss_window: None,
        };
        let edges = loop_edges(&loops, &spec, &enhancers(), None, &genes(), &mut Diagnostics::new()).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn reads_both_callers() {
        let dir = tempfile::tempdir().unwrap();
        let bedpe = dir.path().join("loops.bedpe");
        fs::write(&bedpe, "chr1\t1000\t2000\tchr1\t5000\t6000\t0.9\nchr1\t1\t2\n").unwrap();
        let mut diag = Diagnostics::new();
        let loops = read_loops(&bedpe, LoopCaller::Peakachu, None, &mut diag).unwrap();
        assert_eq!(loops, one_loop().into_iter().map(|l| ChromatinLoop { score: Some(0.9), ..l }).collect::<Vec<_>>());
        assert_eq!(diag.total().malformed, 1);

        let deeploop = dir.path().join("loops.txt");
        fs::write(
            &deeploop,
            "chr1:0-10\tchr1:50-60\t1.5\nchr1:100-110\tchr1:500-510\t9.0\nchr1:0-10\tchr1:70-80\t3.0\n",
        )
        .unwrap();
        let loops = read_loops(&deeploop, LoopCaller::Deeploop, Some(2), &mut Diagnostics::new()).unwrap();
        let scores: Vec<f64> = loops.iter().filter_map(|l| l.score).collect();
        assert_eq!(scores, vec![9.0, 3.0]);
        assert_eq!(loops[0].first, iv("chr1", 100, 110, "."));
    }
}
