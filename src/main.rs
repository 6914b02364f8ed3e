use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use ruomics::config::PipelineConfig;
use ruomics::diagnostics::Diagnostics;
use ruomics::interval_set::{IntervalSet, JoinMode};
use ruomics::pipeline::{self, GraphVariant};

/// Builds tissue-specific regulatory graphs from genomic interval files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbosity level (0 = warn, 1 = info, 2 = debug, 3 = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every stage for one tissue
    Run {
        /// JSON run configuration
        #[arg(long)]
        config: PathBuf,
    },
    /// Merge finished tissue runs into one re-indexed graph
    Compose {
        /// Output directory of a finished tissue run
        #[arg(long = "tissue-dir", required = true, num_args = 1..)]
        tissue_dirs: Vec<PathBuf>,

        #[arg(long)]
        out: PathBuf,

        #[arg(long, value_enum, default_value_t = Variant::Full)]
        variant: Variant,
    },
    /// Print overlapping pairs of two BED files
    Intersect {
        a: PathBuf,
        b: PathBuf,

        /// Report hits within this many bp of each interval in `a`
        #[arg(long)]
        window: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Variant {
    Base,
    Full,
}

impl From<Variant> for GraphVariant {
    fn from(v: Variant) -> Self {
        match v {
            Variant::Base => GraphVariant::Base,
            Variant::Full => GraphVariant::Full,
        }
    }
}

fn intersect(a: PathBuf, b: PathBuf, window: Option<u32>) -> Result<()> {
    let mut diagnostics = Diagnostics::new();
    let a = IntervalSet::load(&a, &mut diagnostics)?.sorted();
    let b = IntervalSet::load(&b, &mut diagnostics)?.sorted();
    let mode = window.map_or(JoinMode::Direct, JoinMode::Windowed);

    let start = Instant::now();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut n = 0usize;
    for o in a.intersect(&b, mode)? {
        writeln!(out, "{}\t{}\t{}", o.query.to_bed_line(), o.hit.to_bed_line(), o.overlap_bp)?;
        n += 1;
    }
    out.flush()?;

    log::info!("{n} pairs ({mode:?}) in {:?}", start.elapsed());
    diagnostics.log_summary("intersect");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .parse_default_env()
        .init();

    match args.command {
        Command::Run { config } => {
            let cfg = PipelineConfig::load(&config)
                .with_context(|| format!("invalid run configuration {config:?}"))?;
            let outputs = pipeline::run(&cfg).with_context(|| format!("tissue '{}' failed", cfg.tissue))?;
            println!(
                "{}\tbase: {} nodes, {} edges\tfull: {} nodes, {} edges\t{} issues",
                outputs.tissue,
                outputs.base.num_nodes,
                outputs.base.num_edges,
                outputs.full.num_nodes,
                outputs.full.num_edges,
                outputs.diagnostics.total().total()
            );
        }
        Command::Compose {
            tissue_dirs,
            out,
            variant,
        } => {
            let summary = pipeline::compose(&tissue_dirs, variant.into(), &out)
                .with_context(|| format!("composing {} tissues into {out:?}", tissue_dirs.len()))?;
            println!(
                "{} nodes, {} edges, {:.3} edges per node",
                summary.num_nodes, summary.num_edges, summary.avg_edges
            );
        }
        Command::Intersect { a, b, window } => intersect(a, b, window)?,
    }

    Ok(())
}
