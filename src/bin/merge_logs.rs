// src/bin/merge_logs.rs
//
// Merge timestamped simulator log files into one globally time-ordered
// stream, each line tagged with its source.
//
// Usage:
//   merge_logs run_a/sim.log run_b/sim.log -o merged.log
//   merge_logs --strict --pattern tagged merged_a.log merged_b.log

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use obstools::{display_names, LogMerger, LogSource, MergeMode, TimePattern};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PatternArg {
    /// Leading decimal timestamp (default simulator log format).
    Leading,
    /// Timestamp after a pipe-delimited source tag (re-merging
    /// already-merged output).
    Tagged,
}

#[derive(Debug, Parser)]
#[command(
    name = "merge_logs",
    about = "Merge simulator log files by embedded timestamp",
    version
)]
struct Args {
    /// Log files to merge.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output file; defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stock timestamp pattern.
    #[arg(long, value_enum, default_value_t = PatternArg::Leading)]
    pattern: PatternArg,

    /// Custom timestamp regex (capture group 1); overrides --pattern.
    #[arg(long)]
    regex: Option<String>,

    /// Treat a decreasing timestamp as fatal instead of starting a new
    /// simulation epoch.
    #[arg(long)]
    strict: bool,

    /// Print line and tie counts to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let pattern = match &args.regex {
        Some(re) => TimePattern::custom(re).with_context(|| format!("bad --regex '{}'", re))?,
        None => match args.pattern {
            PatternArg::Leading => TimePattern::leading(),
            PatternArg::Tagged => TimePattern::tagged(),
        },
    };
    let mode = if args.strict {
        MergeMode::Strict
    } else {
        MergeMode::EpochAware
    };

    let names = display_names(&args.files);
    let mut sources = Vec::with_capacity(args.files.len());
    for (path, name) in args.files.iter().zip(names) {
        let source = LogSource::open(path, name)
            .with_context(|| format!("failed to open '{}'", path.display()))?;
        sources.push(source);
    }

    let merger = LogMerger::new(pattern, mode);
    let stats = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create '{}'", path.display()))?;
            let mut writer = BufWriter::new(file);
            let stats = merger.merge(sources, &mut writer)?;
            writer.flush()?;
            stats
        }
        None => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            let stats = merger.merge(sources, &mut writer)?;
            writer.flush()?;
            stats
        }
    };

    if args.verbose {
        eprintln!("merged {} line(s), {} tie(s)", stats.lines, stats.ties);
    }

    Ok(())
}
