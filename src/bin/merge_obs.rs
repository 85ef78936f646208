// src/bin/merge_obs.rs
//
// Merge simulation observation files into one merged-observation JSON
// with summary statistics per (role, strategy) pair and per feature.
//
// Usage:
//   merge_obs obs-dir/observation*.json > merged_observation.json
//   merge_obs obs-dir/ -o merged_observation.json

use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use obstools::observation::{discover_observations, Observation};
use obstools::{DegeneratePolicy, StatsAggregator};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DegenerateArg {
    /// Report 0.0 when a stddev has n <= 1 (default).
    Zero,
    /// Report NaN (serialized as null).
    Nan,
    /// Fail the merge.
    Error,
}

impl From<DegenerateArg> for DegeneratePolicy {
    fn from(arg: DegenerateArg) -> Self {
        match arg {
            DegenerateArg::Zero => DegeneratePolicy::Zero,
            DegenerateArg::Nan => DegeneratePolicy::Nan,
            DegenerateArg::Error => DegeneratePolicy::Error,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "merge_obs",
    about = "Merge observation files into summary statistics",
    version
)]
struct Args {
    /// Observation files, or a single directory to scan for
    /// observation*.json.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output file; defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Policy for sample stddev when only one sample contributed.
    #[arg(long, value_enum, default_value_t = DegenerateArg::Zero)]
    degenerate: DegenerateArg,

    /// Print record counts and data-quality warnings to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // A single directory argument means "scan it".
    let files = if args.files.len() == 1 && args.files[0].is_dir() {
        let found = discover_observations(&args.files[0])
            .with_context(|| format!("failed to scan '{}'", args.files[0].display()))?;
        if found.is_empty() {
            bail!(
                "no observation*.json files under '{}'",
                args.files[0].display()
            );
        }
        found
    } else {
        args.files.clone()
    };

    let mut aggregator = StatsAggregator::new();
    for path in &files {
        let obs = Observation::from_file(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        aggregator
            .ingest(&obs)
            .with_context(|| format!("failed to aggregate '{}'", path.display()))?;
    }

    if args.verbose {
        eprintln!("merged {} observation file(s)", aggregator.records());
    }
    if aggregator.config_mismatches() > 0 {
        eprintln!(
            "warning: {} observation file(s) carried a config differing from the first",
            aggregator.config_mismatches()
        );
    }

    let merged = aggregator
        .finalize(args.degenerate.into())
        .context("failed to finalize merged statistics")?;

    match &args.output {
        Some(path) => merged
            .write_to_file(path)
            .with_context(|| format!("failed to write '{}'", path.display()))?,
        None => {
            let stdout = io::stdout();
            merged
                .write(BufWriter::new(stdout.lock()))
                .context("failed to write merged observation to stdout")?;
        }
    }

    Ok(())
}
