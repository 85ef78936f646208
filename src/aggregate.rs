// src/aggregate.rs
//
// StatsAggregator: folds any number of observation records into merged
// summary statistics, in a single streaming pass. Only the accumulators
// persist across records; records themselves are never retained.
//
// Output schema per merged_observation.json:
// - players[role][strategy] = { mean, true_sample_stddev, egta_sample_stddev }
// - features[name] = mean over observation files, plus one "config" entry

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::observation::Observation;
use crate::stats::{DegeneratePolicy, SumStat};

/// Errors raised while aggregating observations.
#[derive(Debug, Clone)]
pub enum AggregateError {
    /// A player row lacks a required field. The record that contained it
    /// is left uncommitted: no accumulator was touched.
    MissingField { index: usize, field: &'static str },
    /// A stddev was requested for n <= 1 under DegeneratePolicy::Error.
    DegenerateSample {
        role: String,
        strategy: String,
        n: i64,
    },
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::MissingField { index, field } => {
                write!(f, "player {} is missing required field '{}'", index, field)
            }
            AggregateError::DegenerateSample { role, strategy, n } => {
                write!(
                    f,
                    "degenerate sample (n = {}) for role '{}' strategy '{}'",
                    n, role, strategy
                )
            }
        }
    }
}

impl std::error::Error for AggregateError {}

/// Merged payoff statistics for one (role, strategy) pair.
#[derive(Debug, Clone, Serialize)]
pub struct PayoffSummary {
    /// Pooled mean payoff over every inner trial of every player.
    pub mean: f64,
    /// Sample stddev over the full pool of inner trials.
    pub true_sample_stddev: f64,
    /// Sample stddev of the per-observation-file mean payoff.
    pub egta_sample_stddev: f64,
}

/// The aggregated result: the `{players, features}` merged-observation
/// shape written by the merge_obs tool.
#[derive(Debug, Clone, Serialize)]
pub struct MergedObservation {
    pub players: BTreeMap<String, BTreeMap<String, PayoffSummary>>,
    pub features: Map<String, Value>,
}

impl MergedObservation {
    /// Write as compact JSON followed by a newline.
    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        serde_json::to_writer(&mut writer, self)?;
        writeln!(writer)?;
        Ok(())
    }

    /// Write to a file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        self.write(BufWriter::new(file))
    }
}

/// Streaming aggregator over observation records.
///
/// Keeps two accumulators per (role, strategy): a pooled one fed with
/// reconstructed inner-trial sums, and a cross-run one fed with one
/// per-record mean per observation file. Feature accumulators take one
/// value per file.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    true_stats: BTreeMap<String, BTreeMap<String, SumStat>>,
    egta_stats: BTreeMap<String, BTreeMap<String, SumStat>>,
    feature_stats: BTreeMap<String, SumStat>,
    first_config: Option<Value>,
    config: Option<Value>,
    config_mismatches: usize,
    records: usize,
}

/// A validated player row, ready to commit.
struct PlayerRow<'a> {
    role: &'a str,
    strategy: &'a str,
    payoff: f64,
    stddev: f64,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of observation records ingested so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Number of records whose config snapshot differed from the first
    /// one seen. Configs are assumed identical across files; a nonzero
    /// count is a data-quality warning, not an error.
    pub fn config_mismatches(&self) -> usize {
        self.config_mismatches
    }

    /// Fold one observation record into the accumulators.
    ///
    /// Every player row is validated before anything is committed, so a
    /// MissingField error leaves the aggregator exactly as it was.
    pub fn ingest(&mut self, obs: &Observation) -> Result<(), AggregateError> {
        let num_sims = obs.num_sims().max(1);

        // Validate first, commit second.
        let mut rows = Vec::with_capacity(obs.players.len());
        for (index, player) in obs.players.iter().enumerate() {
            let role = player
                .role
                .as_deref()
                .ok_or(AggregateError::MissingField {
                    index,
                    field: "role",
                })?;
            let strategy = player
                .strategy
                .as_deref()
                .ok_or(AggregateError::MissingField {
                    index,
                    field: "strategy",
                })?;
            let payoff = player
                .payoff_f64()
                .ok_or(AggregateError::MissingField {
                    index,
                    field: "payoff",
                })?;
            rows.push(PlayerRow {
                role,
                strategy,
                payoff,
                stddev: player.payoff_stddev(),
            });
        }

        // Pooled stats plus a per-record scratch whose means feed the
        // cross-run stats once the record is done.
        let mut scratch: BTreeMap<(&str, &str), SumStat> = BTreeMap::new();
        for row in &rows {
            let n = num_sims as f64;
            let sum = n * row.payoff;
            let sumsq = row.stddev * row.stddev * (n - 1.0) + n * row.payoff * row.payoff;
            self.true_stats
                .entry(row.role.to_string())
                .or_default()
                .entry(row.strategy.to_string())
                .or_default()
                .add_many(num_sims, sum, sumsq);
            scratch
                .entry((row.role, row.strategy))
                .or_default()
                .add_one(row.payoff);
        }
        for ((role, strategy), stat) in scratch {
            self.egta_stats
                .entry(role.to_string())
                .or_default()
                .entry(strategy.to_string())
                .or_default()
                .add_one(stat.mean());
        }

        // Observation-level features: one value per file, with the same
        // number-or-numeric-string coercion as payoff. Non-numeric
        // entries (other than the config snapshot) are skipped.
        for (key, value) in &obs.features {
            if Observation::is_config_key(key) {
                continue;
            }
            if let Some(v) = crate::observation::numeric(value) {
                self.feature_stats.entry(key.clone()).or_default().add_one(v);
            }
        }

        // Mismatches are counted against the first snapshot; the last
        // snapshot is the one carried into the output.
        if let Some(config) = obs.config() {
            match &self.first_config {
                Some(first) if first != config => self.config_mismatches += 1,
                Some(_) => {}
                None => self.first_config = Some(config.clone()),
            }
            self.config = Some(config.clone());
        }

        self.records += 1;
        Ok(())
    }

    /// Read out the merged result, consuming the aggregator.
    pub fn finalize(self, policy: DegeneratePolicy) -> Result<MergedObservation, AggregateError> {
        let mut players: BTreeMap<String, BTreeMap<String, PayoffSummary>> = BTreeMap::new();
        for (role, by_strategy) in &self.true_stats {
            for (strategy, stat) in by_strategy {
                let degenerate = |err: crate::stats::DegenerateSample| {
                    AggregateError::DegenerateSample {
                        role: role.clone(),
                        strategy: strategy.clone(),
                        n: err.n,
                    }
                };
                let true_sd = stat.sample_stddev(policy).map_err(&degenerate)?;
                // Every true accumulator has a matching egta accumulator:
                // both are created by the same ingest pass.
                let egta_stat = &self.egta_stats[role][strategy];
                let egta_sd = egta_stat.sample_stddev(policy).map_err(&degenerate)?;
                players.entry(role.clone()).or_default().insert(
                    strategy.clone(),
                    PayoffSummary {
                        mean: stat.mean(),
                        true_sample_stddev: true_sd,
                        egta_sample_stddev: egta_sd,
                    },
                );
            }
        }

        let mut features = Map::new();
        if let Some(config) = self.config {
            features.insert("config".to_string(), config);
        }
        for (name, stat) in &self.feature_stats {
            features.insert(name.clone(), stat.mean().into());
        }

        Ok(MergedObservation { players, features })
    }
}
