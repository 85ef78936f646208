// tests/aggregate_tests.rs
//
// Integration tests for the observation aggregator: end-to-end merging
// of observation files and the statistical contracts of the output.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tempfile::tempdir;

use obstools::observation::{discover_observations, Observation};
use obstools::{DegeneratePolicy, StatsAggregator};

/// Helper to write one observation file with a single zi/b player.
fn write_observation(dir: &Path, index: usize, payoff: f64) {
    let obs = serde_json::json!({
        "players": [
            {"role": "zi", "strategy": "b", "payoff": payoff}
        ],
        "features": {
            "spread_mean": payoff / 100.0,
            "config": {"numSims": 1}
        }
    });
    let path = dir.join(format!("observation{}.json", index));
    let mut file = File::create(path).expect("create observation file");
    write!(file, "{}", serde_json::to_string(&obs).unwrap()).expect("write observation file");
}

/// Scenario: two files with payoffs 100 and 200 merge to mean 150 and
/// both stddev kinds 70.71.
#[test]
fn test_two_file_merge_summary() {
    let temp = tempdir().expect("create temp dir");
    write_observation(temp.path(), 0, 100.0);
    write_observation(temp.path(), 1, 200.0);

    let files = discover_observations(temp.path()).unwrap();
    assert_eq!(files.len(), 2);

    let mut agg = StatsAggregator::new();
    for path in &files {
        let obs = Observation::from_file(path).unwrap();
        agg.ingest(&obs).unwrap();
    }
    let merged = agg.finalize(DegeneratePolicy::Zero).unwrap();

    let summary = &merged.players["zi"]["b"];
    assert!((summary.mean - 150.0).abs() < 1e-9);
    assert!((summary.true_sample_stddev - 70.71).abs() < 0.01);
    assert!((summary.egta_sample_stddev - 70.71).abs() < 0.01);

    // Feature mean of {1.0, 2.0} and the carried config.
    assert_eq!(merged.features["spread_mean"], serde_json::json!(1.5));
    assert_eq!(merged.features["config"]["numSims"], serde_json::json!(1));
}

/// The pooled mean equals the arithmetic mean of every injected payoff.
#[test]
fn test_pooled_mean_matches_arithmetic_mean() {
    let payoffs: Vec<f64> = (0..200).map(|i| 50.0 + (i as f64) * 1.75).collect();
    let mut agg = StatsAggregator::new();
    for p in &payoffs {
        let obs = Observation::from_json(&format!(
            r#"{{"players": [{{"role": "r", "strategy": "s", "payoff": {}}}],
                "features": {{}}}}"#,
            p
        ))
        .unwrap();
        agg.ingest(&obs).unwrap();
    }

    let merged = agg.finalize(DegeneratePolicy::Zero).unwrap();
    let mean = merged.players["r"]["s"].mean;
    let expected = payoffs.iter().sum::<f64>() / payoffs.len() as f64;
    assert!((mean - expected).abs() / expected.abs() < 1e-9);
}

/// With numSims = 1 and one player per file, the pooled and cross-run
/// stddevs see identical samples and must agree exactly.
#[test]
fn test_stddev_reconciliation_at_num_sims_one() {
    let payoffs = [12.0, 19.0, 7.5, 33.25, 21.0, 15.5];
    let mut agg = StatsAggregator::new();
    for p in payoffs {
        let obs = Observation::from_json(&format!(
            r#"{{"players": [{{"role": "r", "strategy": "s", "payoff": {}}}],
                "features": {{"config": {{"numSims": 1}}}}}}"#,
            p
        ))
        .unwrap();
        agg.ingest(&obs).unwrap();
    }

    let merged = agg.finalize(DegeneratePolicy::Error).unwrap();
    let summary = &merged.players["r"]["s"];
    assert!((summary.true_sample_stddev - summary.egta_sample_stddev).abs() < 1e-9);
}

/// Multiple players sharing a role/strategy within one observation all
/// contribute to the pool, but the file contributes one mean to the
/// cross-run statistic.
#[test]
fn test_shared_role_strategy_within_observation() {
    let obs = Observation::from_json(
        r#"{"players": [
            {"role": "zi", "strategy": "b", "payoff": 10.0},
            {"role": "zi", "strategy": "b", "payoff": 30.0},
            {"role": "mm", "strategy": "q", "payoff": 5.0}
        ], "features": {}}"#,
    )
    .unwrap();
    let mut agg = StatsAggregator::new();
    agg.ingest(&obs).unwrap();
    let merged = agg.finalize(DegeneratePolicy::Zero).unwrap();

    assert!((merged.players["zi"]["b"].mean - 20.0).abs() < 1e-12);
    assert!((merged.players["mm"]["q"].mean - 5.0).abs() < 1e-12);
    // Single contributing file: cross-run stddev degenerate (policy Zero).
    assert_eq!(merged.players["zi"]["b"].egta_sample_stddev, 0.0);
}

/// Observation files that already compress numSims inner trials pool
/// correctly through the reconstructed sum / sum-of-squares.
#[test]
fn test_inner_trial_pooling_across_files() {
    // File A: 3 inner trials, mean 10, stddev 1 -> pool {~9,10,11}.
    // File B: 3 inner trials, mean 20, stddev 1.
    // Pooled mean must be 15 and the pooled stddev must dominate the
    // within-file stddev (the run means are 10 apart).
    let make = |mean: f64| {
        Observation::from_json(&format!(
            r#"{{"players": [{{"role": "r", "strategy": "s", "payoff": {},
                               "features": {{"payoff_stddev": 1.0}}}}],
                "features": {{"config": {{"numSims": 3}}}}}}"#,
            mean
        ))
        .unwrap()
    };
    let mut agg = StatsAggregator::new();
    agg.ingest(&make(10.0)).unwrap();
    agg.ingest(&make(20.0)).unwrap();

    let merged = agg.finalize(DegeneratePolicy::Zero).unwrap();
    let summary = &merged.players["r"]["s"];
    assert!((summary.mean - 15.0).abs() < 1e-9);

    // Pooled sumsq = 2 * (1*(3-1) + 3*mean^2); n = 6.
    let sumsq = (2.0 + 3.0 * 100.0) + (2.0 + 3.0 * 400.0);
    let expected = ((sumsq - (90.0f64 * 90.0) / 6.0) / 5.0).sqrt();
    assert!((summary.true_sample_stddev - expected).abs() < 1e-9);

    // Cross-run stddev over the two run means {10, 20}.
    assert!((summary.egta_sample_stddev - 50.0f64.sqrt()).abs() < 1e-9);
}

/// The merged output round-trips through its JSON encoding.
#[test]
fn test_merged_output_round_trip() {
    let temp = tempdir().expect("create temp dir");
    write_observation(temp.path(), 0, 100.0);
    write_observation(temp.path(), 1, 200.0);

    let mut agg = StatsAggregator::new();
    for path in discover_observations(temp.path()).unwrap() {
        agg.ingest(&Observation::from_file(&path).unwrap()).unwrap();
    }
    let merged = agg.finalize(DegeneratePolicy::Zero).unwrap();

    let out_path = temp.path().join("merged_observation.json");
    merged.write_to_file(&out_path).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert!((value["players"]["zi"]["b"]["mean"].as_f64().unwrap() - 150.0).abs() < 1e-9);
    assert!(value["features"]["config"].is_object());
}
