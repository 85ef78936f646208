// src/observation.rs
//
// Observation record data model.
//
// One observation file is a JSON summary of a simulated market run:
// per-player payoffs, observation-level scalar features, and a config
// snapshot. Field access is deliberately forgiving (the files come from
// several simulator generations with slightly different encodings), so
// required-ness is checked at ingestion time rather than at parse time.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

/// Reserved feature key holding the configuration snapshot.
pub const CONFIG_KEY: &str = "config";

/// Variant encoding: some simulator versions store the config under the
/// empty-string feature key.
pub const CONFIG_KEY_EMPTY: &str = "";

/// One player entry in an observation.
///
/// `role`, `strategy`, and `payoff` are required by the aggregation but
/// modeled as optional here so a missing field surfaces as a structured
/// MissingField error instead of a serde parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerObs {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub payoff: Option<Value>,
    /// Per-player scalar features. `payoff_stddev`, when present, is the
    /// sample stddev of payoff across the file's numSims inner trials.
    #[serde(default)]
    pub features: BTreeMap<String, Value>,
}

impl PlayerObs {
    /// Payoff as f64, accepting a JSON number or a numeric string.
    pub fn payoff_f64(&self) -> Option<f64> {
        self.payoff.as_ref().and_then(numeric)
    }

    /// Cross-trial payoff stddev, defaulting to 0.0 when absent
    /// (treats the observation as a single inner trial).
    pub fn payoff_stddev(&self) -> f64 {
        self.features
            .get("payoff_stddev")
            .and_then(numeric)
            .unwrap_or(0.0)
    }
}

/// One observation record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub players: Vec<PlayerObs>,
    #[serde(default)]
    pub features: Map<String, Value>,
}

impl Observation {
    /// Parse an observation from a JSON string.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Read and parse an observation file.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents).map_err(io::Error::other)
    }

    /// The configuration snapshot, under `config` or the empty-string key.
    pub fn config(&self) -> Option<&Value> {
        self.features
            .get(CONFIG_KEY)
            .or_else(|| self.features.get(CONFIG_KEY_EMPTY))
    }

    /// True if `key` is the reserved configuration key.
    pub fn is_config_key(key: &str) -> bool {
        key == CONFIG_KEY || key == CONFIG_KEY_EMPTY
    }

    /// Number of elementary simulation trials aggregated inside this
    /// observation (`config.numSims`), defaulting to 1.
    pub fn num_sims(&self) -> i64 {
        self.config()
            .and_then(|c| c.get("numSims"))
            .and_then(integer)
            .unwrap_or(1)
    }
}

/// Coerce a JSON value to f64: number, or a string holding a number.
pub(crate) fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerce a JSON value to i64: integer, or a string holding one.
fn integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Discover observation files (`observation*.json`) under a directory.
///
/// Non-recursive: simulator output directories hold their observations
/// flat. Results are sorted for deterministic ingestion order.
pub fn discover_observations(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if name.starts_with("observation") && name.ends_with(".json") {
            results.push(path);
        }
    }
    results.sort();
    Ok(results)
}
