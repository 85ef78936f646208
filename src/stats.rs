// src/stats.rs
//
// Numerically stable running statistics.
//
// SumStat is the single accumulator primitive underneath the observation
// merger: count, compensated sum, compensated sum of squares. One instance
// exists per (role, strategy) pair or per feature key, created on first
// encounter and read out once at finalize.

use std::fmt;

/// Kahan-compensated running sum.
///
/// Tracks the rounding error accumulated across additions in a separate
/// correction term so that folding millions of values does not drift.
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum {
    value: f64,
    compensation: f64,
}

impl KahanSum {
    /// Add one term to the sum.
    pub fn add(&mut self, x: f64) {
        let y = x - self.compensation;
        let t = self.value + y;
        self.compensation = (t - self.value) - y;
        self.value = t;
    }

    /// Current value of the sum.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Policy for sample standard deviation when the sample is degenerate
/// (n <= 1, where the n-1 denominator is undefined).
///
/// Whichever policy is chosen applies to every stddev the aggregation
/// emits; the two stddev kinds are never treated differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegeneratePolicy {
    /// Report 0.0 for a degenerate sample (JSON-encodable; default).
    #[default]
    Zero,
    /// Report f64::NAN for a degenerate sample.
    Nan,
    /// Fail with a DegenerateSample error.
    Error,
}

/// A sample standard deviation was requested for n <= 1.
#[derive(Debug, Clone)]
pub struct DegenerateSample {
    /// Number of samples in the accumulator.
    pub n: i64,
}

impl fmt::Display for DegenerateSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sample standard deviation undefined for n = {} (need n >= 2)",
            self.n
        )
    }
}

impl std::error::Error for DegenerateSample {}

/// Running statistic: count, compensated sum, compensated sum of squares.
///
/// Sufficient to recover mean and sample standard deviation without
/// retaining individual values, and to fold pre-aggregated batches via
/// `add_many` (an observation file already holding numSims inner trials
/// contributes its reconstructed sum and sum-of-squares in one call).
#[derive(Debug, Clone, Default)]
pub struct SumStat {
    n: i64,
    sum: KahanSum,
    sumsq: KahanSum,
}

impl SumStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a single value.
    pub fn add_one(&mut self, val: f64) {
        self.n += 1;
        self.sum.add(val);
        self.sumsq.add(val * val);
    }

    /// Fold a pre-aggregated batch of `n` values with the given sum and
    /// sum of squares.
    pub fn add_many(&mut self, n: i64, sum: f64, sumsq: f64) {
        self.n += n;
        self.sum.add(sum);
        self.sumsq.add(sumsq);
    }

    /// Number of values folded so far.
    pub fn count(&self) -> i64 {
        self.n
    }

    /// Sum of all folded values.
    pub fn sum(&self) -> f64 {
        self.sum.value()
    }

    /// Arithmetic mean. Meaningless for an empty accumulator; callers
    /// only create accumulators on first value, so n >= 1 in practice.
    pub fn mean(&self) -> f64 {
        self.sum.value() / self.n as f64
    }

    /// Sample standard deviation with n-1 denominator.
    ///
    /// Uses the `sumsq - sum^2/n` squared-error form, clamped at zero
    /// before the square root so floating cancellation can never produce
    /// a NaN from a tiny negative argument.
    pub fn sample_stddev(&self, policy: DegeneratePolicy) -> Result<f64, DegenerateSample> {
        if self.n <= 1 {
            return match policy {
                DegeneratePolicy::Zero => Ok(0.0),
                DegeneratePolicy::Nan => Ok(f64::NAN),
                DegeneratePolicy::Error => Err(DegenerateSample { n: self.n }),
            };
        }
        let n = self.n as f64;
        let sum = self.sum.value();
        let sq_err = (self.sumsq.value() - sum * sum / n).max(0.0);
        Ok((sq_err / (n - 1.0)).sqrt())
    }
}
