//! Obstools core library.
//!
//! Experiment-support tools surrounding an external market simulator.
//! The simulator itself (subprocess invocation, file bookkeeping) lives
//! elsewhere; this crate is the part with engineering content:
//!
//! - **StatsAggregator** (`aggregate`): folds any number of simulation
//!   observation files into merged summary statistics, per (role,
//!   strategy) pair and per scalar feature, distinguishing pooled
//!   ("true") variance from cross-run ("egta") variance.
//!
//! - **LogMerger** (`logmerge`): interleaves any number of timestamped
//!   simulator log streams into one globally time-ordered stream,
//!   tolerating per-file clock resets via a simulation-epoch counter.
//!
//! Both are single-threaded, pull-based streaming transforms: one
//! record or line at a time, with only the accumulators or read
//! cursors held across inputs. The binaries (`src/bin/merge_obs.rs`,
//! `src/bin/merge_logs.rs`) are thin CLI harnesses around these.

pub mod aggregate;
pub mod logmerge;
pub mod observation;
pub mod stats;

// --- Re-exports for ergonomic external use ---------------------------------

pub use aggregate::{AggregateError, MergedObservation, PayoffSummary, StatsAggregator};
pub use logmerge::{
    display_names, LogMerger, LogSource, MergeError, MergeIter, MergeMode, MergeStats, MergedLine,
    TimePattern, TIME_INFINITE,
};
pub use observation::{discover_observations, Observation, PlayerObs};
pub use stats::{DegeneratePolicy, DegenerateSample, KahanSum, SumStat};
