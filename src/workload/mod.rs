/*!
 * Workload Driver
 *
 * Multi-threaded throughput runs comparing raw locking against shielded
 * locking. Threads warm up, meet on a start gate, then run their share of the
 * timed iterations; the report carries aggregate operations per second.
 * Shielded modes track locks in the directory the configured strategy
 * resolves to for the workload's fan-out.
 *
 * Workloads:
 * - `Flat`: one shared lock, acquire then release (read-locked in the
 *   shared modes)
 * - `Nested`: the same lock acquired `depth` times before unwinding
 * - `Hierarchical`: one random lock from each of `depth` consecutive levels,
 *   always taken in level order
 */

mod driver;

pub use driver::run;

use crate::core::limits::{
    DEFAULT_HIERARCHY_LEVELS, DEFAULT_ITERATIONS, DEFAULT_LOCKS_PER_LEVEL,
    DEFAULT_WARMUP_ITERATIONS,
};
use crate::core::ShieldError;
use crate::shield::{pool_config, ShieldConfig, StrategyType};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How each critical section is entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Real primitive on every call (reentrant primitive for nested runs)
    Raw,
    /// Shielded, strict acquisition
    ShieldedStrict,
    /// Shielded, nested acquisitions elided
    ShieldedReentrant,
    /// Read side of a reader/writer lock on every call
    RawShared,
    /// Shielded read side, nested reads elided
    ShieldedShared,
}

impl LockMode {
    /// Whether the run read-locks a reader/writer lock
    pub const fn is_shared(self) -> bool {
        matches!(self, Self::RawShared | Self::ShieldedShared)
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raw => "raw",
            Self::ShieldedStrict => "shielded_strict",
            Self::ShieldedReentrant => "shielded_reentrant",
            Self::RawShared => "raw_shared",
            Self::ShieldedShared => "shielded_shared",
        };
        f.write_str(name)
    }
}

/// Shape of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Workload {
    Flat,
    Nested {
        depth: usize,
    },
    Hierarchical {
        levels: usize,
        locks_per_level: usize,
        depth: usize,
    },
}

impl Workload {
    pub const fn hierarchical(depth: usize) -> Self {
        Self::Hierarchical {
            levels: DEFAULT_HIERARCHY_LEVELS,
            locks_per_level: DEFAULT_LOCKS_PER_LEVEL,
            depth,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Nested { .. } => "nested",
            Self::Hierarchical { .. } => "hierarchical",
        }
    }

    /// Distinct locks one operation holds at once
    pub const fn fanout(&self) -> usize {
        match *self {
            Self::Flat | Self::Nested { .. } => 1,
            Self::Hierarchical { depth, .. } => depth,
        }
    }
}

/// Driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Worker threads
    pub threads: usize,
    /// Timed operations, split evenly across threads
    pub iterations: u64,
    /// Untimed operations per thread before the start gate
    pub warmup_iterations: u64,
    /// Busy-work units per operation, outside the critical section
    pub work_amount: u32,
    pub mode: LockMode,
    pub workload: Workload,
    /// Directory strategy for shielded modes; `Auto` resolves on fan-out
    pub strategy: StrategyType,
    /// Pin worker `i` to CPU `i % available CPUs` (Linux only)
    pub pin_threads: bool,
    /// Base seed for per-thread lock selection
    pub seed: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            iterations: DEFAULT_ITERATIONS,
            warmup_iterations: DEFAULT_WARMUP_ITERATIONS,
            work_amount: 0,
            mode: LockMode::ShieldedReentrant,
            workload: Workload::Flat,
            strategy: StrategyType::Auto,
            pin_threads: false,
            seed: 0x5eed,
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<(), ShieldError> {
        if self.threads == 0 {
            return Err(invalid("threads must be at least 1"));
        }
        if self.iterations == 0 {
            return Err(invalid("iterations must be at least 1"));
        }

        match self.workload {
            Workload::Flat => {}
            Workload::Nested { depth } => {
                if depth == 0 {
                    return Err(invalid("nesting depth must be at least 1"));
                }
                if depth > 1 && self.mode == LockMode::ShieldedStrict {
                    return Err(invalid(
                        "strict mode cannot nest the same lock; use shielded-reentrant",
                    ));
                }
            }
            Workload::Hierarchical {
                levels,
                locks_per_level,
                depth,
            } => {
                if levels == 0 || locks_per_level == 0 {
                    return Err(invalid("hierarchy needs at least one level and one lock"));
                }
                if depth == 0 || depth > levels {
                    return Err(ShieldError::InvalidConfig(format!(
                        "depth must be in 1..={levels}, got {depth}"
                    )));
                }
                if self.mode.is_shared() {
                    return Err(invalid("shared modes run flat or nested workloads only"));
                }
            }
        }
        Ok(())
    }

    /// Directory strategy the shielded modes run on
    pub fn directory_strategy(&self) -> StrategyType {
        ShieldConfig {
            strategy: self.strategy,
            expected_fanout: self.workload.fanout(),
            pool: pool_config(),
        }
        .select_strategy()
    }

    /// Timed operations assigned to `thread`, remainder going to the lowest indices
    pub fn iterations_for(&self, thread: usize) -> u64 {
        let threads = self.threads.max(1) as u64;
        let base = self.iterations / threads;
        let extra = u64::from((thread as u64) < self.iterations % threads);
        base + extra
    }
}

fn invalid(msg: &str) -> ShieldError {
    ShieldError::InvalidConfig(msg.to_string())
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchReport {
    pub threads: usize,
    pub mode: LockMode,
    pub workload: Workload,
    /// Resolved directory strategy
    pub strategy: StrategyType,
    pub duration_secs: f64,
    pub total_operations: u64,
    pub ops_per_sec: f64,
}

impl BenchReport {
    pub const CSV_HEADER: &'static str = "threads,secs,ops_per_sec";

    pub fn to_csv(&self) -> String {
        format!(
            "{},{:.6},{:.2}",
            self.threads, self.duration_secs, self.ops_per_sec
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Driver failures
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Shield(#[from] ShieldError),

    #[error("Failed to spawn worker {thread}: {source}")]
    Spawn {
        thread: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {thread} panicked")]
    WorkerPanicked { thread: usize },
}
