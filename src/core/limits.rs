/*!
 * Shielding Limits and Constants
 *
 * Centralized location for table capacities, pool sizes and driver defaults.
 * Performance-critical constants are marked with [PERF]
 */

// =============================================================================
// BOUNDED TABLE
// =============================================================================

/// Default capacity of the bounded lock table
/// [PERF] Linear scan stays within one cache line of records
pub const DEFAULT_TABLE_CAPACITY: usize = 4;

// =============================================================================
// POOLED DIRECTORY
// =============================================================================

/// Default number of preallocated directory nodes per thread
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default bucket count of the pooled directory (power of two)
pub const DEFAULT_BUCKET_COUNT: usize = 16;

/// Upper bound on preallocated nodes per thread
pub const MAX_POOL_SIZE: usize = 1 << 16;

/// Upper bound on buckets per directory
pub const MAX_BUCKET_COUNT: usize = 1 << 16;

/// Fan-out above which `StrategyType::Auto` picks the pooled directory
pub const AUTO_POOLED_THRESHOLD: usize = DEFAULT_TABLE_CAPACITY;

// =============================================================================
// WORKLOAD DRIVER
// =============================================================================

/// Timed iterations when none are given
pub const DEFAULT_ITERATIONS: u64 = 1_000_000;

/// Warmup iterations per thread before the timed phase
pub const DEFAULT_WARMUP_ITERATIONS: u64 = 10_000;

/// Hierarchy levels of the hierarchical workload
pub const DEFAULT_HIERARCHY_LEVELS: usize = 40;

/// Locks per hierarchy level
pub const DEFAULT_LOCKS_PER_LEVEL: usize = 50;

/// Busy-work performed while holding the innermost hierarchical lock
pub const HIERARCHY_INNER_WORK: u32 = 10;
