/*!
 * Lock Shield Library
 * Thread-local elision of redundant lock acquisitions and releases
 */

pub mod core;
pub mod monitoring;
pub mod shield;
pub mod workload;

// Re-exports
pub use crate::core::{LockId, LockRecord, RecursionCount, ShieldError, ShieldResult};
pub use monitoring::init_tracing;
pub use shield::{
    install_pool_config, pooled_acquire, pooled_release, shielded_acquire, shielded_release,
    AcquireStatus, LockCall, Reentrancy, ReleaseStatus, Shield, ShieldConfig, ShieldGuard,
    ShieldedMutex, StrategyType,
};
pub use workload::{BenchConfig, BenchReport, LockMode, Workload};
