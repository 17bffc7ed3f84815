/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::LockId;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shielding errors
///
/// The shield itself reports misuse through status values; these errors only
/// appear when a caller converts a status with `into_result()`, or when
/// configuration is rejected.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ShieldError {
    #[error("Strict acquire of {0} while the current thread already holds it")]
    #[diagnostic(
        code(shield::unbalanced_lock),
        help("Release the lock first, or acquire it in reentrant mode.")
    )]
    UnbalancedLock(LockId),

    #[error("Release of {0} which the current thread does not hold")]
    #[diagnostic(
        code(shield::unbalanced_unlock),
        help("Every release must match an earlier acquire on the same thread.")
    )]
    UnbalancedUnlock(LockId),

    #[error("Lock table full: {capacity} distinct locks already held, cannot track {lock}")]
    #[diagnostic(
        code(shield::capacity_exceeded),
        help("Release a lock first, or switch this thread to the pooled directory.")
    )]
    CapacityExceeded { lock: LockId, capacity: usize },

    #[error("Pool configuration already installed")]
    #[diagnostic(
        code(shield::pool_config_installed),
        help("install_pool_config() must run once, before any thread uses the pooled directory.")
    )]
    PoolConfigAlreadyInstalled,

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(shield::invalid_config))]
    InvalidConfig(String),
}

/// Result type for shielding operations
pub type ShieldResult<T> = Result<T, ShieldError>;

/// Insertion into a directory with no room left
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("lock directory full (capacity {capacity})")]
pub struct DirectoryFull {
    pub capacity: usize,
}
