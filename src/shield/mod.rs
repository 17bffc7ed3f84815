/*!
 * Lock Shield
 *
 * Thread-local bookkeeping that lets a thread skip redundant acquisitions and
 * releases of locks it already holds. Callers wrap their real lock/unlock
 * operations in a shielded call; the shield decides whether the real
 * operation runs and reports the decision as a status.
 *
 * Two directories are available:
 * - `BoundedTable`: fixed array, linear scan, for threads nesting a few locks
 * - `PooledDirectory`: hashed buckets over a preallocated node pool with
 *   dynamic overflow, for deep lock hierarchies
 */

mod call;
mod config;
mod directory;
mod engine;
mod mutex;
mod scope;
mod status;

pub use call::LockCall;
pub use config::{PoolConfig, ShieldConfig, StrategyType};
pub use directory::{BoundedTable, DirectoryStats, LockDirectory, NodeOrigin, PooledDirectory};
pub use engine::{pooled_acquire, pooled_release, shielded_acquire, shielded_release, Shield};
pub use mutex::{ShieldGuard, ShieldedMutex, ShieldedParkingMutex};
pub use scope::{
    install_pool_config, pool_config, DirectoryScope, ThreadBounded, ThreadPooled, ThreadScope,
};
pub use status::{AcquireStatus, Reentrancy, ReleaseStatus};
