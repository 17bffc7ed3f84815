/*!
 * Directory Scopes
 *
 * Where a lock directory lives. Thread scopes keep one directory per thread in
 * thread-local storage: created lazily on first use, dropped at thread exit,
 * never reachable from another thread. A `RefCell` scope wraps a directory the
 * caller owns outright.
 */

use super::config::PoolConfig;
use super::directory::{BoundedTable, DirectoryStats, LockDirectory, PooledDirectory};
use crate::core::{ShieldError, ShieldResult};
use std::cell::RefCell;
use std::sync::OnceLock;

/// Access to the directory a shield operates on
///
/// The closure must not call back into the same scope; the shield only ever
/// passes its own bookkeeping closures, never the caller's lock operations.
pub trait DirectoryScope {
    type Directory: LockDirectory;

    fn with_directory<R>(&self, f: impl FnOnce(&mut Self::Directory) -> R) -> R;
}

mod sealed {
    pub trait Sealed {}

    /// Unforgeable outside this crate
    #[derive(Debug, Clone, Copy)]
    pub struct GuardToken(pub(in crate::shield) ());
}

pub(crate) use sealed::GuardToken;

/// Zero-sized scopes backed by thread-local directories
///
/// Sealed: each scope also owns a second, crate-private directory that only
/// `ShieldedMutex` guards can reach, so no public shield can forge or drop
/// the records their `unlock` relies on.
pub trait ThreadScope: DirectoryScope + Copy + Send + Sync + 'static + sealed::Sealed {
    const INSTANCE: Self;

    #[doc(hidden)]
    fn with_guard_directory<R>(token: GuardToken, f: impl FnOnce(&mut Self::Directory) -> R) -> R;
}

static POOL_CONFIG: OnceLock<PoolConfig> = OnceLock::new();

thread_local! {
    static BOUNDED: RefCell<BoundedTable> = const { RefCell::new(BoundedTable::new()) };
    static POOLED: RefCell<PooledDirectory> =
        RefCell::new(PooledDirectory::with_config(&pool_config()));

    static GUARD_BOUNDED: RefCell<BoundedTable> = const { RefCell::new(BoundedTable::new()) };
    static GUARD_POOLED: RefCell<PooledDirectory> =
        RefCell::new(PooledDirectory::with_config(&pool_config()));
}

/// Set the pool sizing used by thread-pooled directories created from now on
///
/// May succeed once per process. Threads that already touched their pooled
/// directory keep the sizing they started with.
pub fn install_pool_config(config: PoolConfig) -> ShieldResult<()> {
    config.validate()?;
    POOL_CONFIG
        .set(config)
        .map_err(|_| ShieldError::PoolConfigAlreadyInstalled)?;
    tracing::debug!(
        pool_size = config.pool_size,
        bucket_count = config.bucket_count,
        "installed lock directory pool configuration"
    );
    Ok(())
}

/// Pool sizing for newly created thread-pooled directories
pub fn pool_config() -> PoolConfig {
    POOL_CONFIG.get().copied().unwrap_or_default()
}

/// The calling thread's bounded lock table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadBounded;

impl DirectoryScope for ThreadBounded {
    type Directory = BoundedTable;

    #[inline(always)]
    fn with_directory<R>(&self, f: impl FnOnce(&mut Self::Directory) -> R) -> R {
        BOUNDED.with(|table| f(&mut *table.borrow_mut()))
    }
}

impl sealed::Sealed for ThreadBounded {}

impl ThreadScope for ThreadBounded {
    const INSTANCE: Self = ThreadBounded;

    #[inline(always)]
    fn with_guard_directory<R>(_: GuardToken, f: impl FnOnce(&mut Self::Directory) -> R) -> R {
        GUARD_BOUNDED.with(|table| f(&mut *table.borrow_mut()))
    }
}

/// The calling thread's pooled lock directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadPooled;

impl ThreadPooled {
    /// Node usage of the calling thread's directory
    pub fn stats(&self) -> DirectoryStats {
        self.with_directory(|dir| dir.stats())
    }
}

impl DirectoryScope for ThreadPooled {
    type Directory = PooledDirectory;

    #[inline(always)]
    fn with_directory<R>(&self, f: impl FnOnce(&mut Self::Directory) -> R) -> R {
        POOLED.with(|dir| f(&mut *dir.borrow_mut()))
    }
}

impl sealed::Sealed for ThreadPooled {}

impl ThreadScope for ThreadPooled {
    const INSTANCE: Self = ThreadPooled;

    #[inline(always)]
    fn with_guard_directory<R>(_: GuardToken, f: impl FnOnce(&mut Self::Directory) -> R) -> R {
        GUARD_POOLED.with(|dir| f(&mut *dir.borrow_mut()))
    }
}

impl<D: LockDirectory> DirectoryScope for RefCell<D> {
    type Directory = D;

    #[inline(always)]
    fn with_directory<R>(&self, f: impl FnOnce(&mut Self::Directory) -> R) -> R {
        f(&mut *self.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LockId;
    use std::thread;

    #[test]
    fn test_thread_tables_are_private() {
        let id = LockId::from_raw(0xabc0);

        // Recorded on a helper thread, then that thread exits
        thread::spawn(move || {
            ThreadBounded.with_directory(|t| t.insert(id)).unwrap();
            assert!(ThreadBounded.with_directory(|t| t.contains(id)));
        })
        .join()
        .unwrap();

        thread::spawn(move || {
            assert!(!ThreadBounded.with_directory(|t| t.contains(id)));
            assert!(ThreadPooled.with_directory(|d| d.is_empty()));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_pooled_directory_created_lazily_with_pool() {
        thread::spawn(|| {
            let stats = ThreadPooled.stats();
            assert_eq!(stats.live, 0);
            assert_eq!(stats.free_nodes, stats.pool_size);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_guard_directory_is_separate() {
        thread::spawn(|| {
            let id = LockId::from_raw(0x77);
            ThreadBounded.with_directory(|t| t.insert(id)).unwrap();
            assert!(!ThreadBounded::with_guard_directory(GuardToken(()), |t| t.contains(id)));

            ThreadPooled::with_guard_directory(GuardToken(()), |d| d.insert(id)).unwrap();
            assert!(!ThreadPooled.with_directory(|d| d.contains(id)));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_refcell_scope() {
        let scope = RefCell::new(BoundedTable::<2>::new());
        scope.with_directory(|t| t.insert(LockId::from_raw(8))).unwrap();
        assert_eq!(scope.borrow().len(), 1);
    }
}
