/*!
 * Shielded Acquire/Release
 *
 * Decides per call whether the real primitive must run. The directory is only
 * borrowed for the bookkeeping step; the real lock/unlock runs outside that
 * borrow, so a blocking or re-entering primitive never observes a held
 * directory.
 */

use super::call::LockCall;
use super::directory::{LockDirectory, PooledDirectory};
use super::scope::{DirectoryScope, ThreadBounded, ThreadPooled};
use super::status::{AcquireStatus, Reentrancy, ReleaseStatus};
use crate::core::{LockId, LockRecord, RecursionCount};
use std::cell::RefCell;

/// Bookkeeping decision taken before touching the real primitive
enum Admission {
    /// Record reserved; the real lock must run
    Forward,
    Elided,
    Unbalanced,
    Full,
}

/// Rolls back a reserved record if the real lock operation unwinds
struct Reservation<'s, S: DirectoryScope> {
    scope: &'s S,
    id: LockId,
}

impl<S: DirectoryScope> Reservation<'_, S> {
    #[inline(always)]
    fn commit(self) {
        std::mem::forget(self);
    }
}

impl<S: DirectoryScope> Drop for Reservation<'_, S> {
    fn drop(&mut self) {
        let id = self.id;
        self.scope.with_directory(|dir| {
            dir.remove(id);
        });
    }
}

/// Lock shield over one directory scope
///
/// # Example
///
/// ```
/// use lock_shield::shield::{AcquireStatus, ReleaseStatus, Reentrancy, Shield};
/// use parking_lot::lock_api::RawMutex as _;
///
/// let raw = parking_lot::RawMutex::INIT;
/// let shield = Shield::thread_bounded();
///
/// let lock = |m: &parking_lot::RawMutex| m.lock();
/// let unlock = |m: &parking_lot::RawMutex| unsafe { m.unlock() };
///
/// assert_eq!(shield.acquire(&raw, Reentrancy::Reentrant, lock, ()), AcquireStatus::AcquireNow);
/// assert_eq!(shield.acquire(&raw, Reentrancy::Reentrant, lock, ()), AcquireStatus::SkipAcquisition);
/// assert_eq!(shield.release(&raw, Reentrancy::Reentrant, unlock, ()), ReleaseStatus::SkipRelease);
/// assert_eq!(shield.release(&raw, Reentrancy::Reentrant, unlock, ()), ReleaseStatus::ReleaseNow);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct Shield<S> {
    scope: S,
}

impl Shield<ThreadBounded> {
    /// Shield over the calling thread's bounded table
    pub const fn thread_bounded() -> Self {
        Self {
            scope: ThreadBounded,
        }
    }
}

impl Shield<ThreadPooled> {
    /// Shield over the calling thread's pooled directory
    pub const fn thread_pooled() -> Self {
        Self {
            scope: ThreadPooled,
        }
    }
}

impl<D: LockDirectory> Shield<RefCell<D>> {
    /// Shield over a directory owned by the caller
    ///
    /// The result is `!Sync`; it serves whichever single thread holds it.
    pub fn local(directory: D) -> Self {
        Self {
            scope: RefCell::new(directory),
        }
    }

    pub fn into_directory(self) -> D {
        self.scope.into_inner()
    }
}

impl Shield<RefCell<PooledDirectory>> {
    pub fn local_pooled(pool_size: usize, bucket_count: usize) -> Self {
        Self::local(PooledDirectory::with_capacity(pool_size, bucket_count))
    }
}

impl<S: DirectoryScope> Shield<S> {
    pub const fn new(scope: S) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &S {
        &self.scope
    }

    /// Shielded acquire using the lock's address as its identity
    ///
    /// `lock_fn` receives `lock` plus `args` and only runs when the calling
    /// thread does not hold the lock yet.
    #[inline]
    pub fn acquire<'l, L, F, A>(
        &self,
        lock: &'l L,
        mode: impl Into<Reentrancy>,
        lock_fn: F,
        args: A,
    ) -> AcquireStatus
    where
        L: ?Sized,
        F: LockCall<&'l L, A>,
    {
        self.acquire_raw(LockId::of(lock), lock, mode, lock_fn, args)
    }

    /// Shielded release using the lock's address as its identity
    #[inline]
    pub fn release<'l, L, F, A>(
        &self,
        lock: &'l L,
        mode: impl Into<Reentrancy>,
        unlock_fn: F,
        args: A,
    ) -> ReleaseStatus
    where
        L: ?Sized,
        F: LockCall<&'l L, A>,
    {
        self.release_raw(LockId::of(lock), lock, mode, unlock_fn, args)
    }

    /// Shielded acquire of an explicit identity
    ///
    /// - not held: reserve a record, run `lock_fn(handle, args..)`, `AcquireNow`
    /// - held, reentrant: count one more level, `SkipAcquisition`
    /// - held, strict: `UnbalancedLock`, primitive not called
    /// - not held, directory full: `CapacityExceeded`, primitive not called
    pub fn acquire_raw<H, F, A>(
        &self,
        id: LockId,
        handle: H,
        mode: impl Into<Reentrancy>,
        lock_fn: F,
        args: A,
    ) -> AcquireStatus
    where
        F: LockCall<H, A>,
    {
        let mode = mode.into();
        let admission = self.scope.with_directory(|dir| {
            if dir.contains(id) {
                if mode.is_reentrant() {
                    dir.increment(id);
                    Admission::Elided
                } else {
                    Admission::Unbalanced
                }
            } else if dir.insert(id).is_ok() {
                Admission::Forward
            } else {
                Admission::Full
            }
        });

        match admission {
            Admission::Forward => {
                let reservation = Reservation {
                    scope: &self.scope,
                    id,
                };
                LockCall::call(lock_fn, handle, args);
                reservation.commit();
                AcquireStatus::AcquireNow
            }
            Admission::Elided => AcquireStatus::SkipAcquisition,
            Admission::Unbalanced => AcquireStatus::UnbalancedLock,
            Admission::Full => AcquireStatus::CapacityExceeded,
        }
    }

    /// Shielded release of an explicit identity
    ///
    /// - not held: `UnbalancedUnlock`, primitive not called
    /// - reentrant: drop one level; at zero remove the record, run
    ///   `unlock_fn`, `ReleaseNow`; otherwise `SkipRelease`
    /// - strict: remove the record whatever its count, run `unlock_fn`,
    ///   `ReleaseNow`
    pub fn release_raw<H, F, A>(
        &self,
        id: LockId,
        handle: H,
        mode: impl Into<Reentrancy>,
        unlock_fn: F,
        args: A,
    ) -> ReleaseStatus
    where
        F: LockCall<H, A>,
    {
        let mode = mode.into();
        let remaining = self.scope.with_directory(|dir| {
            if mode.is_reentrant() {
                dir.decrement_or_remove(id)
            } else {
                dir.remove(id).map(|_| 0)
            }
        });

        match remaining {
            None => ReleaseStatus::UnbalancedUnlock,
            Some(0) => {
                LockCall::call(unlock_fn, handle, args);
                ReleaseStatus::ReleaseNow
            }
            Some(_) => ReleaseStatus::SkipRelease,
        }
    }

    /// Recursion depth of `lock` on the calling thread, `None` if not held
    pub fn recursion_count<L: ?Sized>(&self, lock: &L) -> Option<RecursionCount> {
        self.recursion_count_raw(LockId::of(lock))
    }

    pub fn recursion_count_raw(&self, id: LockId) -> Option<RecursionCount> {
        self.scope
            .with_directory(|dir| dir.lookup(id).map(|r| r.recursion_count))
    }

    pub fn holds<L: ?Sized>(&self, lock: &L) -> bool {
        self.recursion_count(lock).is_some()
    }

    /// Distinct locks currently recorded
    pub fn held_count(&self) -> usize {
        self.scope.with_directory(|dir| dir.len())
    }

    pub fn held_locks(&self) -> Vec<LockRecord> {
        self.scope.with_directory(|dir| dir.records())
    }

    pub fn capacity(&self) -> Option<usize> {
        self.scope.with_directory(|dir| dir.capacity())
    }
}

/// Shielded acquire against the calling thread's bounded table
#[inline]
pub fn shielded_acquire<'l, L, F, A>(
    lock: &'l L,
    reentrant: impl Into<Reentrancy>,
    lock_fn: F,
    args: A,
) -> AcquireStatus
where
    L: ?Sized,
    F: LockCall<&'l L, A>,
{
    Shield::thread_bounded().acquire(lock, reentrant, lock_fn, args)
}

/// Shielded release against the calling thread's bounded table
#[inline]
pub fn shielded_release<'l, L, F, A>(
    lock: &'l L,
    reentrant: impl Into<Reentrancy>,
    unlock_fn: F,
    args: A,
) -> ReleaseStatus
where
    L: ?Sized,
    F: LockCall<&'l L, A>,
{
    Shield::thread_bounded().release(lock, reentrant, unlock_fn, args)
}

/// Shielded acquire against the calling thread's pooled directory
#[inline]
pub fn pooled_acquire<'l, L, F, A>(
    lock: &'l L,
    reentrant: impl Into<Reentrancy>,
    lock_fn: F,
    args: A,
) -> AcquireStatus
where
    L: ?Sized,
    F: LockCall<&'l L, A>,
{
    Shield::thread_pooled().acquire(lock, reentrant, lock_fn, args)
}

/// Shielded release against the calling thread's pooled directory
#[inline]
pub fn pooled_release<'l, L, F, A>(
    lock: &'l L,
    reentrant: impl Into<Reentrancy>,
    unlock_fn: F,
    args: A,
) -> ReleaseStatus
where
    L: ?Sized,
    F: LockCall<&'l L, A>,
{
    Shield::thread_pooled().release(lock, reentrant, unlock_fn, args)
}
