/*!
 * Shielded Mutex
 *
 * RAII wrapper pairing any `lock_api::RawMutex` with a thread-scoped shield.
 * Nested `lock()` calls from the owning thread are elided, so a plain
 * non-recursive mutex behaves like a recursive one without paying for the
 * real lock on every nested entry.
 *
 * Guard records live in a directory private to this module, separate from
 * the one public shields use. A record there exists only while the thread
 * holds the raw mutex, which is what makes the guard's unlock sound.
 */

use super::engine::Shield;
use super::scope::{DirectoryScope, GuardToken, ThreadBounded, ThreadScope};
use super::status::{AcquireStatus, Reentrancy};
use crate::core::{LockId, RecursionCount, ShieldResult};
use parking_lot::lock_api::RawMutex;
use std::fmt;
use std::marker::PhantomData;

/// Non-data mutex whose same-thread re-entry is shielded
///
/// # Example
///
/// ```
/// use lock_shield::shield::ShieldedMutex;
///
/// let mutex: ShieldedMutex<parking_lot::RawMutex> = ShieldedMutex::new();
/// let outer = mutex.lock().unwrap();
/// let inner = mutex.lock().unwrap(); // elided, no deadlock
/// assert_eq!(mutex.recursion_depth(), 2);
/// drop(inner);
/// drop(outer);
/// assert!(!mutex.is_locked());
/// ```
pub struct ShieldedMutex<R: RawMutex, S: ThreadScope = ThreadBounded> {
    raw: R,
    shield: Shield<GuardScope<S>>,
}

/// The guard-only directory of thread scope `S`
struct GuardScope<S>(PhantomData<S>);

impl<S: ThreadScope> DirectoryScope for GuardScope<S> {
    type Directory = S::Directory;

    #[inline(always)]
    fn with_directory<T>(&self, f: impl FnOnce(&mut Self::Directory) -> T) -> T {
        S::with_guard_directory(GuardToken(()), f)
    }
}

/// `ShieldedMutex` over parking_lot's raw mutex and the bounded table
pub type ShieldedParkingMutex = ShieldedMutex<parking_lot::RawMutex>;

impl<R: RawMutex, S: ThreadScope> ShieldedMutex<R, S> {
    pub const fn new() -> Self {
        Self {
            raw: R::INIT,
            shield: Shield::new(GuardScope(PhantomData)),
        }
    }

    #[inline]
    pub fn id(&self) -> LockId {
        LockId::of(&self.raw)
    }

    /// Acquire, blocking only if another thread holds the mutex
    ///
    /// Fails with `CapacityExceeded` when the thread's directory cannot track
    /// one more lock; the raw mutex is left untouched in that case.
    pub fn lock(&self) -> ShieldResult<ShieldGuard<'_, R, S>> {
        let status = self
            .shield
            .acquire(&self.raw, Reentrancy::Reentrant, |raw: &R| raw.lock(), ());
        let _held = status.into_result(self.id(), self.shield.capacity().unwrap_or(0))?;
        Ok(ShieldGuard::new(self))
    }

    /// Acquire without blocking
    ///
    /// Always succeeds when the calling thread already holds the mutex.
    pub fn try_lock(&self) -> Option<ShieldGuard<'_, R, S>> {
        if !self.is_held_by_current_thread() && !self.raw.try_lock() {
            return None;
        }

        // The raw mutex is held by now; only the bookkeeping remains
        match self
            .shield
            .acquire(&self.raw, Reentrancy::Reentrant, |_: &R| (), ())
        {
            AcquireStatus::AcquireNow | AcquireStatus::SkipAcquisition => {
                Some(ShieldGuard::new(self))
            }
            AcquireStatus::UnbalancedLock | AcquireStatus::CapacityExceeded => {
                // SAFETY: try_lock above succeeded on this thread and nothing
                // recorded it, so this thread is the untracked owner
                unsafe { self.raw.unlock() };
                None
            }
        }
    }

    /// Run `f` inside the critical section
    pub fn with<T>(&self, f: impl FnOnce() -> T) -> ShieldResult<T> {
        let _guard = self.lock()?;
        Ok(f())
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.shield.holds(&self.raw)
    }

    /// Nesting depth on the calling thread (0 when not held)
    pub fn recursion_depth(&self) -> RecursionCount {
        self.shield.recursion_count(&self.raw).unwrap_or(0)
    }

    /// Whether any thread holds the raw mutex
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }
}

impl<R: RawMutex, S: ThreadScope> Default for ShieldedMutex<R, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RawMutex, S: ThreadScope> fmt::Debug for ShieldedMutex<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShieldedMutex")
            .field("id", &self.id())
            .field("locked", &self.is_locked())
            .field("depth_on_current_thread", &self.recursion_depth())
            .finish()
    }
}

/// Proof of one nesting level on a `ShieldedMutex`
///
/// Not `Send`: the record it releases lives in the acquiring thread's
/// directory.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct ShieldGuard<'a, R: RawMutex, S: ThreadScope = ThreadBounded> {
    mutex: &'a ShieldedMutex<R, S>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, R: RawMutex, S: ThreadScope> ShieldGuard<'a, R, S> {
    fn new(mutex: &'a ShieldedMutex<R, S>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }

    pub fn mutex(&self) -> &'a ShieldedMutex<R, S> {
        self.mutex
    }
}

impl<R: RawMutex, S: ThreadScope> Drop for ShieldGuard<'_, R, S> {
    fn drop(&mut self) {
        let status = self.mutex.shield.release(
            &self.mutex.raw,
            Reentrancy::Reentrant,
            // SAFETY: a record for this mutex exists only while this thread
            // holds the raw lock
            |raw: &R| unsafe { raw.unlock() },
            (),
        );
        debug_assert!(!status.is_unbalanced(), "guard outlived its record");
    }
}

impl<R: RawMutex, S: ThreadScope> fmt::Debug for ShieldGuard<'_, R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShieldGuard")
            .field("mutex", &self.mutex.id())
            .finish()
    }
}
