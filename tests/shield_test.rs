/*!
 * Shielded Acquire/Release Integration Tests
 *
 * Thread-local shields over real parking_lot mutexes. Each test runs its
 * body on a fresh thread so per-thread directories start empty.
 */

use lock_shield::shield::{
    pooled_acquire, pooled_release, shielded_acquire, shielded_release, AcquireStatus,
    LockDirectory, NodeOrigin, PooledDirectory, Reentrancy, ReleaseStatus, Shield, ThreadPooled,
};
use lock_shield::LockId;
use parking_lot::lock_api::{RawMutex as _, RawRwLock as _};
use parking_lot::{RawMutex, RawRwLock};
use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn on_fresh_thread<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    thread::spawn(f).join().unwrap()
}

/// Real mutex plus a count of calls that reached it
struct Tracked {
    raw: RawMutex,
    locks: Cell<u32>,
    unlocks: Cell<u32>,
}

impl Tracked {
    fn new() -> Self {
        Self {
            raw: RawMutex::INIT,
            locks: Cell::new(0),
            unlocks: Cell::new(0),
        }
    }
}

fn lock(t: &Tracked) {
    t.raw.lock();
    t.locks.set(t.locks.get() + 1);
}

fn unlock(t: &Tracked) {
    t.unlocks.set(t.unlocks.get() + 1);
    unsafe { t.raw.unlock() };
}

#[test]
fn test_reentrant_acquire_release_cycle() {
    on_fresh_thread(|| {
        let l1 = Tracked::new();
        let shield = Shield::thread_bounded();

        assert_eq!(shielded_acquire(&l1, true, lock, ()), AcquireStatus::AcquireNow);
        assert_eq!(l1.locks.get(), 1);
        assert!(l1.raw.is_locked());

        assert_eq!(shielded_acquire(&l1, true, lock, ()), AcquireStatus::SkipAcquisition);
        assert_eq!(shield.recursion_count(&l1), Some(2));
        assert_eq!(l1.locks.get(), 1);

        assert_eq!(shielded_release(&l1, true, unlock, ()), ReleaseStatus::SkipRelease);
        assert_eq!(shield.recursion_count(&l1), Some(1));
        assert!(l1.raw.is_locked());

        assert_eq!(shielded_release(&l1, true, unlock, ()), ReleaseStatus::ReleaseNow);
        assert_eq!(l1.unlocks.get(), 1);
        assert!(!l1.raw.is_locked());
        assert_eq!(shield.held_count(), 0);
    });
}

#[test]
fn test_strict_double_acquire_is_unbalanced() {
    on_fresh_thread(|| {
        let l1 = Tracked::new();

        assert_eq!(shielded_acquire(&l1, false, lock, ()), AcquireStatus::AcquireNow);
        // The real lock is not re-entered, so no self-deadlock
        assert_eq!(shielded_acquire(&l1, false, lock, ()), AcquireStatus::UnbalancedLock);
        assert_eq!(l1.locks.get(), 1);

        assert_eq!(shielded_release(&l1, false, unlock, ()), ReleaseStatus::ReleaseNow);
        assert!(!l1.raw.is_locked());
    });
}

#[test]
fn test_release_of_never_acquired_lock() {
    on_fresh_thread(|| {
        let l2 = Tracked::new();
        assert_eq!(shielded_release(&l2, true, unlock, ()), ReleaseStatus::UnbalancedUnlock);
        assert_eq!(shielded_release(&l2, false, unlock, ()), ReleaseStatus::UnbalancedUnlock);
        assert_eq!(l2.unlocks.get(), 0);
    });
}

#[test]
fn test_bounded_overflow_reports_capacity_exceeded() {
    on_fresh_thread(|| {
        let locks: Vec<Tracked> = (0..5).map(|_| Tracked::new()).collect();
        let shield = Shield::thread_bounded();

        for l in &locks[..4] {
            assert_eq!(shielded_acquire(l, true, lock, ()), AcquireStatus::AcquireNow);
        }
        assert_eq!(shielded_acquire(&locks[4], true, lock, ()), AcquireStatus::CapacityExceeded);
        assert_eq!(locks[4].locks.get(), 0);
        assert!(!locks[4].raw.is_locked());
        assert!(!shield.holds(&locks[4]));

        // The rejected lock stays unknown to the shield
        assert_eq!(
            shielded_release(&locks[4], true, unlock, ()),
            ReleaseStatus::UnbalancedUnlock
        );

        for l in &locks[..4] {
            assert_eq!(shielded_release(l, true, unlock, ()), ReleaseStatus::ReleaseNow);
        }
        assert_eq!(shield.held_count(), 0);
    });
}

#[test]
fn test_pooled_directory_overflows_into_dynamic_nodes() {
    let mut dir = PooledDirectory::with_capacity(3, 4);
    let ids: Vec<LockId> = (1..=5).map(|i| LockId::from_raw(i * 16)).collect();

    for &id in &ids {
        dir.insert(id).unwrap();
    }
    let stats = dir.stats();
    assert_eq!(stats.live, 5);
    assert_eq!(stats.pooled_in_use, 3);
    assert_eq!(stats.dynamic_in_use, 2);
    assert_eq!(stats.free_nodes, 0);

    // Dynamic entries behave like pooled ones
    for &id in &ids {
        assert_eq!(dir.increment(id), Some(2));
        assert_eq!(dir.decrement_or_remove(id), Some(1));
    }
    assert_eq!(dir.node_origin(ids[3]), Some(NodeOrigin::Dynamic));
    assert_eq!(dir.node_origin(ids[0]), Some(NodeOrigin::Pool));

    for &id in &ids {
        assert_eq!(dir.decrement_or_remove(id), Some(0));
    }
    let stats = dir.stats();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.free_nodes, 3, "only pool nodes return to the free list");
    assert_eq!(stats.dynamic_allocations, 2);
    assert_eq!(stats.dynamic_releases, 2);
}

#[test]
fn test_thread_pooled_shield_handles_deep_nesting() {
    on_fresh_thread(|| {
        let locks: Vec<Tracked> = (0..40).map(|_| Tracked::new()).collect();

        for l in &locks {
            assert_eq!(pooled_acquire(l, false, lock, ()), AcquireStatus::AcquireNow);
        }
        let stats = ThreadPooled.stats();
        assert_eq!(stats.live, 40);
        assert!(stats.dynamic_in_use > 0);

        for l in locks.iter().rev() {
            assert_eq!(pooled_release(l, false, unlock, ()), ReleaseStatus::ReleaseNow);
        }
        assert_eq!(ThreadPooled.stats().live, 0);
        assert!(locks.iter().all(|l| !l.raw.is_locked()));
    });
}

#[test]
fn test_threads_do_not_share_records() {
    let raw = Arc::new(RawMutex::INIT);
    let shield = Shield::thread_bounded();

    let held = {
        let raw = Arc::clone(&raw);
        thread::spawn(move || {
            let status = shield.acquire(&*raw, Reentrancy::Strict, |m: &RawMutex| m.lock(), ());
            assert_eq!(status, AcquireStatus::AcquireNow);
            let visible = shield.holds(&*raw);
            let status =
                shield.release(&*raw, Reentrancy::Strict, |m: &RawMutex| unsafe { m.unlock() }, ());
            assert_eq!(status, ReleaseStatus::ReleaseNow);
            visible
        })
        .join()
        .unwrap()
    };
    assert!(held);

    // Never recorded on this thread
    assert!(!shield.holds(&*raw));
}

#[test]
fn test_mutual_exclusion_under_contention() {
    struct Shared {
        raw: RawMutex,
        counter: Cell<u64>,
    }
    // SAFETY: `counter` is only touched while `raw` is held
    unsafe impl Sync for Shared {}

    let shared = Arc::new(Shared {
        raw: RawMutex::INIT,
        counter: Cell::new(0),
    });
    let elided = Arc::new(AtomicU64::new(0));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&shared);
            let elided = Arc::clone(&elided);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    let outer = shielded_acquire(&shared.raw, true, |m: &RawMutex| m.lock(), ());
                    let inner = shielded_acquire(&shared.raw, true, |m: &RawMutex| m.lock(), ());
                    assert!(outer.forwarded());
                    if inner.elided() {
                        elided.fetch_add(1, Ordering::Relaxed);
                    }

                    shared.counter.set(shared.counter.get() + 1);

                    let release = |m: &RawMutex| unsafe { m.unlock() };
                    assert_eq!(shielded_release(&shared.raw, true, release, ()), ReleaseStatus::SkipRelease);
                    assert_eq!(shielded_release(&shared.raw, true, release, ()), ReleaseStatus::ReleaseNow);
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(shared.counter.get(), 8_000);
    assert_eq!(elided.load(Ordering::Relaxed), 8_000);
}

#[test]
fn test_two_argument_shape_forwards_extra() {
    on_fresh_thread(|| {
        let l = Tracked::new();
        let last_owner = Cell::new(0u32);

        let lock_as = |t: &Tracked, owner: u32| {
            lock(t);
            last_owner.set(owner);
        };
        let unlock_as = |t: &Tracked, owner: u32| {
            assert_eq!(last_owner.get(), owner);
            unlock(t);
        };

        assert_eq!(shielded_acquire(&l, Reentrancy::Reentrant, lock_as, (9u32,)), AcquireStatus::AcquireNow);
        assert_eq!(shielded_acquire(&l, Reentrancy::Reentrant, lock_as, (10u32,)), AcquireStatus::SkipAcquisition);
        assert_eq!(last_owner.get(), 9, "elided call must not run the primitive");

        assert_eq!(shielded_release(&l, Reentrancy::Reentrant, unlock_as, (9u32,)), ReleaseStatus::SkipRelease);
        assert_eq!(shielded_release(&l, Reentrancy::Reentrant, unlock_as, (9u32,)), ReleaseStatus::ReleaseNow);
        assert_eq!((l.locks.get(), l.unlocks.get()), (1, 1));
    });
}

#[test]
fn test_status_into_result() {
    on_fresh_thread(|| {
        let l = Tracked::new();
        let shield = Shield::thread_bounded();
        let id = LockId::of(&l);

        let first = shield.acquire(&l, false, lock, ());
        assert!(first.into_result(id, 4).is_ok());

        let err = shield.acquire(&l, false, lock, ()).into_result(id, 4).unwrap_err();
        assert_eq!(err, lock_shield::ShieldError::UnbalancedLock(id));

        let _ = shield.release(&l, false, unlock, ());
        let err = shield.release(&l, false, unlock, ()).into_result(id).unwrap_err();
        assert_eq!(err, lock_shield::ShieldError::UnbalancedUnlock(id));
    });
}

/// Reader/writer lock plus a count of read locks that reached it
struct TrackedRw {
    raw: RawRwLock,
    reads: Cell<u32>,
}

fn read_lock(t: &TrackedRw) {
    t.raw.lock_shared();
    t.reads.set(t.reads.get() + 1);
}

fn read_unlock(t: &TrackedRw) {
    unsafe { t.raw.unlock_shared() };
}

#[test]
fn test_nested_shared_reads_are_elided() {
    on_fresh_thread(|| {
        let rw = TrackedRw {
            raw: RawRwLock::INIT,
            reads: Cell::new(0),
        };
        let shield = Shield::thread_bounded();

        assert_eq!(shield.acquire(&rw, true, read_lock, ()), AcquireStatus::AcquireNow);
        assert_eq!(shield.acquire(&rw, true, read_lock, ()), AcquireStatus::SkipAcquisition);
        assert_eq!(shield.acquire(&rw, true, read_lock, ()), AcquireStatus::SkipAcquisition);
        assert_eq!(rw.reads.get(), 1);
        assert_eq!(shield.recursion_count(&rw), Some(3));

        // One real read lock is held, so writers stay out
        assert!(!rw.raw.try_lock_exclusive());

        assert_eq!(shield.release(&rw, true, read_unlock, ()), ReleaseStatus::SkipRelease);
        assert_eq!(shield.release(&rw, true, read_unlock, ()), ReleaseStatus::SkipRelease);
        assert!(!rw.raw.try_lock_exclusive());
        assert_eq!(shield.release(&rw, true, read_unlock, ()), ReleaseStatus::ReleaseNow);

        assert!(rw.raw.try_lock_exclusive());
        unsafe { rw.raw.unlock_exclusive() };
    });
}

#[test]
fn test_shielded_readers_share_the_lock() {
    let rw = Arc::new(RawRwLock::INIT);
    let both_reading = Arc::new(Barrier::new(2));

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let (rw, both_reading) = (Arc::clone(&rw), Arc::clone(&both_reading));
            thread::spawn(move || {
                let shield = Shield::thread_bounded();
                let lock_shared = |l: &RawRwLock| l.lock_shared();
                let unlock_shared = |l: &RawRwLock| unsafe { l.unlock_shared() };

                assert_eq!(shield.acquire(&*rw, true, lock_shared, ()), AcquireStatus::AcquireNow);
                assert_eq!(shield.acquire(&*rw, true, lock_shared, ()), AcquireStatus::SkipAcquisition);
                both_reading.wait();
                assert_eq!(shield.release(&*rw, true, unlock_shared, ()), ReleaseStatus::SkipRelease);
                assert_eq!(shield.release(&*rw, true, unlock_shared, ()), ReleaseStatus::ReleaseNow);
            })
        })
        .collect();
    for r in readers {
        r.join().unwrap();
    }

    assert!(!rw.is_locked());
}
