/*!
 * Run Driver
 * Worker threads, start gate, timed phase and aggregation
 */

use super::{BenchConfig, BenchReport, DriverError, LockMode, Workload};
use crate::core::limits::HIERARCHY_INNER_WORK;
use crate::core::{LockId, ShieldResult};
use crate::monitoring::span_run;
use crate::shield::{DirectoryScope, Reentrancy, Shield, StrategyType};
use parking_lot::lock_api::{RawMutex as _, RawRwLock as _, RawRwLockRecursive as _};
use parking_lot::{RawMutex, RawRwLock, ReentrantMutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Locks shared by every worker of one run
struct LockSet {
    flat: RawMutex,
    rw: RawRwLock,
    reentrant: ReentrantMutex<()>,
    hierarchy: Vec<Box<[RawMutex]>>,
}

impl LockSet {
    fn new(workload: &Workload) -> Self {
        let hierarchy = match *workload {
            Workload::Hierarchical {
                levels,
                locks_per_level,
                ..
            } => (0..levels)
                .map(|_| (0..locks_per_level).map(|_| RawMutex::INIT).collect())
                .collect(),
            Workload::Flat | Workload::Nested { .. } => Vec::new(),
        };

        Self {
            flat: RawMutex::INIT,
            rw: RawRwLock::INIT,
            reentrant: ReentrantMutex::new(()),
            hierarchy,
        }
    }
}

const GATE_WAITING: u8 = 0;
const GATE_OPEN: u8 = 1;
const GATE_ABORTED: u8 = 2;

/// Spin gate releasing every warmed-up worker at once
struct StartGate {
    ready: AtomicUsize,
    state: AtomicU8,
}

impl StartGate {
    fn new() -> Self {
        Self {
            ready: AtomicUsize::new(0),
            state: AtomicU8::new(GATE_WAITING),
        }
    }

    /// Returns false if the run was aborted before the gate opened
    fn arrive_and_wait(&self) -> bool {
        self.ready.fetch_add(1, Ordering::AcqRel);
        loop {
            match self.state.load(Ordering::Acquire) {
                GATE_WAITING => thread::yield_now(),
                GATE_OPEN => return true,
                _ => return false,
            }
        }
    }

    /// Wait until `expected` workers arrived, aborting if one exits first
    fn wait_ready<T>(&self, expected: usize, workers: &[ScopedJoinHandle<'_, T>]) {
        while self.ready.load(Ordering::Acquire) < expected {
            if workers.iter().any(|w| w.is_finished()) {
                self.abort();
                return;
            }
            thread::yield_now();
        }
    }

    fn open(&self) {
        self.state.store(GATE_OPEN, Ordering::Release);
    }

    fn abort(&self) {
        self.state.store(GATE_ABORTED, Ordering::Release);
    }
}

/// Execute one run and aggregate its throughput
pub fn run(config: &BenchConfig) -> Result<BenchReport, DriverError> {
    config.validate()?;
    let strategy = config.directory_strategy();

    let span = span_run(config.workload.name(), config.threads);
    let _entered = span.enter();
    info!(
        threads = config.threads,
        mode = %config.mode,
        workload = config.workload.name(),
        ?strategy,
        iterations = config.iterations,
        warmup = config.warmup_iterations,
        "starting run"
    );

    let locks = LockSet::new(&config.workload);
    let gate = StartGate::new();

    let (elapsed, total_operations) = thread::scope(|s| {
        let mut workers = Vec::with_capacity(config.threads);
        for index in 0..config.threads {
            let (locks, gate) = (&locks, &gate);
            let spawned = thread::Builder::new()
                .name(format!("shield-worker-{index}"))
                .spawn_scoped(s, move || worker(index, config, locks, gate));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    gate.abort();
                    return Err(DriverError::Spawn {
                        thread: index,
                        source,
                    });
                }
            }
        }

        gate.wait_ready(config.threads, &workers);
        let start = Instant::now();
        gate.open();

        let mut total = 0u64;
        let mut failure = None;
        for (thread, handle) in workers.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(ops)) => total += ops,
                Ok(Err(e)) => {
                    failure.get_or_insert(DriverError::Shield(e));
                }
                Err(_) => {
                    failure.get_or_insert(DriverError::WorkerPanicked { thread });
                }
            }
        }
        let elapsed = start.elapsed();

        match failure {
            Some(err) => Err(err),
            None => Ok((elapsed, total)),
        }
    })?;

    let duration_secs = elapsed.as_secs_f64();
    let ops_per_sec = if duration_secs > 0.0 {
        total_operations as f64 / duration_secs
    } else {
        0.0
    };
    span.record_operations(total_operations);
    info!(total_operations, duration_secs, ops_per_sec, "run finished");

    Ok(BenchReport {
        threads: config.threads,
        mode: config.mode,
        workload: config.workload,
        strategy,
        duration_secs,
        total_operations,
        ops_per_sec,
    })
}

fn worker(index: usize, config: &BenchConfig, locks: &LockSet, gate: &StartGate) -> ShieldResult<u64> {
    if config.pin_threads {
        pin_current_thread(index);
    }

    match config.directory_strategy() {
        StrategyType::Pooled => phases(&Shield::thread_pooled(), index, config, locks, gate),
        StrategyType::Bounded | StrategyType::Auto => {
            phases(&Shield::thread_bounded(), index, config, locks, gate)
        }
    }
}

/// Warmup, start gate, then the timed share of `index`
fn phases<S: DirectoryScope>(
    shield: &Shield<S>,
    index: usize,
    config: &BenchConfig,
    locks: &LockSet,
    gate: &StartGate,
) -> ShieldResult<u64> {
    let mut rng = StdRng::seed_from_u64(config.seed ^ (index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    let warmup = run_operations(shield, config, locks, &mut rng, config.warmup_iterations);
    let started = gate.arrive_and_wait();
    warmup?;
    if !started {
        return Ok(0);
    }

    run_operations(shield, config, locks, &mut rng, config.iterations_for(index))
}

fn run_operations<S: DirectoryScope>(
    shield: &Shield<S>,
    config: &BenchConfig,
    locks: &LockSet,
    rng: &mut StdRng,
    count: u64,
) -> ShieldResult<u64> {
    let mode = reentrancy(config.mode);
    let work = config.work_amount;

    match (config.workload, config.mode) {
        (Workload::Flat, LockMode::Raw) => {
            for _ in 0..count {
                raw_cycle(&locks.flat);
                busy_work(work);
            }
        }
        (Workload::Flat, LockMode::RawShared) => {
            for _ in 0..count {
                raw_cycle(&locks.rw);
                busy_work(work);
            }
        }
        (Workload::Flat, LockMode::ShieldedShared) => {
            for _ in 0..count {
                shielded_enter(shield, &locks.rw, mode)?;
                shielded_exit(shield, &locks.rw, mode)?;
                busy_work(work);
            }
        }
        (Workload::Flat, LockMode::ShieldedStrict | LockMode::ShieldedReentrant) => {
            for _ in 0..count {
                shielded_enter(shield, &locks.flat, mode)?;
                shielded_exit(shield, &locks.flat, mode)?;
                busy_work(work);
            }
        }
        (Workload::Nested { depth }, LockMode::Raw) => {
            for _ in 0..count {
                nest_raw(&locks.reentrant, depth);
                busy_work(work);
            }
        }
        (Workload::Nested { depth }, LockMode::RawShared) => {
            for _ in 0..count {
                nest_raw_shared(&locks.rw, depth);
                busy_work(work);
            }
        }
        (Workload::Nested { depth }, LockMode::ShieldedShared) => {
            for _ in 0..count {
                nest_shielded(shield, &locks.rw, mode, depth)?;
                busy_work(work);
            }
        }
        (Workload::Nested { depth }, LockMode::ShieldedStrict | LockMode::ShieldedReentrant) => {
            for _ in 0..count {
                nest_shielded(shield, &locks.flat, mode, depth)?;
                busy_work(work);
            }
        }
        (Workload::Hierarchical { levels, depth, .. }, lock_mode) => {
            let raw = lock_mode == LockMode::Raw;
            let mut held: Vec<&RawMutex> = Vec::with_capacity(depth);
            for _ in 0..count {
                let start = rng.gen_range(0..=levels - depth);
                for level in &locks.hierarchy[start..start + depth] {
                    let lock = &level[rng.gen_range(0..level.len())];
                    if raw {
                        lock.enter();
                    } else if let Err(e) = shielded_enter(shield, lock, mode) {
                        // Leave nothing held for the other workers to block on
                        while let Some(lock) = held.pop() {
                            shielded_exit(shield, lock, mode)?;
                        }
                        return Err(e);
                    }
                    held.push(lock);
                }

                while let Some(lock) = held.pop() {
                    busy_work(HIERARCHY_INNER_WORK);
                    if raw {
                        // SAFETY: pushed to `held` only after this thread locked it
                        unsafe { lock.leave() };
                    } else {
                        shielded_exit(shield, lock, mode)?;
                    }
                }
                busy_work(work);
            }
        }
    }

    Ok(count)
}

fn reentrancy(mode: LockMode) -> Reentrancy {
    match mode {
        LockMode::ShieldedStrict => Reentrancy::Strict,
        LockMode::Raw
        | LockMode::ShieldedReentrant
        | LockMode::RawShared
        | LockMode::ShieldedShared => Reentrancy::Reentrant,
    }
}

/// One side of a raw lock as the driver takes it
trait DriverLock {
    fn enter(&self);

    /// # Safety
    ///
    /// The calling thread must hold the lock through `enter`.
    unsafe fn leave(&self);
}

impl DriverLock for RawMutex {
    #[inline(always)]
    fn enter(&self) {
        self.lock();
    }

    #[inline(always)]
    unsafe fn leave(&self) {
        self.unlock();
    }
}

/// The driver only ever read-locks its reader/writer lock
impl DriverLock for RawRwLock {
    #[inline(always)]
    fn enter(&self) {
        self.lock_shared();
    }

    #[inline(always)]
    unsafe fn leave(&self) {
        self.unlock_shared();
    }
}

#[inline]
fn raw_cycle<L: DriverLock>(lock: &L) {
    lock.enter();
    // SAFETY: entered on the line above by this thread
    unsafe { lock.leave() };
}

#[inline]
fn shielded_enter<S: DirectoryScope, L: DriverLock>(
    shield: &Shield<S>,
    lock: &L,
    mode: Reentrancy,
) -> ShieldResult<()> {
    let status = shield.acquire(lock, mode, |l: &L| l.enter(), ());
    if status.is_held() {
        return Ok(());
    }
    status
        .into_result(LockId::of(lock), shield.capacity().unwrap_or(0))
        .map(drop)
}

#[inline]
fn shielded_exit<S: DirectoryScope, L: DriverLock>(
    shield: &Shield<S>,
    lock: &L,
    mode: Reentrancy,
) -> ShieldResult<()> {
    shield
        // SAFETY: the release only forwards while this thread's record exists,
        // and records exist only for locks this thread entered
        .release(lock, mode, |l: &L| unsafe { l.leave() }, ())
        .into_result(LockId::of(lock))
        .map(drop)
}

fn nest_raw(lock: &ReentrantMutex<()>, depth: usize) {
    let _guard = lock.lock();
    if depth > 1 {
        nest_raw(lock, depth - 1);
    }
}

/// Recursive reads on the raw lock, each one reaching the primitive
fn nest_raw_shared(lock: &RawRwLock, depth: usize) {
    for _ in 0..depth {
        lock.lock_shared_recursive();
    }
    for _ in 0..depth {
        // SAFETY: read-locked `depth` times above by this thread
        unsafe { lock.unlock_shared() };
    }
}

fn nest_shielded<S: DirectoryScope, L: DriverLock>(
    shield: &Shield<S>,
    lock: &L,
    mode: Reentrancy,
    depth: usize,
) -> ShieldResult<()> {
    shielded_enter(shield, lock, mode)?;
    let inner = if depth > 1 {
        nest_shielded(shield, lock, mode, depth - 1)
    } else {
        Ok(())
    };
    shielded_exit(shield, lock, mode)?;
    inner
}

#[inline(never)]
fn busy_work(amount: u32) {
    let mut acc = 0u32;
    for i in 0..amount {
        acc = black_box(acc.wrapping_add(i));
    }
    black_box(acc);
}

#[cfg(target_os = "linux")]
fn pin_current_thread(index: usize) {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let cpus = thread::available_parallelism().map_or(1, |n| n.get());
    let cpu = index % cpus;
    let mut set = CpuSet::new();
    match set
        .set(cpu)
        .and_then(|()| sched_setaffinity(Pid::from_raw(0), &set))
    {
        Ok(()) => debug!(worker = index, cpu, "pinned worker"),
        Err(e) => warn!(worker = index, cpu, error = %e, "failed to pin worker"),
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_current_thread(index: usize) {
    debug!(worker = index, "thread pinning unsupported on this platform");
}
