/*!
 * Synchronization Primitives Integration Tests
 *
 * Mutual exclusion for every fast mutex variant under heavy contention
 */

use gpu_runtime_sync::core::sync::{
    GlobalMutex, LockMode, RawCondvarMutex, RawFutexMutex, RawSpinMutex,
    ScopedOptionalGlobalMutexLock,
};
use lock_api::RawMutex;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 16;
const ITERATIONS: usize = 50_000;

/// Counter whose increments are only safe under the lock
struct Unguarded(UnsafeCell<u64>);

unsafe impl Sync for Unguarded {}

/// Lock that never excludes anyone
struct RawNoopMutex;

unsafe impl RawMutex for RawNoopMutex {
    const INIT: Self = RawNoopMutex;
    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {}

    fn try_lock(&self) -> bool {
        true
    }

    unsafe fn unlock(&self) {}
}

/// Every thread bumps a shared counter under the lock with a non-atomic
/// read-modify-write, so lost updates show up as a short count
fn run_counter_test<R>() -> u64
where
    R: RawMutex + Send + Sync + 'static,
{
    let mutex = Arc::new(lock_api::Mutex::<R, ()>::new(()));
    let counter = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let mutex = mutex.clone();
            let counter = counter.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ITERATIONS {
                    let _guard = mutex.lock();
                    let local = counter.load(Ordering::Relaxed);
                    std::hint::spin_loop();
                    counter.store(local + 1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let _guard = mutex.lock();
    counter.load(Ordering::Relaxed)
}

#[test]
fn test_spin_mutex_exclusion() {
    assert_eq!(run_counter_test::<RawSpinMutex>(), (THREADS * ITERATIONS) as u64);
}

#[test]
fn test_condvar_mutex_exclusion() {
    assert_eq!(run_counter_test::<RawCondvarMutex>(), (THREADS * ITERATIONS) as u64);
}

#[test]
fn test_futex_mutex_exclusion() {
    assert_eq!(run_counter_test::<RawFutexMutex>(), (THREADS * ITERATIONS) as u64);
}

#[test]
fn test_parking_lot_baseline_exclusion() {
    assert_eq!(
        run_counter_test::<parking_lot::RawMutex>(),
        (THREADS * ITERATIONS) as u64
    );
}

#[test]
fn test_noop_mutex_loses_updates() {
    // The counter harness must be able to see a race at all
    assert!(run_counter_test::<RawNoopMutex>() < (THREADS * ITERATIONS) as u64);
}

#[test]
fn test_try_lock_contended_from_other_thread() {
    let mutex = Arc::new(gpu_runtime_sync::FutexMutex::new(7u32));
    let guard = mutex.lock();

    let other = mutex.clone();
    let got = thread::spawn(move || other.try_lock().map(|g| *g)).join().unwrap();
    assert_eq!(got, None);

    drop(guard);
    assert_eq!(mutex.try_lock().map(|g| *g), Some(7));
}

#[test]
fn test_global_mutex_modes_serialize() {
    for mode in [LockMode::Simple, LockMode::Checked, LockMode::Recursive] {
        let mutex: Arc<GlobalMutex> = Arc::new(GlobalMutex::new(mode));
        let counter = Arc::new(Unguarded(UnsafeCell::new(0)));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let mutex = mutex.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        let _lock = ScopedOptionalGlobalMutexLock::new(&mutex, true);
                        if mode == LockMode::Recursive && i == 0 {
                            // Re-entry must not deadlock
                            let _inner = mutex.scoped();
                        }
                        unsafe { *counter.0.get() += 1 };
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(unsafe { *counter.0.get() }, 40_000, "mode {:?}", mode);
        assert!(!mutex.is_locked());
    }
}
