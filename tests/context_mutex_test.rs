/*!
 * Context Mutex Integration Tests
 *
 * Exclusion across merged and unmerged mutexes, deadlock freedom of
 * opposite-order merges, and reference counting of merged forests
 */

use gpu_runtime_sync::context::ContextMutexManager;
use gpu_runtime_sync::core::sync::{
    LockMode, RawCondvarMutex, RawFutexMutex, RawSpinMutex, SyncConfig,
};
use gpu_runtime_sync::ContextMutexId;
use lock_api::RawMutex;
use parking_lot::{Condvar, Mutex};
use pretty_assertions::assert_eq;
use rand::Rng;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;

const THREADS: usize = 16;
const ITERATIONS: u64 = 50_000;

fn manager<R: RawMutex + Send + Sync>(mode: LockMode) -> Arc<ContextMutexManager<R>> {
    Arc::new(ContextMutexManager::new(&SyncConfig {
        lock_mode: mode,
        ..SyncConfig::default()
    }))
}

/// Every thread gets a mutex from `get_mutex` and bumps a shared counter
/// under it with a non-atomic read-modify-write
fn run_counter_test<R, F>(manager: &Arc<ContextMutexManager<R>>, get_mutex: F) -> u64
where
    R: RawMutex + Send + Sync + 'static,
    F: Fn(&ContextMutexManager<R>) -> ContextMutexId + Send + Sync + 'static,
{
    let counter = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));
    let get_mutex = Arc::new(get_mutex);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let manager = manager.clone();
            let counter = counter.clone();
            let barrier = barrier.clone();
            let get_mutex = get_mutex.clone();
            thread::spawn(move || {
                let id = (*get_mutex)(&*manager);
                barrier.wait();
                for _ in 0..ITERATIONS {
                    let _lock = manager.scoped_lock(id);
                    let local = counter.load(Ordering::Relaxed);
                    counter.store(local + 1, Ordering::Relaxed);
                }
                id
            })
        })
        .collect();

    for handle in handles {
        let id = handle.join().unwrap();
        manager.release(id);
    }
    counter.load(Ordering::Relaxed)
}

#[test]
fn test_single_mutex_lock() {
    let manager = manager::<RawFutexMutex>(LockMode::Checked);
    let shared = manager.create();

    let count = run_counter_test(&manager, move |m| {
        m.add_ref(shared);
        shared
    });

    assert_eq!(count, THREADS as u64 * ITERATIONS);
    manager.release(shared);
    assert_eq!(manager.stats().live, 0);
}

fn run_merged_test<R: RawMutex + Send + Sync + 'static>() {
    let manager = manager::<R>(LockMode::Checked);
    let shared = manager.create();

    let count = run_counter_test(&manager, move |m| {
        let lock = m.scoped_lock(shared);
        let own = m.create();
        lock.merge(own);
        own
    });

    assert_eq!(count, THREADS as u64 * ITERATIONS);
    manager.release(shared);

    let stats = manager.stats();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.destroyed, THREADS as u64 + 1);
    assert_eq!(stats.merges, THREADS as u64);
}

#[test]
fn test_multiple_merged_mutex_lock() {
    run_merged_test::<RawFutexMutex>();
}

#[test]
fn test_multiple_merged_condvar_mutex_lock() {
    run_merged_test::<RawCondvarMutex>();
}

#[test]
fn test_multiple_unmerged_mutex_lock() {
    let manager = manager::<RawSpinMutex>(LockMode::Checked);
    let count = run_counter_test(&manager, |m| m.create());

    // Distinct mutexes do not exclude each other
    assert!(count <= THREADS as u64 * ITERATIONS);
    assert_eq!(manager.stats().roots_destroyed, THREADS as u64);
}

/// Busy work under a held context lock, a random few microseconds long
fn guarded_work(rng: &mut impl Rng) {
    let micros = rng.gen_range(0..=20);
    let end = std::time::Instant::now() + std::time::Duration::from_micros(micros);
    while std::time::Instant::now() < end {
        std::hint::spin_loop();
    }
}

#[test]
fn test_two_threads_cross_merge() {
    const PAIRS: usize = 1_000;

    let manager = manager::<RawFutexMutex>(LockMode::Checked);
    let pairs: Arc<Vec<[ContextMutexId; 2]>> =
        Arc::new((0..PAIRS).map(|_| [manager.create(), manager.create()]).collect());

    // Both threads lock their side, then merge towards the other side at
    // the same moment
    struct Gate {
        ready: usize,
        can_merge: [bool; 2],
    }
    let gate = Arc::new((
        Mutex::new(Gate {
            ready: 0,
            can_merge: [false; 2],
        }),
        Condvar::new(),
        Condvar::new(),
    ));

    let handles: Vec<_> = (0..2)
        .map(|side| {
            let manager = manager.clone();
            let pairs = pairs.clone();
            let gate = gate.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let (state, ready_cv, merge_cv) = &*gate;
                for pair in pairs.iter() {
                    let lock = manager.scoped_lock(pair[side]);
                    {
                        let mut state = state.lock();
                        state.ready += 1;
                        if state.ready == 2 {
                            ready_cv.notify_one();
                        }
                        while !state.can_merge[side] {
                            merge_cv.wait(&mut state);
                        }
                        state.can_merge[side] = false;
                    }
                    guarded_work(&mut rng);
                    lock.merge(pair[1 - side]);
                    guarded_work(&mut rng);
                }
            })
        })
        .collect();

    {
        let (state, ready_cv, merge_cv) = &*gate;
        let mut state = state.lock();
        for _ in 0..PAIRS {
            while state.ready != 2 {
                ready_cv.wait(&mut state);
            }
            state.ready = 0;
            assert_eq!(state.can_merge, [false, false]);
            state.can_merge = [true, true];
            merge_cv.notify_all();
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }

    for pair in pairs.iter() {
        assert_eq!(manager.root_of(pair[0]), manager.root_of(pair[1]));
    }
    for pair in pairs.iter() {
        manager.release(pair[0]);
        manager.release(pair[1]);
    }

    let stats = manager.stats();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.merges, PAIRS as u64);
    assert_eq!(stats.roots_destroyed, PAIRS as u64);
}

#[test]
fn test_merge_is_idempotent() {
    let manager = manager::<RawFutexMutex>(LockMode::Checked);
    let a = manager.create();
    let b = manager.create();

    {
        let lock = manager.scoped_lock(a);
        lock.merge(b);
        let root = manager.root_of(a);
        let refs = manager.ref_count(root);

        lock.merge(b);
        manager.merge(b, a);
        assert_eq!(manager.root_of(a), root);
        assert_eq!(manager.ref_count(root), refs);
    }
    assert_eq!(manager.stats().merges, 1);

    manager.release(a);
    manager.release(b);
}

#[test]
fn test_ref_count_round_trip() {
    const N: usize = 32;

    let manager = manager::<RawSpinMutex>(LockMode::Checked);
    let ids: Vec<_> = (0..N).map(|_| manager.create()).collect();

    // Merge pairwise first so old-root chains form
    for chunk in ids.chunks(2) {
        let _lock = manager.scoped_lock(chunk[0]);
        manager.merge(chunk[0], chunk[1]);
    }
    for window in ids.windows(2) {
        let _lock = manager.scoped_lock(window[0]);
        manager.merge(window[0], window[1]);
    }

    let root = manager.root_of(ids[0]);
    assert!(ids.iter().all(|&id| manager.root_of(id) == root));

    // Release in an order unrelated to the merge structure
    for id in ids.iter().rev().step_by(2).chain(ids.iter().step_by(2)) {
        manager.release(*id);
    }

    let stats = manager.stats();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.destroyed, N as u64);
    assert_eq!(stats.roots_destroyed, 1);
}

#[test]
fn test_recursive_levels_survive_merge() {
    let manager = manager::<RawFutexMutex>(LockMode::Recursive);
    let a = manager.create();
    let b = manager.create();

    manager.lock(a);
    manager.lock(a);
    manager.lock(b);
    manager.merge(a, b);

    // 2 on a's side + 1 on b's side
    assert_eq!(manager.lock_level(a), 3);
    assert_eq!(manager.lock_level(b), 3);

    manager.unlock(b);
    manager.unlock(a);
    assert_eq!(manager.lock_level(a), 1);

    let other = manager.clone();
    let busy = thread::spawn(move || other.try_lock(b)).join().unwrap();
    assert!(!busy);

    manager.unlock(a);
    assert_eq!(manager.lock_level(a), 0);

    let other = manager.clone();
    let acquired = thread::spawn(move || {
        let ok = other.try_lock(a);
        if ok {
            other.unlock(a);
        }
        ok
    })
    .join()
    .unwrap();
    assert!(acquired);

    manager.release(a);
    manager.release(b);
    assert_eq!(manager.stats().live, 0);
}

#[test]
fn test_merge_backs_off_while_other_is_held() {
    let manager = manager::<RawFutexMutex>(LockMode::Checked);
    let a = manager.create();
    let b = manager.create();
    let barrier = Arc::new(Barrier::new(2));

    let holder = {
        let manager = manager.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            let _lock = manager.scoped_lock(b);
            barrier.wait();
            thread::sleep(std::time::Duration::from_millis(20));
        })
    };

    barrier.wait();
    {
        let lock = manager.scoped_lock(a);
        lock.merge(b);
        assert_eq!(manager.root_of(a), manager.root_of(b));
    }
    holder.join().unwrap();

    assert!(manager.stats().merge_retries > 0);
    manager.release(a);
    manager.release(b);
}

#[test]
fn test_guard_drop_races_owner_release() {
    const PAIRS: usize = 8;
    const ROUNDS: usize = 2_000;

    let manager = manager::<RawFutexMutex>(LockMode::Checked);

    let handles: Vec<_> = (0..PAIRS)
        .map(|_| {
            let (id_tx, id_rx) = mpsc::channel::<ContextMutexId>();
            let guards_taken = Arc::new(AtomicUsize::new(0));

            let locker = {
                let manager = manager.clone();
                let guards_taken = guards_taken.clone();
                thread::spawn(move || {
                    for id in id_rx {
                        let guard = manager.lock_and_add_ref(id);
                        guards_taken.fetch_add(1, Ordering::SeqCst);
                        // Drop gives the reference back, then unlocks
                        drop(guard);
                    }
                })
            };

            let owner = {
                let manager = manager.clone();
                thread::spawn(move || {
                    for round in 1..=ROUNDS {
                        let id = manager.create();
                        id_tx.send(id).unwrap();
                        while guards_taken.load(Ordering::SeqCst) < round {
                            thread::yield_now();
                        }
                        // Release as soon as the guard's reference is gone,
                        // usually while the guard still holds the lock
                        while manager.ref_count(id) != 1 {
                            std::hint::spin_loop();
                        }
                        manager.release(id);
                    }
                })
            };

            (locker, owner)
        })
        .collect();

    for (locker, owner) in handles {
        owner.join().unwrap();
        locker.join().unwrap();
    }

    let stats = manager.stats();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.destroyed, (PAIRS * ROUNDS) as u64);
    assert_eq!(stats.roots_destroyed, (PAIRS * ROUNDS) as u64);
}
