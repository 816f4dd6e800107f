/*!
 * Owned-Thread Backend
 *
 * Worker threads are spawned lazily, up to the desired count, and park on a
 * condvar when the queue is empty. Posting wakes an idle thread before it
 * considers spawning a new one.
 *
 * `waiting` counts threads blocked on the condvar and `notified` those of
 * them already woken for a task. A notified thread is counted as free, so
 * the queue does not start another runner for the same task. Wakeups that
 * find `notified == 0` are spurious and go back to sleep.
 */

use super::queue::{QueueGuard, TaskQueue};
use super::stats::AtomicWorkerPoolStats;
use super::task::AsyncTask;
use crate::core::errors::SyncError;
use parking_lot::Condvar;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

pub(super) const WORKER_THREAD_NAME: &str = "gpu-worker";

/// Dependents that a finished task makes ready can run nested on the
/// worker's stack (single-threaded pools run them inline)
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Default)]
pub(super) struct AsyncState {
    terminated: bool,
    threads: Vec<JoinHandle<()>>,
    waiting: usize,
    notified: usize,
}

pub(super) struct AsyncShared {
    queue: TaskQueue<AsyncState>,
    condvar: Condvar,
    desired_threads: usize,
}

impl AsyncShared {
    pub fn post_async_task(self: &Arc<Self>, task: Arc<AsyncTask>) {
        self.queue.insert_task(task, |mut guard| {
            // Prefer waking an idle thread
            if guard.ext.waiting > guard.ext.notified {
                self.increment_notified_locked(&mut guard, 1);
                drop(guard);
                self.condvar.notify_one();
                return;
            }

            if guard.ext.terminated {
                // Shutting down: no new threads, run it here
                self.queue.drain_inline_locked(guard);
                return;
            }

            if guard.ext.threads.len() < self.desired_threads {
                self.spawn_thread_locked(guard);
            }
            // Otherwise every thread is busy and one will get to it
        });
    }

    fn spawn_thread_locked(self: &Arc<Self>, mut guard: QueueGuard<'_, AsyncState>) {
        // Counted free before it exists; `run_tasks` takes it back
        self.queue.increment_free_threads(1);

        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || shared.thread_loop());

        match spawned {
            Ok(handle) => {
                guard.ext.threads.push(handle);
                self.queue.stats().inc_threads_spawned();
                debug!(
                    threads = guard.ext.threads.len(),
                    max = self.desired_threads,
                    "spawned worker thread"
                );
            }
            Err(err) => {
                self.queue.decrement_free_threads(1);
                let err = SyncError::from(err);
                error!(error = %err, "worker thread spawn failed");
                if guard.ext.threads.is_empty() {
                    self.queue.drain_inline_locked(guard);
                }
            }
        }
    }

    fn thread_loop(&self) {
        self.queue.run_tasks(|mut guard| {
            let mut is_waiting = false;
            loop {
                let condition_met = !guard.is_empty() || guard.ext.terminated;
                if !is_waiting {
                    if condition_met {
                        break;
                    }
                    guard.ext.waiting += 1;
                    is_waiting = true;
                } else if guard.ext.notified > 0 {
                    self.decrement_notified_locked(&mut guard, 1);
                    if condition_met {
                        debug_assert!(guard.ext.waiting > 0);
                        guard.ext.waiting -= 1;
                        break;
                    }
                }
                // notified == 0: spurious wakeup, keep waiting
                self.condvar.wait(&mut guard);
            }
            // Terminated threads still drain what is queued
            (!guard.is_empty()).then_some(guard)
        });
        trace!("worker thread exiting");
    }

    fn increment_notified_locked(&self, guard: &mut QueueGuard<'_, AsyncState>, n: usize) {
        debug_assert!(guard.ext.notified + n <= guard.ext.waiting);
        // A notified thread is about to pick up work; count it free now
        self.queue.increment_free_threads(n);
        guard.ext.notified += n;
    }

    fn decrement_notified_locked(&self, guard: &mut QueueGuard<'_, AsyncState>, n: usize) {
        debug_assert!(guard.ext.notified >= n);
        self.queue.decrement_free_threads(n);
        guard.ext.notified -= n;
    }
}

/// Owning handle; dropping it terminates and joins the threads
pub(super) struct AsyncWorkerPool {
    shared: Arc<AsyncShared>,
}

impl AsyncWorkerPool {
    pub fn new(num_threads: usize, stats: Arc<AtomicWorkerPoolStats>) -> Self {
        debug_assert!(num_threads > 0);
        Self {
            shared: Arc::new(AsyncShared {
                queue: TaskQueue::new(AsyncState::default(), stats),
                condvar: Condvar::new(),
                desired_threads: num_threads,
            }),
        }
    }

    #[inline]
    pub fn post_async_task(&self, task: Arc<AsyncTask>) {
        self.shared.post_async_task(task);
    }

    pub fn max_threads(&self) -> usize {
        self.shared.desired_threads
    }

    pub fn thread_count(&self) -> usize {
        self.shared.queue.lock().ext.threads.len()
    }
}

impl Drop for AsyncWorkerPool {
    fn drop(&mut self) {
        let threads = {
            let mut guard = self.shared.queue.lock();
            debug_assert!(guard.ext.waiting >= guard.ext.notified);
            let sleeping = guard.ext.waiting - guard.ext.notified;
            self.shared.increment_notified_locked(&mut guard, sleeping);
            guard.ext.terminated = true;
            std::mem::take(&mut guard.ext.threads)
        };
        self.shared.condvar.notify_all();

        let current = thread::current().id();
        let count = threads.len();
        for handle in threads {
            // Last pool reference dropped by one of its own tasks; that
            // thread finishes draining and exits detached
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
        debug!(threads = count, "async worker pool terminated");
    }
}
