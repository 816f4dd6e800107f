/*!
 * Task Queue
 *
 * Priority queue shared by the multi-threaded backends. The heap and the
 * backend's own bookkeeping (`ext`) sit behind one mutex so thread start
 * decisions see a consistent view.
 *
 * Functions taking a `QueueGuard` must be called with the queue lock held;
 * they consume it, so the lock is released before anything blocking runs.
 */

use super::stats::AtomicWorkerPoolStats;
use super::task::{AsyncTask, TaskKey};
use parking_lot::{Mutex, MutexGuard};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(super) type QueueGuard<'q, E> = MutexGuard<'q, QueueState<E>>;

struct QueuedTask {
    // Snapshot; a queued task's key never changes
    key: TaskKey,
    task: Arc<AsyncTask>,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed: BinaryHeap is a max-heap, smallest key must pop first
        other.key.cmp(&self.key)
    }
}

pub(super) struct QueueState<E> {
    heap: BinaryHeap<QueuedTask>,
    pub ext: E,
}

impl<E> QueueState<E> {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the next task to pop is a sub-task
    pub fn next_is_sub_task(&self) -> bool {
        self.heap.peek().map_or(false, |queued| queued.key.len() > 1)
    }
}

pub(super) struct TaskQueue<E> {
    state: Mutex<QueueState<E>>,
    free_threads: AtomicUsize,
    stats: Arc<AtomicWorkerPoolStats>,
}

impl<E> TaskQueue<E> {
    pub fn new(ext: E, stats: Arc<AtomicWorkerPoolStats>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                ext,
            }),
            free_threads: AtomicUsize::new(0),
            stats,
        }
    }

    #[inline]
    pub fn lock(&self) -> QueueGuard<'_, E> {
        self.state.lock()
    }

    #[inline]
    pub fn stats(&self) -> &AtomicWorkerPoolStats {
        &self.stats
    }

    /// Queue `task`, then call `start_thread_locked` if free threads cannot
    /// cover the queue
    ///
    /// `start_thread_locked` creates or wakes a runner. It must count a newly
    /// created runner with `increment_free_threads(1)` before starting it.
    pub fn insert_task<F>(&self, task: Arc<AsyncTask>, start_thread_locked: F)
    where
        F: FnOnce(QueueGuard<'_, E>),
    {
        let key = task.key();
        let mut guard = self.lock();
        guard.heap.push(QueuedTask { key, task });
        self.start_thread_if_needed_locked(guard, start_thread_locked);
    }

    pub fn start_thread_if_needed_locked<'q, F>(&'q self, guard: QueueGuard<'q, E>, start_thread_locked: F)
    where
        F: FnOnce(QueueGuard<'q, E>),
    {
        if guard.len() > self.free_threads.load(Ordering::Relaxed) {
            start_thread_locked(guard);
        }
    }

    /// Run tasks until `ensure_next_locked` returns `None`
    ///
    /// `ensure_next_locked` decides whether a next task exists and may run;
    /// it may wait on a condvar with the guard. Returning the guard means
    /// the queue is non-empty and the caller pops from it.
    pub fn run_tasks<'q, F>(&'q self, mut ensure_next_locked: F)
    where
        F: FnMut(QueueGuard<'q, E>) -> Option<QueueGuard<'q, E>>,
    {
        loop {
            let task = {
                let guard = self.lock();
                // Busy running, waiting, or leaving
                self.decrement_free_threads(1);
                let Some(mut guard) = ensure_next_locked(guard) else {
                    return;
                };
                match guard.heap.pop() {
                    Some(queued) => queued.task,
                    None => {
                        debug_assert!(false, "ensure_next_locked returned an empty queue");
                        return;
                    }
                }
            };

            task.run();
            self.stats.inc_tasks_run();

            // Free before ready: a dependent posted by `mark_as_ready` can
            // then reuse this thread instead of starting another
            self.increment_free_threads(1);
            task.mark_as_ready();
        }
    }

    /// Run queued tasks on the calling thread until the queue is empty
    pub fn drain_inline_locked(&self, guard: QueueGuard<'_, E>) {
        self.increment_free_threads(1);
        drop(guard);
        self.run_tasks(|guard| (!guard.is_empty()).then_some(guard));
    }

    #[inline]
    pub fn increment_free_threads(&self, n: usize) {
        self.free_threads.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn decrement_free_threads(&self, n: usize) {
        let prev = self.free_threads.fetch_sub(n, Ordering::Relaxed);
        debug_assert!(prev >= n, "free thread count underflow");
    }

    #[cfg(test)]
    pub fn free_threads(&self) -> usize {
        self.free_threads.load(Ordering::Relaxed)
    }
}
