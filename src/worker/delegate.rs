/*!
 * Delegate Backend
 *
 * Runs pool work on host threads through the platform [`TaskRunner`].
 * Each runner start posts one trampoline job. A trampoline runs the first
 * task it finds, then keeps going only while the next task is a sub-task,
 * so follow-up work stays on the same host thread. Anything else is left
 * for a new trampoline.
 */

use super::platform::PlatformMethods;
use super::queue::{QueueGuard, TaskQueue};
use super::stats::AtomicWorkerPoolStats;
use super::task::AsyncTask;
use std::sync::Arc;
use tracing::{trace, warn};

pub(super) struct DelegateShared {
    queue: TaskQueue<()>,
    platform: Arc<PlatformMethods>,
}

impl DelegateShared {
    pub fn new(platform: Arc<PlatformMethods>, stats: Arc<AtomicWorkerPoolStats>) -> Arc<Self> {
        Arc::new(Self {
            queue: TaskQueue::new((), stats),
            platform,
        })
    }

    #[inline]
    pub fn is_async(&self) -> bool {
        self.platform.has_task_runner()
    }

    pub fn post_async_task(self: &Arc<Self>, task: Arc<AsyncTask>) {
        self.queue
            .insert_task(task, |guard| self.start_thread_locked(guard));
    }

    fn start_thread_locked(self: &Arc<Self>, guard: QueueGuard<'_, ()>) {
        let Some(runner) = self.platform.task_runner() else {
            // Runner removed while in use; finish the work on this thread
            warn!("task runner unavailable, running worker tasks inline");
            self.queue.drain_inline_locked(guard);
            return;
        };

        self.queue.increment_free_threads(1);
        drop(guard);

        self.queue.stats().inc_trampolines_posted();
        let shared = Arc::clone(self);
        runner.post_worker_task(Box::new(move || shared.run_trampoline()));
    }

    fn run_trampoline(self: &Arc<Self>) {
        let mut first_run = true;
        self.queue.run_tasks(|guard| {
            if !guard.is_empty() && (first_run || guard.next_is_sub_task()) {
                first_run = false;
                return Some(guard);
            }
            // Posters may have skipped starting a runner counting on this
            // one; hand the rest of the queue to a fresh trampoline
            self.queue
                .start_thread_if_needed_locked(guard, |guard| self.start_thread_locked(guard));
            None
        });
        trace!("delegate trampoline finished");
    }
}

impl Drop for DelegateShared {
    fn drop(&mut self) {
        // Trampolines hold a reference; leftovers mean the host dropped jobs
        let pending = self.queue.lock().len();
        if pending > 0 {
            warn!(pending, "delegate pool dropped with queued tasks");
        }
    }
}
