/*!
 * Worker Thread Pool
 *
 * Task-graph scheduler front end. Three backends share one posting API:
 * - `SingleThreaded`: tasks run on the posting thread (or on the thread
 *   that makes the last dependency ready)
 * - `Async`: lazily spawned owned threads
 * - `Delegate`: jobs handed to the host task runner
 *
 * Dependencies are tracked actively: a task enters the queue only after
 * every dependency event is ready, so it never occupies a worker while
 * blocked.
 */

use super::async_pool::AsyncWorkerPool;
use super::delegate::DelegateShared;
use super::event::WaitableEvent;
use super::platform::PlatformMethods;
use super::stats::{AtomicWorkerPoolStats, WorkerPoolStats};
use super::task::{AsyncTask, TaskDependency, WorkerTask};
use smallvec::smallvec;
use std::sync::Arc;
use tracing::{debug, warn};

/// Backend picked by [`WorkerThreadPool::create`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    SingleThreaded,
    Async,
    Delegate,
}

enum Backend {
    SingleThreaded,
    Async(AsyncWorkerPool),
    Delegate(Arc<DelegateShared>),
}

pub struct WorkerThreadPool {
    backend: Backend,
    stats: Arc<AtomicWorkerPoolStats>,
}

impl WorkerThreadPool {
    /// Create a pool
    ///
    /// - `1`: single-threaded, tasks run inline
    /// - otherwise, with a task runner registered on `platform`: delegate
    /// - otherwise: owned threads, `0` meaning one per hardware thread
    pub fn create(num_threads: usize, platform: &Arc<PlatformMethods>) -> Arc<Self> {
        let stats = Arc::new(AtomicWorkerPoolStats::default());
        let multithreaded = num_threads != 1;

        let backend = if !multithreaded {
            Backend::SingleThreaded
        } else if platform.has_task_runner() {
            Backend::Delegate(DelegateShared::new(Arc::clone(platform), stats.clone()))
        } else {
            let threads = if num_threads == 0 {
                hardware_threads()
            } else {
                num_threads
            };
            Backend::Async(AsyncWorkerPool::new(threads, stats.clone()))
        };

        let pool = Self { backend, stats };
        debug!(kind = ?pool.kind(), max_threads = pool.max_threads(), "created worker pool");
        Arc::new(pool)
    }

    pub fn kind(&self) -> PoolKind {
        match self.backend {
            Backend::SingleThreaded => PoolKind::SingleThreaded,
            Backend::Async(_) => PoolKind::Async,
            Backend::Delegate(_) => PoolKind::Delegate,
        }
    }

    /// Whether tasks may run concurrently with the poster
    pub fn is_async(&self) -> bool {
        match &self.backend {
            Backend::SingleThreaded => false,
            Backend::Async(_) => true,
            Backend::Delegate(delegate) => delegate.is_async(),
        }
    }

    /// Thread limit of the owned-thread backend, 1 for single-threaded,
    /// 0 when the host decides
    pub fn max_threads(&self) -> usize {
        match &self.backend {
            Backend::SingleThreaded => 1,
            Backend::Async(pool) => pool.max_threads(),
            Backend::Delegate(_) => 0,
        }
    }

    /// Owned threads spawned so far
    pub fn thread_count(&self) -> usize {
        match &self.backend {
            Backend::Async(pool) => pool.thread_count(),
            _ => 0,
        }
    }

    pub fn stats(&self) -> WorkerPoolStats {
        self.stats.snapshot()
    }

    /// Post `task`, to run once every dependency event is ready
    ///
    /// The returned event becomes ready after all dependencies are ready and
    /// the task has finished; the task callable is dropped before that.
    /// Thread-safe, and callable from inside a running task.
    pub fn post_worker_task(
        self: &Arc<Self>,
        task: Arc<dyn WorkerTask>,
        dependencies: &[TaskDependency<'_>],
    ) -> Arc<WaitableEvent> {
        if dependencies.is_empty() {
            if matches!(self.backend, Backend::SingleThreaded) {
                return self.run_inline(task);
            }
            let async_task = AsyncTask::new(task);
            let event = Arc::clone(async_task.event());
            self.post_async_task(async_task);
            return event;
        }

        let async_task = AsyncTask::with_dependencies(task, Arc::clone(self), dependencies.len());
        let event = Arc::clone(async_task.event());
        // The last ready dependency posts the task
        for dependency in dependencies {
            dependency
                .event
                .add_dependent_task(Arc::clone(&async_task), dependency.hint);
        }
        event
    }

    /// Same as [`post_worker_task`](Self::post_worker_task) for a plain closure
    pub fn post<F>(self: &Arc<Self>, task: F, dependencies: &[TaskDependency<'_>]) -> Arc<WaitableEvent>
    where
        F: Fn(&WaitableEvent) + Send + Sync + 'static,
    {
        self.post_worker_task(Arc::new(task), dependencies)
    }

    pub(crate) fn post_async_task(&self, task: Arc<AsyncTask>) {
        match &self.backend {
            Backend::SingleThreaded => {
                task.run();
                self.stats.inc_tasks_run();
                task.mark_as_ready();
            }
            Backend::Async(pool) => pool.post_async_task(task),
            Backend::Delegate(delegate) => delegate.post_async_task(task),
        }
    }

    fn run_inline(&self, task: Arc<dyn WorkerTask>) -> Arc<WaitableEvent> {
        let event = Arc::new(WaitableEvent::for_task());
        task.run(&event);
        drop(task);
        self.stats.inc_tasks_run();
        event.mark_as_ready(smallvec![event.serial()]);
        event
    }
}

impl std::fmt::Debug for WorkerThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThreadPool")
            .field("kind", &self.kind())
            .field("max_threads", &self.max_threads())
            .finish()
    }
}

/// Hardware thread count, 8 if it cannot be detected
fn hardware_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or_else(|err| {
            warn!(error = %err, "failed to detect CPU count, defaulting to 8");
            8
        })
}
