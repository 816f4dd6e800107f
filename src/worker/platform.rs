/*!
 * Platform Hooks
 *
 * Host integration point for running pool work on threads the embedder
 * owns (a browser's task scheduler, for example).
 */

use parking_lot::RwLock;
use std::sync::Arc;

/// Job handed to the host; runs once on some host thread
pub type HostJob = Box<dyn FnOnce() + Send + 'static>;

/// Host thread pool accepting worker jobs
///
/// Implementations must be callable from any thread, including from inside
/// a job they are running.
pub trait TaskRunner: Send + Sync {
    fn post_worker_task(&self, job: HostJob);
}

/// Host callbacks available to the runtime
///
/// The task runner may be swapped or removed at any time; pools look it up
/// on every use.
#[derive(Default)]
pub struct PlatformMethods {
    task_runner: RwLock<Option<Arc<dyn TaskRunner>>>,
}

impl PlatformMethods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_runner(runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            task_runner: RwLock::new(Some(runner)),
        }
    }

    pub fn set_task_runner(&self, runner: Arc<dyn TaskRunner>) {
        *self.task_runner.write() = Some(runner);
    }

    /// Remove the runner, returning the previous one
    pub fn clear_task_runner(&self) -> Option<Arc<dyn TaskRunner>> {
        self.task_runner.write().take()
    }

    pub fn task_runner(&self) -> Option<Arc<dyn TaskRunner>> {
        self.task_runner.read().clone()
    }

    #[inline]
    pub fn has_task_runner(&self) -> bool {
        self.task_runner.read().is_some()
    }
}

impl std::fmt::Debug for PlatformMethods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformMethods")
            .field("task_runner", &self.has_task_runner())
            .finish()
    }
}
