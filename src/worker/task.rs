/*!
 * Worker Tasks
 *
 * Task callables, dependency hints and the scheduling key that orders the
 * pool queue.
 *
 * # Keys
 *
 * A key is a short vector of event serials compared lexicographically; the
 * smallest key runs first.
 * - `Normal`: `[own serial]`, i.e. post order
 * - `SubTask`: `dependency key + [own serial]`, so it sorts right after
 *   the dependency and ahead of anything posted later
 * - `Deferred`: `[fresh serial]` taken when the last dependency became
 *   ready, so it sorts after everything already queued
 *
 * A key longer than one element marks a sub-task.
 */

use super::event::{next_event_serial, WaitableEvent};
use super::pool::WorkerThreadPool;
use parking_lot::Mutex;
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

/// Longest key; a `SubTask` of a task at this depth is treated as `Normal`
pub const MAX_TASK_KEY_LEN: usize = 8;

pub type TaskKey = SmallVec<[u64; MAX_TASK_KEY_LEN]>;

/// Work submitted to a [`WorkerThreadPool`]
///
/// `event` is the task's own completion event. Posting a follow-up with a
/// `SubTask` dependency on it from inside the task runs the follow-up right
/// after this task, often on the same thread.
pub trait WorkerTask: Send + Sync {
    fn run(&self, event: &WaitableEvent);
}

impl<F> WorkerTask for F
where
    F: Fn(&WaitableEvent) + Send + Sync,
{
    fn run(&self, event: &WaitableEvent) {
        self(event)
    }
}

/// How a dependent task is ordered once its dependencies are ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskDependencyHint {
    /// Run right after the dependency, regardless of post time
    SubTask,
    /// Run in post order; ignored if any `SubTask` dependency applies
    Normal,
    /// Run after everything queued when the last dependency became ready;
    /// ignored if any `SubTask` or `Normal` dependency applies
    Deferred,
}

#[derive(Debug, Clone, Copy)]
pub struct TaskDependency<'a> {
    pub event: &'a WaitableEvent,
    pub hint: TaskDependencyHint,
}

impl<'a> TaskDependency<'a> {
    pub fn new(event: &'a WaitableEvent, hint: TaskDependencyHint) -> Self {
        Self { event, hint }
    }

    pub fn sub_task(event: &'a WaitableEvent) -> Self {
        Self::new(event, TaskDependencyHint::SubTask)
    }

    pub fn normal(event: &'a WaitableEvent) -> Self {
        Self::new(event, TaskDependencyHint::Normal)
    }

    pub fn deferred(event: &'a WaitableEvent) -> Self {
        Self::new(event, TaskDependencyHint::Deferred)
    }
}

/// Inline storage for the common case of a few dependencies
pub type TaskDependencies<'a> = SmallVec<[TaskDependency<'a>; 4]>;

struct TaskState {
    key: TaskKey,
    dependency_count: usize,
    // Held only until the task is handed to the pool
    pool: Option<Arc<WorkerThreadPool>>,
}

/// Scheduled task plus its completion event
pub(crate) struct AsyncTask {
    event: Arc<WaitableEvent>,
    state: Mutex<TaskState>,
    work: Mutex<Option<Arc<dyn WorkerTask>>>,
}

impl AsyncTask {
    /// Task with no dependencies, ready to queue
    pub fn new(work: Arc<dyn WorkerTask>) -> Arc<Self> {
        let event = Arc::new(WaitableEvent::for_task());
        let key = smallvec![event.serial()];
        Arc::new(Self {
            event,
            state: Mutex::new(TaskState {
                key,
                dependency_count: 0,
                pool: None,
            }),
            work: Mutex::new(Some(work)),
        })
    }

    /// Task posted to `pool` once `dependency_count` notifications arrived
    pub fn with_dependencies(
        work: Arc<dyn WorkerTask>,
        pool: Arc<WorkerThreadPool>,
        dependency_count: usize,
    ) -> Arc<Self> {
        debug_assert!(dependency_count > 0);
        Arc::new(Self {
            event: Arc::new(WaitableEvent::for_task()),
            state: Mutex::new(TaskState {
                key: TaskKey::new(),
                dependency_count,
                pool: Some(pool),
            }),
            work: Mutex::new(Some(work)),
        })
    }

    #[inline]
    pub fn event(&self) -> &Arc<WaitableEvent> {
        &self.event
    }

    pub fn key(&self) -> TaskKey {
        let state = self.state.lock();
        debug_assert!(!state.key.is_empty());
        state.key.clone()
    }

    /// Fold one ready dependency into the key; post once all are in
    pub fn handle_dependency_ready(self: &Arc<Self>, key: &TaskKey, hint: TaskDependencyHint) {
        debug_assert!(!key.is_empty());
        let serial = self.event.serial();

        let pool = {
            let mut state = self.state.lock();
            debug_assert!(state.dependency_count > 0);
            state.dependency_count -= 1;
            let all_ready = state.dependency_count == 0;

            if hint == TaskDependencyHint::SubTask && key.len() < MAX_TASK_KEY_LEN {
                let mut candidate = key.clone();
                candidate.push(serial);
                if state.key.is_empty() || candidate < state.key {
                    state.key = candidate;
                }
            } else if state.key.is_empty() {
                if hint != TaskDependencyHint::Deferred {
                    state.key.push(serial);
                } else if all_ready {
                    state.key.push(next_event_serial());
                }
            }

            if all_ready {
                state.pool.take()
            } else {
                None
            }
        };

        // Only the last notifier gets here; post unlocked since it may run inline
        if let Some(pool) = pool {
            pool.post_async_task(Arc::clone(self));
        }
    }

    /// Run the callable, then release it before the event becomes ready
    pub fn run(&self) {
        let work = self.work.lock().take();
        debug_assert!(work.is_some(), "task {} ran twice", self.event.serial());
        if let Some(work) = work {
            work.run(&self.event);
        }
    }

    pub fn mark_as_ready(&self) {
        debug_assert!(self.work.lock().is_none());
        self.event.mark_as_ready(self.key());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn noop() -> Arc<dyn WorkerTask> {
        Arc::new(|_: &WaitableEvent| {})
    }

    #[test]
    fn test_independent_task_key_is_own_serial() {
        let task = AsyncTask::new(noop());
        assert_eq!(task.key().as_slice(), &[task.event().serial()]);
    }

    #[test]
    fn test_callable_released_before_ready() {
        let marker = Arc::new(());
        let held = marker.clone();
        let task = AsyncTask::new(Arc::new(move |_: &WaitableEvent| {
            let _keep = &held;
        }));

        assert_eq!(Arc::strong_count(&marker), 2);
        task.run();
        assert_eq!(Arc::strong_count(&marker), 1);
        assert!(!task.event().is_ready());
        task.mark_as_ready();
        assert!(task.event().is_ready());
    }

    proptest! {
        #[test]
        fn prop_sub_task_key_sorts_between_parent_and_later_tasks(
            parent in proptest::collection::vec(1u64..1_000, 1..MAX_TASK_KEY_LEN),
            own in 1_000u64..2_000,
        ) {
            let parent: TaskKey = parent.into_iter().collect();
            let mut child = parent.clone();
            child.push(own);

            let later: TaskKey = smallvec![parent[0] + 1];
            prop_assert!(parent < child);
            prop_assert!(child < later);
        }
    }
}
