/*!
 * Waitable Events
 *
 * Completion signal for one unit of work. Readiness is one-way: once set it
 * stays set. Tasks waiting on an event as a dependency register themselves
 * and are notified, outside the event lock, when it becomes ready.
 */

use super::task::{AsyncTask, TaskDependencyHint, TaskKey};
use parking_lot::{Condvar, Mutex};
use smallvec::smallvec;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

static EVENT_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Next process-wide event serial (starts at 1, strictly increasing)
#[inline]
pub(crate) fn next_event_serial() -> u64 {
    EVENT_SERIAL.fetch_add(1, Ordering::Relaxed) + 1
}

struct DependentTask {
    task: Arc<AsyncTask>,
    hint: TaskDependencyHint,
}

#[derive(Default)]
struct EventState {
    dependents: Vec<DependentTask>,
    // Final scheduling key, set together with the ready flag
    key: TaskKey,
}

/// One-shot completion event
pub struct WaitableEvent {
    serial: u64,
    ready: AtomicBool,
    state: Mutex<EventState>,
    condvar: Condvar,
    // Completed only by the pool through `mark_as_ready`
    task_owned: bool,
}

impl WaitableEvent {
    /// Pending event, signalled later with [`signal`](Self::signal)
    pub fn new() -> Self {
        Self::with_owner(false)
    }

    /// Pending event completed by the pool once its task has run
    pub(crate) fn for_task() -> Self {
        Self::with_owner(true)
    }

    fn with_owner(task_owned: bool) -> Self {
        Self {
            serial: next_event_serial(),
            ready: AtomicBool::new(false),
            state: Mutex::new(EventState::default()),
            condvar: Condvar::new(),
            task_owned,
        }
    }

    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Mark an externally completed event as ready.
    ///
    /// Only events made with [`new`](Self::new) can be signalled. Events
    /// returned by `post` become ready when their task has run and ignore
    /// this call. Signalling a ready event does nothing.
    pub fn signal(&self) {
        if self.task_owned {
            warn!(serial = self.serial, "ignoring signal on a task event");
            return;
        }
        self.complete(smallvec![self.serial]);
    }

    /// Block until ready; returns at once if already ready
    pub fn wait(&self) {
        if self.is_ready() {
            return;
        }
        let mut state = self.state.lock();
        // The mutex orders this load against `mark_as_ready`
        while !self.ready.load(Ordering::Relaxed) {
            self.condvar.wait(&mut state);
        }
    }

    /// Non-blocking peek; when true, `wait` will not block
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn wait_many<'a, I>(events: I)
    where
        I: IntoIterator<Item = &'a Arc<WaitableEvent>>,
    {
        for event in events {
            event.wait();
        }
    }

    pub fn all_ready<'a, I>(events: I) -> bool
    where
        I: IntoIterator<Item = &'a Arc<WaitableEvent>>,
    {
        events.into_iter().all(|event| event.is_ready())
    }

    /// Notify `task` once this event is ready (right away if it already is)
    pub(crate) fn add_dependent_task(&self, task: Arc<AsyncTask>, hint: TaskDependencyHint) {
        let key = {
            let mut state = self.state.lock();
            if !self.ready.load(Ordering::Relaxed) {
                // Registered under the lock so `mark_as_ready` cannot miss it
                state.dependents.push(DependentTask { task, hint });
                return;
            }
            state.key.clone()
        };
        task.handle_dependency_ready(&key, hint);
    }

    pub(crate) fn mark_as_ready(&self, key: TaskKey) {
        let marked = self.complete(key);
        debug_assert!(marked, "event {} marked ready twice", self.serial);
    }

    /// Set the ready flag and final key; false if already ready
    fn complete(&self, key: TaskKey) -> bool {
        debug_assert!(!key.is_empty());

        let dependents = {
            let mut state = self.state.lock();
            if self.ready.load(Ordering::Relaxed) {
                return false;
            }
            state.key = key.clone();
            self.ready.store(true, Ordering::Release);
            std::mem::take(&mut state.dependents)
        };
        self.condvar.notify_all();

        // No dependents can be added any more; callbacks run unlocked
        for dependent in dependents {
            dependent.task.handle_dependency_ready(&key, dependent.hint);
        }
        true
    }
}

impl Default for WaitableEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WaitableEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitableEvent")
            .field("serial", &self.serial)
            .field("ready", &self.is_ready())
            .finish()
    }
}
