/*!
 * Worker Scheduler
 *
 * Task-graph thread pool. Tasks may depend on the completion events of
 * other tasks; hints decide where a ready task lands in the queue.
 *
 * # Architecture
 *
 * - `WaitableEvent`: completion signal, notifies dependent tasks
 * - `AsyncTask`: task + event + scheduling key
 * - `TaskQueue`: min-heap by key shared by the multi-threaded backends
 * - `WorkerThreadPool`: factory and posting API over the backends
 */

mod async_pool;
mod delegate;
mod event;
mod platform;
mod pool;
mod queue;
mod stats;
mod task;

pub use event::WaitableEvent;
pub use platform::{HostJob, PlatformMethods, TaskRunner};
pub use pool::{PoolKind, WorkerThreadPool};
pub use stats::WorkerPoolStats;
pub use task::{
    TaskDependencies, TaskDependency, TaskDependencyHint, TaskKey, WorkerTask, MAX_TASK_KEY_LEN,
};
