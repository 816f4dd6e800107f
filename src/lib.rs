/*!
 * GPU Runtime Sync Library
 *
 * Concurrency core for a GPU API translation layer:
 * - Fast mutex family and the process-wide global mutex
 * - Mergeable context mutexes (union-find over lock nodes)
 * - Task-graph worker pool with dependency hints
 */

pub mod context;
pub mod core;
pub mod monitoring;
pub mod runtime;
pub mod worker;

// Re-exports
pub use context::{ContextMutexGuard, ContextMutexManager, ContextMutexStats, ScopedContextMutexLock};
pub use core::errors::{SyncError, SyncResult};
pub use core::sync::{
    CondvarMutex, FutexMutex, GlobalMutex, LockMode, RawCondvarMutex, RawFutexMutex, RawSpinMutex,
    SpinMutex, SyncConfig,
};
pub use core::types::{ContextMutexId, ThreadId};
pub use runtime::SyncRuntime;
pub use worker::{
    PlatformMethods, TaskDependency, TaskDependencyHint, TaskRunner, WaitableEvent, WorkerTask,
    WorkerThreadPool,
};
