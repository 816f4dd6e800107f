/*!
 * Context Mutex
 *
 * Mergeable locks for graphics contexts. Independently created contexts
 * each get their own mutex; sharing resources between them merges the
 * mutexes into one synchronization domain without deadlocking threads that
 * merge in opposite orders.
 */

mod guard;
mod mutex;
mod slab;
mod stats;

pub use guard::{ContextMutexGuard, ScopedContextMutexLock};
pub use mutex::ContextMutexManager;
pub use stats::ContextMutexStats;
