/*!
 * Synchronization Primitives
 *
 * Building blocks for the context mutex and the worker scheduler:
 * - Fast mutex family (spin, condvar, futex), all `lock_api::RawMutex`
 * - Owner/recursion bookkeeping shared by the recursive locks
 * - The process-wide global mutex
 *
 * # Performance
 *
 * - Cache-line aligned lock words to prevent false sharing
 * - Single atomic operation on uncontended paths
 * - Zero-cost abstractions via monomorphization over the raw lock type
 */

pub mod config;
pub mod fast_mutex;
pub mod global;
pub mod owner;
pub mod spinwait;

pub use config::{LockMode, SyncConfig};
pub use fast_mutex::{
    CondvarMutex, CondvarMutexGuard, FutexMutex, FutexMutexGuard, RawCondvarMutex, RawFutexMutex,
    RawSpinMutex, SpinMutex, SpinMutexGuard,
};
pub use global::{GlobalMutex, ScopedGlobalMutexLock, ScopedOptionalGlobalMutexLock};
pub use owner::LockOwner;
pub use spinwait::SpinBackoff;
