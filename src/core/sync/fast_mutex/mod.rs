/*!
 * Fast Mutex Family
 *
 * Lower-latency alternatives to a general purpose mutex for very short
 * critical sections. All three share one contract (`lock_api::RawMutex`):
 * - `RawSpinMutex`: spin + yield + escalating sleeps
 * - `RawCondvarMutex`: condvar backed, relaxed waiter counting
 * - `RawFutexMutex`: strict three-state futex lock
 *
 * None are reentrant: locking twice on one thread deadlocks.
 */

mod condvar;
mod futex;
mod spin;

pub use condvar::RawCondvarMutex;
pub use futex::RawFutexMutex;
pub use spin::RawSpinMutex;

/// Data-carrying mutex over [`RawSpinMutex`]
pub type SpinMutex<T> = lock_api::Mutex<RawSpinMutex, T>;
pub type SpinMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinMutex, T>;

/// Data-carrying mutex over [`RawCondvarMutex`]
pub type CondvarMutex<T> = lock_api::Mutex<RawCondvarMutex, T>;
pub type CondvarMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawCondvarMutex, T>;

/// Data-carrying mutex over [`RawFutexMutex`]
pub type FutexMutex<T> = lock_api::Mutex<RawFutexMutex, T>;
pub type FutexMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawFutexMutex, T>;
