/*!
 * Condvar Mutex
 *
 * Atomic fast path with a waiter counter. Contended lockers sleep on a
 * `parking_lot::Condvar`; unlock only touches the inner mutex when someone
 * is waiting. Waiter count and state use relaxed atomics, so a waiter can
 * miss a notify: waits are bounded and the state is re-checked on timeout.
 */

use lock_api::{GuardSend, RawMutex};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Upper bound on a single condvar wait (missed-wakeup guard)
const WAIT_TIMEOUT: Duration = Duration::from_millis(1);

/// Mutex + condvar backed lock with relaxed waiter accounting
///
/// # Performance
///
/// - Uncontended lock/unlock never touch the inner mutex
/// - Waiters sleep instead of burning CPU
/// - Suited to locks that are sometimes held across blocking work
pub struct RawCondvarMutex {
    state: AtomicU32,
    waiters: AtomicU32,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl RawCondvarMutex {
    #[cold]
    #[inline(never)]
    fn lock_contended(&self) {
        self.waiters.fetch_add(1, Ordering::Relaxed);
        {
            let mut guard = self.mutex.lock();
            while self.state.swap(LOCKED, Ordering::Acquire) != UNLOCKED {
                self.condvar.wait_for(&mut guard, WAIT_TIMEOUT);
            }
        }
        self.waiters.fetch_sub(1, Ordering::Relaxed);
    }

    /// Approximate number of blocked lockers (diagnostics)
    pub fn waiter_count(&self) -> u32 {
        self.waiters.load(Ordering::Relaxed)
    }
}

unsafe impl RawMutex for RawCondvarMutex {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        state: AtomicU32::new(UNLOCKED),
        waiters: AtomicU32::new(0),
        mutex: parking_lot::const_mutex(()),
        condvar: Condvar::new(),
    };

    type GuardMarker = GuardSend;

    #[inline]
    fn lock(&self) {
        if self.state.swap(LOCKED, Ordering::Acquire) != UNLOCKED {
            self.lock_contended();
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
        if self.waiters.load(Ordering::Relaxed) != 0 {
            // Synchronize with a waiter between its state check and its wait
            drop(self.mutex.lock());
            self.condvar.notify_one();
        }
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != UNLOCKED
    }
}
