/*!
 * Futex Mutex
 *
 * Three-state lock (unlocked / locked / locked-with-waiters) parked through
 * parking_lot_core, which maps to futex syscalls on Linux. Unlock only wakes
 * when the previous state says someone may be parked, and no wakeup can be
 * missed.
 */

use lock_api::{GuardSend, RawMutex};
use parking_lot_core::{park, unpark_one, DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};
use std::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

/// Strict futex-style mutex
///
/// # Performance
///
/// - One CAS to lock, one swap to unlock when uncontended
/// - Wake syscall only when a waiter registered itself
#[repr(C, align(64))]
pub struct RawFutexMutex {
    state: AtomicU32,
}

impl RawFutexMutex {
    /// Stable parking address (same as in `unlock`)
    #[inline(always)]
    fn park_key(&self) -> usize {
        &self.state as *const AtomicU32 as usize
    }

    #[cold]
    #[inline(never)]
    fn lock_contended(&self) {
        // Taking the lock as CONTENDED may cause one spurious wake later, never a lost one
        while self.state.swap(CONTENDED, Ordering::Acquire) != UNLOCKED {
            // SAFETY: the key is the address of our own state, which outlives the
            // park call; the callbacks do not panic or call into parking_lot.
            unsafe {
                park(
                    self.park_key(),
                    || self.state.load(Ordering::Relaxed) == CONTENDED,
                    || {},
                    |_, _| {},
                    DEFAULT_PARK_TOKEN,
                    None,
                );
            }
        }
    }
}

unsafe impl RawMutex for RawFutexMutex {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        state: AtomicU32::new(UNLOCKED),
    };

    type GuardMarker = GuardSend;

    #[inline]
    fn lock(&self) {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
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
        if self.state.swap(UNLOCKED, Ordering::Release) == CONTENDED {
            // SAFETY: same key as the park call, callback does not panic.
            unsafe {
                unpark_one(self.park_key(), |_| DEFAULT_UNPARK_TOKEN);
            }
        }
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != UNLOCKED
    }
}
