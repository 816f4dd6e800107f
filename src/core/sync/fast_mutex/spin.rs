/*!
 * Spin/Yield Mutex
 *
 * Atomic exchange fast path; contended lockers spin with `SpinBackoff`.
 * Lowest wake latency, highest CPU cost under long holds.
 */

use crate::core::sync::spinwait::SpinBackoff;
use lock_api::{GuardSend, RawMutex};
use std::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Spin + yield + short sleep mutex
///
/// # Performance
///
/// - Single atomic exchange when uncontended
/// - No syscalls until the backoff reaches its sleep phase
/// - Best for critical sections of a few hundred nanoseconds
#[repr(C, align(64))] // Cache-line aligned to prevent false sharing
pub struct RawSpinMutex {
    state: AtomicU32,
}

impl RawSpinMutex {
    #[cold]
    #[inline(never)]
    fn lock_contended(&self) {
        let mut backoff = SpinBackoff::new();
        loop {
            backoff.snooze();
            // Read before exchanging to keep the cache line shared while held
            if self.state.load(Ordering::Relaxed) == UNLOCKED
                && self.state.swap(LOCKED, Ordering::Acquire) == UNLOCKED
            {
                return;
            }
        }
    }
}

unsafe impl RawMutex for RawSpinMutex {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        state: AtomicU32::new(UNLOCKED),
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
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != UNLOCKED
    }
}
