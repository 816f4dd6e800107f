/*!
 * Spin Backoff
 *
 * Escalating wait schedule for the spin mutex: yield first, then sleep.
 * Most contended acquisitions resolve while still yielding; the sleep phase
 * bounds CPU burn when the holder is descheduled.
 */

use std::thread;
use std::time::Duration;

/// Yield iterations before the first sleep
const YIELD_SPINS: u32 = 64;

/// Sleep lengths cycled through once yielding gave up (microseconds)
const SLEEP_SCHEDULE_MICROS: [u64; 6] = [1, 2, 5, 10, 20, 50];

/// Per-acquisition backoff state
///
/// # Performance
///
/// - No allocation, lives on the waiting thread's stack
/// - `snooze` never sleeps longer than the last schedule step
#[derive(Debug, Default)]
pub struct SpinBackoff {
    step: u32,
}

impl SpinBackoff {
    #[inline]
    pub const fn new() -> Self {
        Self { step: 0 }
    }

    /// Wait a little before the next attempt
    pub fn snooze(&mut self) {
        if self.step < YIELD_SPINS {
            thread::yield_now();
        } else {
            let idx = (self.step - YIELD_SPINS) as usize % SLEEP_SCHEDULE_MICROS.len();
            thread::sleep(Duration::from_micros(SLEEP_SCHEDULE_MICROS[idx]));
        }
        self.step = self.step.wrapping_add(1);
        if self.step == 0 {
            // Wrapped around; stay in the sleep phase
            self.step = YIELD_SPINS;
        }
    }

    /// True once the yield phase is over
    #[inline]
    pub fn is_sleeping(&self) -> bool {
        self.step >= YIELD_SPINS
    }

    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}
