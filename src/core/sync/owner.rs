/*!
 * Lock Owner Tracking
 *
 * Owner thread id + recursion level shared by the global mutex and the
 * context mutex roots. Only the owning thread writes the level; other
 * threads read the owner id purely to learn "not mine".
 */

use crate::core::types::ThreadId;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug)]
pub struct LockOwner {
    owner: AtomicU64,
    level: AtomicU32,
}

impl LockOwner {
    pub const fn new() -> Self {
        Self {
            owner: AtomicU64::new(ThreadId::INVALID.0),
            level: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn owner(&self) -> ThreadId {
        ThreadId(self.owner.load(Ordering::Relaxed))
    }

    /// True when the calling thread holds the lock
    ///
    /// Relaxed is enough: a thread only ever observes its own id here if it
    /// stored it itself.
    #[inline]
    pub fn is_held_by_current(&self) -> bool {
        self.owner() == ThreadId::current()
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level.load(Ordering::Relaxed)
    }

    /// Record a fresh acquisition by the calling thread
    #[inline]
    pub fn set_locked(&self, level: u32) {
        debug_assert!(level > 0);
        debug_assert_eq!(self.owner(), ThreadId::INVALID, "lock already has an owner");
        self.level.store(level, Ordering::Relaxed);
        self.owner.store(ThreadId::current().0, Ordering::Relaxed);
    }

    /// Nested acquisition by the current owner
    #[inline]
    pub fn enter(&self) {
        debug_assert!(self.is_held_by_current());
        debug_assert!(self.level() > 0);
        self.level.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one level; returns true when the raw lock must be released
    #[inline]
    pub fn leave(&self) -> bool {
        debug_assert!(
            self.is_held_by_current(),
            "unlock from thread {} which does not own the lock (owner {})",
            ThreadId::current(),
            self.owner()
        );
        let prev = self.level.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0);
        if prev == 1 {
            self.owner.store(ThreadId::INVALID.0, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Forget ownership entirely, returning the level that was held
    #[inline]
    pub fn take(&self) -> u32 {
        debug_assert!(self.is_held_by_current());
        let level = self.level.swap(0, Ordering::Relaxed);
        self.owner.store(ThreadId::INVALID.0, Ordering::Relaxed);
        level
    }

    /// Overwrite the level of a lock the current thread holds
    #[inline]
    pub fn set_level(&self, level: u32) {
        debug_assert!(self.is_held_by_current());
        debug_assert!(level > 0);
        self.level.store(level, Ordering::Relaxed);
    }
}

impl Default for LockOwner {
    fn default() -> Self {
        Self::new()
    }
}
