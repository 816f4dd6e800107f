/*!
 * Global Mutex
 *
 * Process-wide lock serializing API entry points that touch shared state.
 * Owned by [`SyncRuntime`](crate::runtime::SyncRuntime) instead of living in
 * a lazily allocated static. The lock mode decides how much owner
 * bookkeeping is done:
 * - `Simple`: raw lock only
 * - `Checked`: asserts against self-deadlock and foreign unlock
 * - `Recursive`: the owner may re-enter
 */

use super::config::LockMode;
use super::fast_mutex::RawCondvarMutex;
use super::owner::LockOwner;
use lock_api::RawMutex;

/// Global lock over any raw mutex
///
/// Defaults to the condvar variant: entry points guarded by it may block for
/// a while but are called comparatively rarely.
pub struct GlobalMutex<R: RawMutex = RawCondvarMutex> {
    raw: R,
    owner: LockOwner,
    mode: LockMode,
}

impl<R: RawMutex> GlobalMutex<R> {
    pub fn new(mode: LockMode) -> Self {
        Self {
            raw: R::INIT,
            owner: LockOwner::new(),
            mode,
        }
    }

    #[inline]
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn lock(&self) {
        match self.mode {
            LockMode::Simple => self.raw.lock(),
            LockMode::Checked => {
                debug_assert!(
                    !self.owner.is_held_by_current(),
                    "global mutex locked twice by the same thread"
                );
                self.raw.lock();
                self.owner.set_locked(1);
            }
            LockMode::Recursive => {
                if !self.raw.try_lock() {
                    if self.owner.is_held_by_current() {
                        self.owner.enter();
                        return;
                    }
                    self.raw.lock();
                }
                self.owner.set_locked(1);
            }
        }
    }

    pub fn try_lock(&self) -> bool {
        match self.mode {
            LockMode::Simple => self.raw.try_lock(),
            LockMode::Checked => {
                if self.raw.try_lock() {
                    self.owner.set_locked(1);
                    true
                } else {
                    false
                }
            }
            LockMode::Recursive => {
                if self.raw.try_lock() {
                    self.owner.set_locked(1);
                    true
                } else if self.owner.is_held_by_current() {
                    self.owner.enter();
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Release one acquisition
    ///
    /// Must pair with a successful `lock`/`try_lock` on the calling thread.
    pub fn unlock(&self) {
        match self.mode {
            LockMode::Simple => {
                // SAFETY: caller holds the lock per the pairing contract
                unsafe { self.raw.unlock() }
            }
            LockMode::Checked | LockMode::Recursive => {
                if self.owner.leave() {
                    // SAFETY: the owner bookkeeping just confirmed we held the last level
                    unsafe { self.raw.unlock() }
                }
            }
        }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Current recursion depth of the calling thread (0 when not held by it)
    pub fn lock_level(&self) -> u32 {
        if self.mode != LockMode::Simple && self.owner.is_held_by_current() {
            self.owner.level()
        } else {
            0
        }
    }

    /// Block until no thread holds the lock
    pub fn wait_released(&self) {
        self.lock();
        self.unlock();
    }

    pub fn scoped(&self) -> ScopedGlobalMutexLock<'_, R> {
        ScopedGlobalMutexLock::new(self)
    }
}

impl<R: RawMutex> Default for GlobalMutex<R> {
    fn default() -> Self {
        Self::new(LockMode::default())
    }
}

/// Holds the global mutex for its lifetime
#[must_use = "the global mutex is released as soon as the guard is dropped"]
pub struct ScopedGlobalMutexLock<'a, R: RawMutex = RawCondvarMutex> {
    mutex: &'a GlobalMutex<R>,
}

impl<'a, R: RawMutex> ScopedGlobalMutexLock<'a, R> {
    pub fn new(mutex: &'a GlobalMutex<R>) -> Self {
        mutex.lock();
        Self { mutex }
    }
}

impl<R: RawMutex> Drop for ScopedGlobalMutexLock<'_, R> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

/// Holds the global mutex only when `enabled` was set at construction
#[must_use = "the global mutex is released as soon as the guard is dropped"]
pub struct ScopedOptionalGlobalMutexLock<'a, R: RawMutex = RawCondvarMutex> {
    mutex: Option<&'a GlobalMutex<R>>,
}

impl<'a, R: RawMutex> ScopedOptionalGlobalMutexLock<'a, R> {
    pub fn new(mutex: &'a GlobalMutex<R>, enabled: bool) -> Self {
        let mutex = enabled.then_some(mutex);
        if let Some(m) = mutex {
            m.lock();
        }
        Self { mutex }
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.mutex.is_some()
    }
}

impl<R: RawMutex> Drop for ScopedOptionalGlobalMutexLock<'_, R> {
    fn drop(&mut self) {
        if let Some(m) = self.mutex {
            m.unlock();
        }
    }
}
