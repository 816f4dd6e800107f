/*!
 * Context Mutex Guards
 * RAII wrappers around manager lock/unlock pairs
 */

use super::mutex::ContextMutexManager;
use crate::core::types::ContextMutexId;
use lock_api::RawMutex;

/// Holds a context mutex until dropped
#[must_use = "the context mutex is unlocked as soon as the guard is dropped"]
pub struct ScopedContextMutexLock<'a, R: RawMutex + Send + Sync> {
    manager: &'a ContextMutexManager<R>,
    id: ContextMutexId,
}

impl<'a, R: RawMutex + Send + Sync> ScopedContextMutexLock<'a, R> {
    pub(super) fn new(manager: &'a ContextMutexManager<R>, id: ContextMutexId) -> Self {
        manager.lock(id);
        Self { manager, id }
    }

    #[inline]
    pub fn id(&self) -> ContextMutexId {
        self.id
    }

    /// Merge another mutex into the locked component
    pub fn merge(&self, other: ContextMutexId) {
        self.manager.merge(self.id, other);
    }
}

impl<R: RawMutex + Send + Sync> Drop for ScopedContextMutexLock<'_, R> {
    fn drop(&mut self) {
        self.manager.unlock(self.id);
    }
}

/// Lock plus an extra reference, released together on drop
///
/// The node cannot be destroyed while the guard lives, even when every
/// other owner releases it inside the critical section.
#[must_use = "the context mutex is unlocked as soon as the guard is dropped"]
pub struct ContextMutexGuard<'a, R: RawMutex + Send + Sync> {
    manager: &'a ContextMutexManager<R>,
    id: ContextMutexId,
}

impl<'a, R: RawMutex + Send + Sync> ContextMutexGuard<'a, R> {
    pub(super) fn new(manager: &'a ContextMutexManager<R>, id: ContextMutexId) -> Self {
        // Lock first: the lock is what orders this reference against releases
        manager.lock(id);
        manager.add_ref(id);
        Self { manager, id }
    }

    #[inline]
    pub fn id(&self) -> ContextMutexId {
        self.id
    }

    pub fn merge(&self, other: ContextMutexId) {
        self.manager.merge(self.id, other);
    }
}

impl<R: RawMutex + Send + Sync> Drop for ContextMutexGuard<'_, R> {
    fn drop(&mut self) {
        self.manager.release_and_unlock(self.id);
    }
}
