/*!
 * Context Mutex Statistics
 * Atomic counters updated on create/destroy/merge paths
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of a manager's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMutexStats {
    pub live: usize,
    pub created: u64,
    pub destroyed: u64,
    /// Nodes that were still a root when destroyed
    pub roots_destroyed: u64,
    pub merges: u64,
    /// Backoff rounds taken because the other root was busy
    pub merge_retries: u64,
}

/// Atomic counters behind [`ContextMutexStats`]
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - Relaxed ordering; snapshots are not mutually consistent
#[repr(C, align(64))]
#[derive(Default)]
pub(super) struct AtomicContextMutexStats {
    created: AtomicU64,
    destroyed: AtomicU64,
    roots_destroyed: AtomicU64,
    merges: AtomicU64,
    merge_retries: AtomicU64,
}

impl AtomicContextMutexStats {
    #[inline(always)]
    pub fn inc_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_destroyed(&self, was_root: bool) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
        if was_root {
            self.roots_destroyed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    pub fn inc_merges(&self) {
        self.merges.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn add_merge_retries(&self, retries: u64) {
        if retries > 0 {
            self.merge_retries.fetch_add(retries, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, live: usize) -> ContextMutexStats {
        ContextMutexStats {
            live,
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            roots_destroyed: self.roots_destroyed.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
            merge_retries: self.merge_retries.load(Ordering::Relaxed),
        }
    }
}
