/*!
 * Core Types
 * Identifiers shared by the lock and scheduler subsystems
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique thread identifier
///
/// `std::thread::ThreadId` cannot be stored in an atomic, so lock owners are
/// tracked with this compact id instead. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub u64);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_THREAD_ID: ThreadId = ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
}

impl ThreadId {
    /// Id that never belongs to a live thread
    pub const INVALID: ThreadId = ThreadId(0);

    /// Id of the calling thread
    #[inline]
    pub fn current() -> Self {
        CURRENT_THREAD_ID.with(|id| *id)
    }

    #[inline(always)]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a node of a [`ContextMutexManager`](crate::context::ContextMutexManager)
///
/// Slots are recycled once a node is destroyed, so a handle must not be used
/// after its last reference was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextMutexId(pub u32);

impl ContextMutexId {
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ContextMutexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cm#{}", self.0)
    }
}
