/*!
 * Worker Pool Statistics
 * Lock-free counters shared between a pool and its runner threads
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a pool's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolStats {
    pub threads_spawned: u64,
    pub tasks_run: u64,
    /// Runner jobs handed to the host task runner
    pub trampolines_posted: u64,
}

/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - Relaxed ordering, counters are independent
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub(crate) struct AtomicWorkerPoolStats {
    threads_spawned: AtomicU64,
    tasks_run: AtomicU64,
    trampolines_posted: AtomicU64,
}

impl AtomicWorkerPoolStats {
    #[inline(always)]
    pub fn inc_threads_spawned(&self) {
        self.threads_spawned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_tasks_run(&self) {
        self.tasks_run.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_trampolines_posted(&self) {
        self.trampolines_posted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            threads_spawned: self.threads_spawned.load(Ordering::Relaxed),
            tasks_run: self.tasks_run.load(Ordering::Relaxed),
            trampolines_posted: self.trampolines_posted.load(Ordering::Relaxed),
        }
    }
}
