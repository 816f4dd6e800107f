/*!
 * Synchronization Configuration
 *
 * Runtime configuration for lock behavior and worker pool sizing
 */

use crate::core::errors::{SyncError, SyncResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// How a lock tracks its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Plain exclusive lock, no owner bookkeeping checks
    Simple,
    /// Records the owner and asserts against self-deadlock and foreign unlock
    Checked,
    /// Owner may re-lock; nested locks collapse into one acquisition
    Recursive,
}

impl LockMode {
    /// Parse from string representation
    pub fn from_str(s: &str) -> SyncResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "simple" | "plain" => Ok(Self::Simple),
            "checked" | "thread_id" | "threadid" => Ok(Self::Checked),
            "recursive" | "reentrant" => Ok(Self::Recursive),
            _ => Err(SyncError::InvalidLockMode(s.to_string())),
        }
    }

    #[inline(always)]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Checked => "checked",
            Self::Recursive => "recursive",
        }
    }

    #[inline(always)]
    pub const fn is_recursive(&self) -> bool {
        matches!(self, Self::Recursive)
    }

    /// Checked in debug builds, simple otherwise
    pub const fn default_for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Checked
        } else {
            Self::Simple
        }
    }
}

impl Default for LockMode {
    fn default() -> Self {
        Self::default_for_build()
    }
}

impl Serialize for LockMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LockMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Synchronization configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Owner tracking for the global mutex and context mutexes
    pub lock_mode: LockMode,
    /// Shortest sleep between merge attempts
    pub merge_backoff_min: Duration,
    /// Longest sleep between merge attempts
    pub merge_backoff_max: Duration,
    /// Worker count for pools created by the runtime (0 = hardware parallelism)
    pub worker_threads: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lock_mode: LockMode::default(),
            merge_backoff_min: Duration::from_micros(10),
            merge_backoff_max: Duration::from_micros(100),
            worker_threads: 0,
        }
    }
}

impl SyncConfig {
    /// Configuration allowing re-entrant locking on the same thread
    pub fn recursive() -> Self {
        Self {
            lock_mode: LockMode::Recursive,
            ..Self::default()
        }
    }

    /// Load overrides from the environment
    ///
    /// Environment variables:
    /// - GPU_SYNC_LOCK_MODE: simple | checked | recursive
    /// - GPU_SYNC_WORKER_THREADS: worker count (0 = hardware parallelism)
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode) = lookup("GPU_SYNC_LOCK_MODE") {
            config.lock_mode = LockMode::from_str(&mode)?;
        }

        if let Some(threads) = lookup("GPU_SYNC_WORKER_THREADS") {
            config.worker_threads = threads.trim().parse().map_err(|_| {
                SyncError::InvalidConfig(format!("GPU_SYNC_WORKER_THREADS='{}'", threads))
            })?;
        }

        Ok(config)
    }

    #[inline(always)]
    pub fn allow_recursion(&self) -> bool {
        self.lock_mode.is_recursive()
    }

    /// Backoff window in whole microseconds, never empty
    pub(crate) fn merge_backoff_micros(&self) -> (u64, u64) {
        let min = self.merge_backoff_min.as_micros() as u64;
        let max = self.merge_backoff_max.as_micros() as u64;
        (min, max.max(min))
    }
}
