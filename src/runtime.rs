/*!
 * Runtime Registry
 *
 * Explicitly owned home of the process-wide pieces: the global mutex, the
 * host platform hooks and the configuration. Created once by the embedder
 * and passed (or shared through an `Arc`) to whatever needs it.
 */

use crate::context::ContextMutexManager;
use crate::core::errors::SyncResult;
use crate::core::sync::{GlobalMutex, ScopedGlobalMutexLock, ScopedOptionalGlobalMutexLock, SyncConfig};
use crate::monitoring::span_operation;
use crate::worker::{PlatformMethods, WorkerThreadPool};
use lock_api::RawMutex;
use std::sync::Arc;
use tracing::info;

pub struct SyncRuntime {
    config: SyncConfig,
    global: GlobalMutex,
    platform: Arc<PlatformMethods>,
}

impl SyncRuntime {
    pub fn init(config: SyncConfig) -> Self {
        Self::with_platform(config, Arc::new(PlatformMethods::new()))
    }

    /// Runtime whose worker pools may delegate to the host's task runner
    pub fn with_platform(config: SyncConfig, platform: Arc<PlatformMethods>) -> Self {
        info!(
            lock_mode = config.lock_mode.as_str(),
            worker_threads = config.worker_threads,
            "sync runtime initialized"
        );
        Self {
            global: GlobalMutex::new(config.lock_mode),
            config,
            platform,
        }
    }

    /// Runtime configured from `GPU_SYNC_*` environment variables
    pub fn from_env() -> SyncResult<Self> {
        Ok(Self::init(SyncConfig::from_env()?))
    }

    #[inline]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[inline]
    pub fn global_mutex(&self) -> &GlobalMutex {
        &self.global
    }

    pub fn global_lock(&self) -> ScopedGlobalMutexLock<'_> {
        ScopedGlobalMutexLock::new(&self.global)
    }

    pub fn optional_global_lock(&self, enabled: bool) -> ScopedOptionalGlobalMutexLock<'_> {
        ScopedOptionalGlobalMutexLock::new(&self.global, enabled)
    }

    #[inline]
    pub fn platform(&self) -> &Arc<PlatformMethods> {
        &self.platform
    }

    /// Pool sized by `worker_threads` from the configuration
    pub fn create_worker_pool(&self) -> Arc<WorkerThreadPool> {
        WorkerThreadPool::create(self.config.worker_threads, &self.platform)
    }

    pub fn create_worker_pool_with(&self, num_threads: usize) -> Arc<WorkerThreadPool> {
        WorkerThreadPool::create(num_threads, &self.platform)
    }

    /// Manager whose recursion and backoff follow the configuration
    pub fn context_mutex_manager<R: RawMutex + Send + Sync>(&self) -> ContextMutexManager<R> {
        ContextMutexManager::new(&self.config)
    }

    /// Tear down once no thread holds the global mutex any more
    pub fn shutdown(self) {
        let _span = span_operation("runtime_shutdown");
        self.global.wait_released();
        info!("sync runtime shut down");
    }
}

impl std::fmt::Debug for SyncRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRuntime")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .finish()
    }
}
