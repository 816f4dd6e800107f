/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 *
 * Locking and scheduling are infallible by contract; only configuration and
 * thread creation can fail.
 */

use miette::Diagnostic;
use thiserror::Error;

/// Result type for fallible setup operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Synchronization subsystem errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SyncError {
    #[error("Invalid lock mode '{0}'")]
    #[diagnostic(
        code(sync::invalid_lock_mode),
        help("Valid lock modes: simple, checked, recursive.")
    )]
    InvalidLockMode(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(sync::invalid_config),
        help("Check GPU_SYNC_* environment variables.")
    )]
    InvalidConfig(String),

    #[error("Failed to spawn worker thread: {0}")]
    #[diagnostic(
        code(worker::thread_spawn_failed),
        help("System may be out of threads or memory. Queued tasks run on the posting thread.")
    )]
    ThreadSpawn(String),
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ThreadSpawn(err.to_string())
    }
}
