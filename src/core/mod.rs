/*!
 * Core Module
 * Identifiers, errors and synchronization primitives
 */

pub mod errors;
pub mod sync;
pub mod types;

pub use errors::{SyncError, SyncResult};
pub use types::{ContextMutexId, ThreadId};
