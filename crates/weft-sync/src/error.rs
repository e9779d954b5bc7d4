//! Error types for the synchronization layer.
//!
//! Only construction of a primitive can fail. Operations on an already
//! constructed primitive are best-effort blocking calls whose underlying
//! failures are programming errors and assert instead of returning.

use thiserror::Error;

/// Errors that can occur while constructing synchronization primitives.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A named semaphore could not be allocated.
    #[error("failed to allocate a named semaphore after {attempts} attempts (OS error {last_errno})")]
    SemaphoreAllocation {
        /// How many names were tried before giving up.
        attempts: u32,
        /// The last `errno` observed from `sem_open`.
        last_errno: i32,
    },

    /// Every condition-variable registry slot is in use.
    #[error("maximum number of realtime condition variables reached ({max})")]
    RegistryFull {
        /// The build-time slot count.
        max: usize,
    },

    /// Setting up the realtime message pipe failed.
    #[error("failed to set up realtime pipe: {0}")]
    PipeSetup(#[source] std::io::Error),

    /// The requested threading domain has no implementation in this build.
    #[error("no {0} implementation available in this build")]
    UnsupportedDomain(&'static str),
}

/// A specialized `Result` for primitive construction.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
