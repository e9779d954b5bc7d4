//! Error and status types for the worker pool.

use thiserror::Error;

use crate::apple::ThreadingStatus;

/// Outcome classification for worker-pool operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// The operation succeeded.
    Ok,
    /// An unclassified OS failure, or a partial platform init failure.
    Error,
    /// The OS refused realtime scheduling, affinity or a policy change.
    PermissionDenied,
    /// The OS refused thread creation due to resource limits.
    LimitExceeded,
    /// A priority outside [0, 100], or a core outside the pool's core list.
    InvalidArguments,
}

impl WorkerPoolStatus {
    /// Classify a raw `errno` from thread creation.
    pub(crate) fn from_errno(errno: i32) -> Self {
        match errno {
            0 => Self::Ok,
            libc::EAGAIN => Self::LimitExceeded,
            libc::EPERM => Self::PermissionDenied,
            libc::EINVAL => Self::InvalidArguments,
            _ => Self::Error,
        }
    }

    /// Short human-readable description for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "worker pool error",
            Self::PermissionDenied => "permission denied for realtime scheduling",
            Self::LimitExceeded => "thread resource limit exceeded",
            Self::InvalidArguments => "invalid arguments",
        }
    }
}

impl std::fmt::Display for WorkerPoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`WorkerPool::add_worker`](crate::WorkerPool::add_worker).
///
/// The pool has already rolled back all bookkeeping when this is returned:
/// the failed call leaves no trace.
#[derive(Debug, Clone, Error)]
#[error("failed to add worker: {status}")]
pub struct AddWorkerError {
    status: WorkerPoolStatus,
    platform_status: ThreadingStatus,
}

impl AddWorkerError {
    pub(crate) fn new(status: WorkerPoolStatus) -> Self {
        debug_assert_ne!(status, WorkerPoolStatus::Ok);
        Self {
            status,
            platform_status: ThreadingStatus::Empty,
        }
    }

    pub(crate) fn with_platform(status: WorkerPoolStatus, platform_status: ThreadingStatus) -> Self {
        debug_assert_ne!(status, WorkerPoolStatus::Ok);
        Self {
            status,
            platform_status,
        }
    }

    /// The pool-level classification of the failure.
    #[must_use]
    pub fn status(&self) -> WorkerPoolStatus {
        self.status
    }

    /// The Apple platform init outcome, when the failure came from there.
    /// [`ThreadingStatus::Empty`] otherwise.
    #[must_use]
    pub fn platform_status(&self) -> ThreadingStatus {
        self.platform_status
    }
}

/// Errors constructing a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Error)]
pub enum PoolError {
    /// The configuration failed validation.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// No worker implementation exists for the initialized threading mode.
    #[error("no worker implementation available for the initialized threading mode")]
    NoImplementation,

    /// A synchronization primitive could not be constructed.
    #[error(transparent)]
    Sync(#[from] weft_sync::SyncError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_classification() {
        assert_eq!(
            WorkerPoolStatus::from_errno(libc::EAGAIN),
            WorkerPoolStatus::LimitExceeded
        );
        assert_eq!(
            WorkerPoolStatus::from_errno(libc::EPERM),
            WorkerPoolStatus::PermissionDenied
        );
        assert_eq!(
            WorkerPoolStatus::from_errno(libc::EINVAL),
            WorkerPoolStatus::InvalidArguments
        );
        assert_eq!(WorkerPoolStatus::from_errno(0), WorkerPoolStatus::Ok);
        assert_eq!(
            WorkerPoolStatus::from_errno(libc::ENOMEM),
            WorkerPoolStatus::Error
        );
    }

    #[test]
    fn test_status_display_is_short_and_stable() {
        assert_eq!(
            WorkerPoolStatus::PermissionDenied.to_string(),
            "permission denied for realtime scheduling"
        );
        assert_eq!(WorkerPoolStatus::Ok.to_string(), "ok");
    }
}
