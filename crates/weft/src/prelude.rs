//! Prelude module for common worker-pool types.
//!
//! This module provides a convenient way to import the most commonly used
//! types from the library.

pub use crate::apple::{ApplePoolData, AudioWorkgroup, ThreadingStatus};
pub use crate::config::PoolConfig;
pub use crate::error::{AddWorkerError, PoolError, WorkerPoolStatus};
pub use crate::pool::{WorkerOptions, WorkerPool, DEFAULT_WORKER_PRIORITY};
pub use crate::{
    build_info, current_rt_time, init_realtime_kernel_mode, is_current_thread_realtime,
    set_flush_denormals_to_zero, version, RtConditionVariable, Version,
};
