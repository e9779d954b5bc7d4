//! Prelude module for common synchronization types.
//!
//! This module provides a convenient way to import the most commonly used
//! types from the synchronization crate.

pub use crate::barrier::TriggeredBarrier;
pub use crate::cond_var::RtConditionVariable;
pub use crate::error::{SyncError, SyncResult};
pub use crate::mode::{init_realtime_kernel_mode, realtime_kernel_mode};
pub use crate::rt_flag::{is_current_thread_realtime, RtScope};
pub use crate::services::{Posix, ThreadAttributes, ThreadServices};
pub use crate::MAX_RT_COND_VARS;
