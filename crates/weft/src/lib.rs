//! # weft
//!
//! Realtime audio worker pools: per-period fan-out of DSP work across CPU
//! cores.
//!
//! An audio engine splits each buffer's work over a [`WorkerPool`] of
//! pre-spawned `SCHED_FIFO` threads. Once per period the driver (audio
//! callback) thread wakes every worker, each runs its callback exactly once,
//! and the driver blocks until all of them are parked again:
//!
//! ```no_run
//! use weft::{PoolConfig, WorkerPool};
//!
//! let mut pool = WorkerPool::new(PoolConfig::new(4))?;
//! pool.add_worker(|| { /* render one voice block */ })?;
//! pool.add_worker(|| { /* render another */ })?;
//!
//! // In the audio callback, once per period:
//! pool.wake_and_wait();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Alongside the pool, [`RtConditionVariable`] lets a realtime thread signal
//! a non-realtime thread (and back) without priority inversion, and the
//! small helpers ([`is_current_thread_realtime`], [`current_rt_time`],
//! [`set_flush_denormals_to_zero`], [`rt_println!`]) cover the ambient needs
//! of realtime audio code.
//!
//! On dual-kernel realtime systems, call [`init_realtime_kernel_mode`] once
//! at startup (before creating anything else) and build with the `xenomai`
//! feature; pools and condition variables then use the realtime kernel's
//! primitives throughout.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod apple;
pub mod config;
pub mod denormals;
pub mod error;
pub mod pool;
pub mod rt_print;

mod cores;
mod time;
mod version;
mod worker;

pub mod prelude;

pub use config::PoolConfig;
pub use denormals::set_flush_denormals_to_zero;
pub use error::{AddWorkerError, PoolError, WorkerPoolStatus};
pub use pool::{WorkerOptions, WorkerPool, DEFAULT_WORKER_PRIORITY};
pub use rt_print::rt_print;
pub use time::current_rt_time;
pub use version::{build_info, version, Version};

pub use weft_sync::{
    init_realtime_kernel_mode, is_current_thread_realtime, RtConditionVariable, SyncError,
};
