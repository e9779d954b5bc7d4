//! # weft-sync
//!
//! Synchronization layer for coordinating realtime audio worker threads.
//!
//! This crate provides the primitives the `weft` worker pool is built from:
//!
//! - [`TriggeredBarrier`] - an N-way rendezvous gate opened by an external
//!   driver thread, reusable across audio periods
//! - [`RtConditionVariable`] - a one-producer/one-consumer event that crosses
//!   scheduling domains without priority inversion
//! - [`RtScope`] / [`is_current_thread_realtime`] - the per-thread realtime
//!   marker other components use to detect their caller's domain
//! - [`services`] - the OS capability set (mutex, condition variable,
//!   semaphore, attribute-driven spawn), bound once per threading domain
//!
//! ## Safety Guarantees
//!
//! - **No heap allocations** after a primitive is constructed
//! - **No recoverable errors on hot paths** - primitive failures there are
//!   programming errors and assert
//! - **Bounded blocking** - the only suspension points are the documented
//!   semaphore, condition-variable and poll waits

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod barrier;
pub mod cond_var;
pub mod error;
pub mod mode;
pub mod rt_flag;
pub mod services;

// The pipe condition variable is the only id consumer; the registry itself
// is compiled and tested in every build.
#[cfg_attr(not(feature = "xenomai"), allow(dead_code))]
mod registry;

pub mod prelude;

pub use barrier::TriggeredBarrier;
pub use cond_var::RtConditionVariable;
pub use error::{SyncError, SyncResult};
pub use mode::{init_realtime_kernel_mode, realtime_kernel_mode};
pub use registry::MAX_RT_COND_VARS;
pub use rt_flag::{is_current_thread_realtime, RtScope};
