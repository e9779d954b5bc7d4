//! Process-wide realtime-kernel mode flag.
//!
//! On dual-kernel systems (Xenomai Cobalt and friends) every pool and
//! condition variable must be built from the realtime kernel's primitives.
//! The embedding host signals this once at startup, before it constructs
//! anything else from this library; flipping the flag after a pool or
//! condition variable exists is a programming error.

use std::sync::atomic::{AtomicBool, Ordering};

static RT_KERNEL_MODE: AtomicBool = AtomicBool::new(false);

/// Switch the process into dedicated realtime-kernel mode.
///
/// One-shot: once set, all subsequently created worker pools and realtime
/// condition variables select their RT-kernel variants. Must be called before
/// any pool or condition variable is constructed. There is no way to unset
/// the flag.
pub fn init_realtime_kernel_mode() {
    RT_KERNEL_MODE.store(true, Ordering::SeqCst);
    tracing::info!("realtime kernel mode enabled");
}

/// Returns true if [`init_realtime_kernel_mode`] has been called.
#[must_use]
pub fn realtime_kernel_mode() -> bool {
    RT_KERNEL_MODE.load(Ordering::SeqCst)
}
