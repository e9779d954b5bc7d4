//! Apple realtime-threading integration.
//!
//! macOS manages realtime audio threads through time-constraint scheduling
//! and OS workgroups instead of explicit priorities and affinity. The
//! workgroup handle is obtained by the embedding application (typically from
//! its CoreAudio output device) and handed to the pool as an opaque value;
//! each worker then sets itself to the time-constraint policy and joins the
//! workgroup from its own thread before the first period.
//!
//! The types in this module exist on every platform so pool configuration
//! stays portable; the operations are compiled for macOS only.

mod status;

pub use status::ThreadingStatus;

#[cfg(target_os = "macos")]
mod workgroup;

#[cfg(target_os = "macos")]
pub use workgroup::{
    join_workgroup, leave_workgroup, set_current_thread_to_realtime, WorkgroupJoinToken,
};

/// Opaque `os_workgroup_t` handle provided by the embedding application.
///
/// The handle stays valid for as long as the application keeps the underlying
/// audio device alive; the pool only borrows it.
#[derive(Debug, Clone, Copy)]
pub struct AudioWorkgroup {
    #[cfg(target_os = "macos")]
    raw: *mut std::ffi::c_void,
}

// SAFETY: os_workgroup_t is a reference-counted OS object whose join/leave
// entry points are called from arbitrary threads by design.
unsafe impl Send for AudioWorkgroup {}
unsafe impl Sync for AudioWorkgroup {}

#[cfg(target_os = "macos")]
impl AudioWorkgroup {
    /// Wrap a raw `os_workgroup_t`.
    ///
    /// # Safety
    ///
    /// `raw` must be a valid `os_workgroup_t` that outlives every pool
    /// holding this wrapper.
    #[must_use]
    pub unsafe fn from_raw(raw: *mut std::ffi::c_void) -> Self {
        Self { raw }
    }

    pub(crate) fn raw(&self) -> *mut std::ffi::c_void {
        self.raw
    }
}

/// Apple-specific data a pool needs to set its workers realtime.
#[derive(Debug, Clone, Default)]
pub struct ApplePoolData {
    /// Audio workgroup of the output device, if the application fetched one.
    /// Workers fail their platform init when this is `None`, mirroring the
    /// "no workgroup passed" status; leave the whole [`ApplePoolData`] out of
    /// the pool configuration to skip workgroup handling entirely.
    pub workgroup: Option<AudioWorkgroup>,
    /// Audio period size in frames, used to derive the realtime period.
    pub chunk_size: u32,
    /// Current sample rate in Hz.
    pub current_sample_rate: f64,
}

impl ApplePoolData {
    /// The realtime period to declare for a worker thread, in milliseconds.
    /// Never below one millisecond.
    #[must_use]
    pub fn period_ms(&self) -> f64 {
        if self.current_sample_rate <= 0.0 {
            return 1.0;
        }
        (1000.0 * f64::from(self.chunk_size) / self.current_sample_rate).max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_follows_chunk_and_rate() {
        let data = ApplePoolData {
            workgroup: None,
            chunk_size: 480,
            current_sample_rate: 48_000.0,
        };
        assert!((data.period_ms() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_period_is_clamped_to_one_millisecond() {
        let data = ApplePoolData {
            workgroup: None,
            chunk_size: 16,
            current_sample_rate: 96_000.0,
        };
        assert!((data.period_ms() - 1.0).abs() < 1e-9);

        let degenerate = ApplePoolData::default();
        assert!((degenerate.period_ms() - 1.0).abs() < 1e-9);
    }
}
