//! Monotonic clock safe to call from a realtime context.

use std::time::Duration;

#[cfg(feature = "xenomai")]
mod cobalt {
    #[link(name = "cobalt")]
    extern "C" {
        pub fn __cobalt_clock_gettime(
            clock_id: libc::clockid_t,
            timestamp: *mut libc::timespec,
        ) -> libc::c_int;
    }
}

/// The current monotonic time.
///
/// Safe to call from a realtime context; under realtime-kernel mode the
/// realtime kernel's clock is read so the call never leaves the realtime
/// domain. The value orders events within the process and is not aligned
/// with the audio stream: do not schedule note events with it.
#[must_use]
pub fn current_rt_time() -> Duration {
    let mut timestamp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    #[cfg(feature = "xenomai")]
    if weft_sync::realtime_kernel_mode() {
        // SAFETY: timestamp is a valid out-parameter.
        let res =
            unsafe { cobalt::__cobalt_clock_gettime(libc::CLOCK_MONOTONIC, &mut timestamp) };
        debug_assert_eq!(res, 0, "cobalt clock_gettime failed");
        return Duration::new(timestamp.tv_sec as u64, timestamp.tv_nsec as u32);
    }

    // SAFETY: timestamp is a valid out-parameter.
    let res = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut timestamp) };
    debug_assert_eq!(res, 0, "clock_gettime failed");
    Duration::new(timestamp.tv_sec as u64, timestamp.tv_nsec as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_is_monotonic() {
        let first = current_rt_time();
        std::thread::sleep(Duration::from_micros(100));
        let second = current_rt_time();
        assert!(second > first);
    }
}
