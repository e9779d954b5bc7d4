//! Status codes for the Apple realtime-threading steps.

/// Outcome of the Apple workgroup and realtime-policy initialization.
///
/// Reported per worker; anything other than [`Ok`](Self::Ok) after a worker
/// spawns is treated by the pool as a partial failure and rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadingStatus {
    /// The operation succeeded.
    Ok,
    /// The fetched audio workgroup has been cancelled.
    WorkgroupCancelled,
    /// Fetching the audio workgroup failed.
    WorkgroupFetchFailed,
    /// Fetching the audio workgroup property data size failed.
    WorkgroupSizeFailed,
    /// Fetching an audio device name's size failed.
    DeviceNameFetchSizeFailed,
    /// Fetching an audio device name failed.
    DeviceNameFetchFailed,
    /// Fetching the system audio object property data failed.
    PropertyDataFailed,
    /// Fetching the system audio object property data size failed.
    PropertyDataSizeFailed,
    /// The running macOS predates the workgroup API (11.0).
    MacOs11NotDetected,
    /// No audio device matches the configured name.
    InvalidDeviceName,
    /// Setting the thread's realtime policy succeeded.
    RealtimeOk,
    /// Setting the thread's realtime policy failed.
    RealtimeFailed,
    /// No workgroup was passed for the worker to join.
    NoWorkgroupPassed,
    /// The workgroup was already cancelled when the worker tried to join.
    WorkgroupAlreadyCancelled,
    /// Joining the workgroup failed for an unknown reason.
    WorkgroupJoiningUnknownFailure,
    /// No Apple init has run (non-macOS platforms, or before the worker
    /// reports).
    #[default]
    Empty,
}

impl ThreadingStatus {
    /// Human-readable description for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "successfully fetched the audio workgroup",
            Self::WorkgroupCancelled => "the fetched audio workgroup has been cancelled",
            Self::WorkgroupFetchFailed => "failed fetching the audio workgroup",
            Self::WorkgroupSizeFailed => "failed fetching the audio workgroup property data size",
            Self::DeviceNameFetchSizeFailed => "failed fetching an audio device name's size",
            Self::DeviceNameFetchFailed => "failed fetching an audio device name",
            Self::PropertyDataFailed => "failed fetching the system audio object property data",
            Self::PropertyDataSizeFailed => {
                "failed fetching the system audio object property data size"
            }
            Self::MacOs11NotDetected => {
                "macOS 11.0 and up is required to fetch workgroup info for a device"
            }
            Self::InvalidDeviceName => "no audio device matches the configured name",
            Self::RealtimeOk => "setting thread realtime status succeeded",
            Self::RealtimeFailed => "failed setting thread realtime status",
            Self::NoWorkgroupPassed => "no realtime workgroup was passed",
            Self::WorkgroupAlreadyCancelled => {
                "attempting to join a thread workgroup that is already cancelled"
            }
            Self::WorkgroupJoiningUnknownFailure => "unknown error when joining workgroup",
            Self::Empty => "",
        }
    }
}

impl std::fmt::Display for ThreadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
