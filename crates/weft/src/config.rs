//! Worker pool configuration.

use serde::{Deserialize, Serialize};

use crate::apple::ApplePoolData;
use crate::error::PoolError;

/// Configuration for a [`WorkerPool`](crate::WorkerPool).
///
/// # Example
///
/// ```
/// use weft::PoolConfig;
///
/// let config = PoolConfig::new(4).with_break_on_mode_switch(false);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of CPU cores workers may be placed on. Must not exceed the
    /// number of cores on the machine.
    pub cores: usize,

    /// Set the FTZ and DAZ CPU flags in every worker so denormals cannot
    /// stall the audio path. x86 only; no-op elsewhere.
    pub disable_denormals: bool,

    /// On dual-kernel realtime systems, trap whenever a worker switches out
    /// of the realtime domain. Debug aid, off by default.
    pub break_on_mode_switch: bool,

    /// Apple realtime-threading data: period hints and the audio workgroup.
    /// Carries raw OS handles, so it is not part of the serialized form.
    #[serde(skip)]
    pub apple: Option<ApplePoolData>,
}

impl PoolConfig {
    /// Create a configuration for `cores` cores with the defaults:
    /// denormals disabled, mode-switch trapping off, no Apple data.
    #[must_use]
    pub fn new(cores: usize) -> Self {
        Self {
            cores,
            disable_denormals: true,
            break_on_mode_switch: false,
            apple: None,
        }
    }

    /// Set whether workers flush denormals.
    #[must_use]
    pub fn with_disable_denormals(mut self, disable: bool) -> Self {
        self.disable_denormals = disable;
        self
    }

    /// Set the mode-switch debug trap.
    #[must_use]
    pub fn with_break_on_mode_switch(mut self, enabled: bool) -> Self {
        self.break_on_mode_switch = enabled;
        self
    }

    /// Attach Apple realtime-threading data.
    #[must_use]
    pub fn with_apple_data(mut self, apple: ApplePoolData) -> Self {
        self.apple = Some(apple);
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the core count is zero.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.cores == 0 {
            return Err(PoolError::InvalidConfig(
                "cores must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// One worker core per available hardware thread.
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        Self::new(cores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::new(4);
        assert_eq!(config.cores, 4);
        assert!(config.disable_denormals);
        assert!(!config.break_on_mode_switch);
        assert!(config.apple.is_none());
    }

    #[test]
    fn test_zero_cores_rejected() {
        assert!(PoolConfig::new(0).validate().is_err());
        assert!(PoolConfig::new(1).validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = PoolConfig::new(2)
            .with_disable_denormals(false)
            .with_break_on_mode_switch(true);
        assert!(!config.disable_denormals);
        assert!(config.break_on_mode_switch);
    }

    #[test]
    fn test_default_tracks_the_machine() {
        assert!(PoolConfig::default().cores >= 1);
    }
}
