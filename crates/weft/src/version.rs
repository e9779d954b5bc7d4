//! Library version and build information.

use std::sync::OnceLock;

/// Semantic version of the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch revision.
    pub revision: u32,
}

/// The version this library was built as.
#[must_use]
pub fn version() -> Version {
    Version {
        major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
        minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
        revision: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
    }
}

/// Human-readable build description: version, target platform and profile.
#[must_use]
pub fn build_info() -> &'static str {
    static INFO: OnceLock<String> = OnceLock::new();
    INFO.get_or_init(|| {
        format!(
            "weft {} ({} {}, {} build, {} threading)",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH,
            if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
            if cfg!(feature = "xenomai") {
                "dual-kernel"
            } else {
                "posix"
            },
        )
    })
}
