//! Host platform detection and prerequisite checks.

use std::fmt;

use crate::error::InstallError;
use crate::exec::Executor;

/// Tools the installer shells out to.
pub const REQUIRED_TOOLS: [&str; 6] = ["hdiutil", "installer", "pkgutil", "tar", "plutil", "cp"];

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// macOS.
    MacOs,
    /// Anything else.
    Other,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MacOs => write!(f, "macos"),
            Self::Other => write!(f, "{}", std::env::consts::OS),
        }
    }
}

/// Platform information for the current system.
#[derive(Debug, Clone, Copy)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub const fn detect() -> Self {
        let os = if cfg!(target_os = "macos") {
            Os::MacOs
        } else {
            Os::Other
        };
        Self { os }
    }

    /// Create a platform with an explicit OS (for testing).
    #[must_use]
    pub const fn new(os: Os) -> Self {
        Self { os }
    }

    /// Whether this is macOS.
    #[must_use]
    pub fn is_macos(&self) -> bool {
        self.os == Os::MacOs
    }

    /// Verify the host can run installs: macOS with every tool in
    /// [`REQUIRED_TOOLS`] on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Platform`] naming the OS or the missing tools.
    pub fn check(&self, executor: &dyn Executor) -> Result<(), InstallError> {
        if !self.is_macos() {
            return Err(InstallError::Platform(format!(
                "{} is not supported, macOS is required",
                self.os
            )));
        }
        let missing: Vec<&str> = REQUIRED_TOOLS
            .iter()
            .copied()
            .filter(|tool| !executor.which(tool))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(InstallError::Platform(format!(
                "required tools not found on PATH: {}",
                missing.join(", ")
            )))
        }
    }
}
