//! Domain-specific error types for the installer.
//!
//! Every step of the pipeline (fetch, mount, inspect, install, cleanup) maps
//! its failures onto one [`InstallError`] variant.  Command handlers at the
//! CLI boundary convert it to [`anyhow::Error`] via `?`; the module front end
//! renders it as a failed task result instead.
//!
//! # Error kinds
//!
//! ```text
//! InstallError
//! ├── Fetch        bad path, unreachable URL, HTTP error, checksum mismatch
//! ├── UnknownType  no or unsupported file extension
//! ├── Mount        hdiutil attach failed
//! ├── NoPackage    nothing installable inside the image
//! ├── Metadata     PackageInfo missing or incomplete
//! ├── Install      installer / copy failed
//! ├── Unmount      hdiutil detach failed (reported, never fatal)
//! ├── Platform     not macOS, or a required tool is missing
//! ├── Options      invalid task arguments
//! └── Other        unexpected failure to spawn a command
//! ```

use thiserror::Error;

/// Top-level error type for an install task.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The installer could not be resolved to a local file.
    #[error("Unable to fetch {origin}: {reason}")]
    Fetch {
        /// The path or URL that was requested.
        origin: String,
        /// Human-readable reason for the failure.
        reason: String,
    },

    /// The installer type could not be determined from its name.
    #[error("{reason} ({origin}). Try using the \"type\" parameter.")]
    UnknownType {
        /// The path or URL whose type is unknown.
        origin: String,
        /// What was wrong with the name.
        reason: String,
    },

    /// Attaching the disk image failed.
    #[error("Unable to mount {image}: {reason}")]
    Mount {
        /// Path of the disk image.
        image: String,
        /// Output of the failed attach.
        reason: String,
    },

    /// The image contained neither a package nor an application bundle.
    #[error("Unable to locate any .pkg or .app in {image}")]
    NoPackage {
        /// Path of the disk image.
        image: String,
    },

    /// The package's properties could not be read.
    #[error("Unable to read package properties of {package}: {reason}")]
    Metadata {
        /// Path of the package.
        package: String,
        /// What was missing.
        reason: String,
    },

    /// The installer (or bundle copy) failed.
    #[error("Installation of {target} failed: {reason}")]
    Install {
        /// Package or bundle being installed.
        target: String,
        /// Captured output of the failed command.
        reason: String,
    },

    /// Detaching a mounted image failed.  Reported as a warning only.
    #[error("Unable to unmount {mount_point}: {reason}")]
    Unmount {
        /// Mount point that is still attached.
        mount_point: String,
        /// Output of the failed detach.
        reason: String,
    },

    /// The host cannot run the installer.
    #[error("Unsupported platform: {0}")]
    Platform(String),

    /// The task arguments are invalid.
    #[error("Invalid arguments: {0}")]
    Options(String),

    /// A command could not be spawned at all.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InstallError {
    /// Short machine-friendly name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::UnknownType { .. } => "unknown_type",
            Self::Mount { .. } => "mount",
            Self::NoPackage { .. } => "no_package",
            Self::Metadata { .. } => "metadata",
            Self::Install { .. } => "install",
            Self::Unmount { .. } => "unmount",
            Self::Platform(_) => "platform",
            Self::Options(_) => "options",
            Self::Other(_) => "other",
        }
    }

    /// Build an [`InstallError::Fetch`].
    pub fn fetch(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}
