//! Idempotent install primitives (check + apply pattern).
pub mod app_bundle;
pub mod receipt;

use anyhow::Result;

use crate::version;

/// Minimal interface for resources that can be described and applied.
pub trait Applicable {
    /// Human-readable description of this resource.
    fn description(&self) -> String;

    /// Apply the resource change (install the software).
    ///
    /// # Errors
    ///
    /// Returns an error if the installer command fails or the resource has
    /// nothing to install from.
    fn apply(&self) -> Result<()>;
}

/// Installed state of a piece of software.
///
/// # Examples
///
/// ```
/// use macos_pkg::resources::ResourceState;
///
/// let missing = ResourceState::Missing;
/// let present = ResourceState::Installed { version: Some("1.2".into()) };
/// assert_ne!(missing, present);
/// assert_eq!(present.version(), Some("1.2"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Not installed.
    Missing,
    /// Installed; the version is `None` when it cannot be read.
    Installed {
        /// Installed version, if known.
        version: Option<String>,
    },
}

impl ResourceState {
    /// Installed version, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Missing => None,
            Self::Installed { version } => version.as_deref(),
        }
    }

    /// Whether anything is installed.
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

/// Resources that can determine their own installed state.
pub trait Resource: Applicable {
    /// Check the current state of the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be determined.
    fn current_state(&self) -> Result<ResourceState>;
}

/// Knobs that decide whether an installed copy is good enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallPolicy {
    /// Install even when an acceptable version is present.
    pub force: bool,
    /// Replace an older installed version.
    pub upgrade: bool,
}

impl Default for InstallPolicy {
    fn default() -> Self {
        Self {
            force: false,
            upgrade: true,
        }
    }
}

/// Outcome of the idempotency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallDecision {
    /// Nothing to do.
    AlreadyInstalled {
        /// Installed version, if known.
        installed: Option<String>,
    },
    /// Install (or reinstall / upgrade).
    Proceed {
        /// Version being replaced, if any.
        previous: Option<String>,
    },
}

impl InstallDecision {
    /// Whether the installer has to run.
    #[must_use]
    pub const fn should_install(&self) -> bool {
        matches!(self, Self::Proceed { .. })
    }
}

/// Decide whether `candidate` needs installing given what is on disk.
///
/// An installed copy whose version cannot be read is treated as current
/// unless `force` is set: without a version there is nothing to upgrade
/// from.
#[must_use]
pub fn decide(state: &ResourceState, candidate: &str, policy: InstallPolicy) -> InstallDecision {
    let ResourceState::Installed { version } = state else {
        return InstallDecision::Proceed { previous: None };
    };
    if policy.force {
        return InstallDecision::Proceed {
            previous: version.clone(),
        };
    }
    match version {
        Some(installed) if policy.upgrade && !version::is_at_least(installed, candidate) => {
            InstallDecision::Proceed {
                previous: Some(installed.clone()),
            }
        }
        _ => InstallDecision::AlreadyInstalled {
            installed: version.clone(),
        },
    }
}
