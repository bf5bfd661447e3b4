//! Task options shared by the `install` and `module` front ends.
//!
//! Both front ends normalize their input into one [`InstallOptions`] value
//! and call [`InstallOptions::validate`] before anything runs.
pub mod module_args;

use std::time::Duration;

use crate::error::InstallError;
use crate::source::{Checksum, InstallerKind};

/// Default download timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Validated options for a single install task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Local path or http(s) URL of the installer.
    pub source: String,
    /// Explicit container format; sniffed from the extension when `None`.
    pub kind: Option<InstallerKind>,
    /// Install target: a volume for packages, a folder for app bundles.
    pub location: Option<String>,
    /// Pass `-allowUntrusted` to `installer`.
    pub allow_untrusted: bool,
    /// Install even when an acceptable version is present.
    pub force: bool,
    /// Replace an older installed version.
    pub upgrade: bool,
    /// Expected receipt identifier, used to skip the download when possible.
    pub id: Option<String>,
    /// Expected application bundle name, used like `id`.
    pub app: Option<String>,
    /// Minimum acceptable installed version for the pre-check.
    pub version: Option<String>,
    /// Expected digest of the installer file.
    pub checksum: Option<Checksum>,
    /// Download timeout.
    pub timeout: Duration,
    /// Report what would change without changing anything.
    pub check_mode: bool,
}

impl InstallOptions {
    /// Options for `source` with every other field at its default.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: None,
            location: None,
            allow_untrusted: false,
            force: false,
            upgrade: true,
            id: None,
            app: None,
            version: None,
            checksum: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            check_mode: false,
        }
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Options`] describing the first problem found.
    pub fn validate(&self) -> Result<(), InstallError> {
        if self.source.trim().is_empty() {
            return Err(InstallError::Options("source must not be empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(InstallError::Options(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.id.is_some() && self.app.is_some() {
            return Err(InstallError::Options(
                "parameters are mutually exclusive: id|app".to_string(),
            ));
        }
        if self.version.is_some() && self.id.is_none() && self.app.is_none() {
            return Err(InstallError::Options(
                "version requires one of: id, app".to_string(),
            ));
        }
        for (name, value) in [
            ("id", &self.id),
            ("app", &self.app),
            ("version", &self.version),
            ("location", &self.location),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(InstallError::Options(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Whether the installed state can be checked before fetching.
    #[must_use]
    pub const fn has_precheck_hint(&self) -> bool {
        self.id.is_some() || self.app.is_some()
    }
}
