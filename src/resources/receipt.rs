//! Installer package resource, tracked through `pkgutil` receipts.
use std::path::{Path, PathBuf};

use anyhow::Result;

use super::{Applicable, Resource, ResourceState};
use crate::error::InstallError;
use crate::exec::Executor;

/// Default install target volume.
pub const DEFAULT_TARGET: &str = "/";

/// A package identified by its receipt identifier.
#[derive(Debug)]
pub struct ReceiptResource<'a> {
    /// Receipt identifier (e.g. `com.google.Chrome`).
    pub identifier: String,
    package: Option<PathBuf>,
    target: String,
    allow_untrusted: bool,
    executor: &'a dyn Executor,
}

impl<'a> ReceiptResource<'a> {
    /// Create a resource that can only report state.
    #[must_use]
    pub fn new(identifier: impl Into<String>, executor: &'a dyn Executor) -> Self {
        Self {
            identifier: identifier.into(),
            package: None,
            target: DEFAULT_TARGET.to_string(),
            allow_untrusted: false,
            executor,
        }
    }

    /// Attach the package to install and the `installer` options.
    ///
    /// `target` defaults to [`DEFAULT_TARGET`] when `None`.
    #[must_use]
    pub fn with_package(mut self, package: &Path, target: Option<&str>, allow_untrusted: bool) -> Self {
        self.package = Some(package.to_path_buf());
        self.target = target.unwrap_or(DEFAULT_TARGET).to_string();
        self.allow_untrusted = allow_untrusted;
        self
    }

    /// Whether `pkgutil` still has a receipt for this identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if `pkgutil` cannot be run.
    pub fn is_recorded(&self) -> Result<bool> {
        let result = self.executor.run("pkgutil", &["--pkgs"])?;
        Ok(result.stdout.lines().any(|l| l.trim() == self.identifier))
    }
}

/// Extract the `version:` field from `pkgutil --pkg-info` output.
fn parse_pkg_info_version(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let value = line.trim().strip_prefix("version:")?.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

impl Applicable for ReceiptResource<'_> {
    fn description(&self) -> String {
        self.package.as_ref().map_or_else(
            || self.identifier.clone(),
            |p| format!("{} ({})", self.identifier, p.display()),
        )
    }

    fn apply(&self) -> Result<()> {
        let Some(package) = &self.package else {
            anyhow::bail!("no package given for {}", self.identifier);
        };
        let pkg_arg = package.to_string_lossy();
        let mut args: Vec<&str> = vec!["-pkg", &pkg_arg, "-target", &self.target];
        if self.allow_untrusted {
            args.push("-allowUntrusted");
        }

        let result = self.executor.run_unchecked("installer", &args)?;
        if !result.success {
            return Err(InstallError::Install {
                target: package.display().to_string(),
                reason: result.combined_output(),
            }
            .into());
        }
        tracing::debug!("installer: {}", result.stdout.trim());
        Ok(())
    }
}

impl Resource for ReceiptResource<'_> {
    fn current_state(&self) -> Result<ResourceState> {
        if !self.is_recorded()? {
            return Ok(ResourceState::Missing);
        }
        let info = self
            .executor
            .run_unchecked("pkgutil", &["--pkg-info", &self.identifier])?;
        let version = if info.success {
            parse_pkg_info_version(&info.stdout)
        } else {
            None
        };
        Ok(ResourceState::Installed { version })
    }
}
