//! Application bundle resource: a `.app` copied into a folder.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use super::{Applicable, Resource, ResourceState};
use crate::error::InstallError;
use crate::exec::Executor;
use crate::plist;

/// Default destination folder for application bundles.
pub const DEFAULT_LOCATION: &str = "/Applications";

/// Info.plist keys holding the marketing and build versions, in order of
/// preference.
pub const VERSION_KEYS: [&str; 2] = ["CFBundleShortVersionString", "CFBundleVersion"];

/// Normalize a bundle name so it always ends in `.app`.
#[must_use]
pub fn bundle_name(name: &str) -> String {
    let name = name.trim().trim_end_matches('/');
    let has_ext = Path::new(name)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("app"));
    if has_ext {
        name.to_string()
    } else {
        format!("{name}.app")
    }
}

/// Read the version of the bundle at `bundle`.
///
/// # Errors
///
/// Returns an error if `plutil` cannot be run.
pub fn bundle_version(executor: &dyn Executor, bundle: &Path) -> Result<Option<String>> {
    let info = bundle.join("Contents").join("Info.plist");
    plist::read_first(executor, &info, &VERSION_KEYS)
}

/// An application bundle installed at `<location>/<name>`.
#[derive(Debug)]
pub struct AppBundleResource<'a> {
    /// Bundle directory name, e.g. `Firefox.app`.
    pub name: String,
    location: PathBuf,
    source: Option<PathBuf>,
    executor: &'a dyn Executor,
}

impl<'a> AppBundleResource<'a> {
    /// Create a resource that can only report state.
    ///
    /// `location` defaults to [`DEFAULT_LOCATION`] when `None`.
    #[must_use]
    pub fn new(name: &str, location: Option<&str>, executor: &'a dyn Executor) -> Self {
        Self {
            name: bundle_name(name),
            location: PathBuf::from(location.unwrap_or(DEFAULT_LOCATION)),
            source: None,
            executor,
        }
    }

    /// Copy from `bundle` when applied.
    #[must_use]
    pub fn with_source(mut self, bundle: &Path) -> Self {
        self.source = Some(bundle.to_path_buf());
        self
    }

    /// Where the bundle is (or will be) installed.
    #[must_use]
    pub fn destination(&self) -> PathBuf {
        self.location.join(&self.name)
    }

    fn install_error(&self, reason: String) -> anyhow::Error {
        InstallError::Install {
            target: self.destination().display().to_string(),
            reason,
        }
        .into()
    }

    /// Move the existing bundle to `aside`, then `staged` to the
    /// destination, putting the old bundle back if the second move fails.
    fn swap_into_place(&self, staged: &Path, aside: &Path) -> Result<()> {
        let dest = self.destination();
        let had_previous = fs::symlink_metadata(&dest).is_ok();
        if had_previous {
            tracing::debug!("moving existing {} aside", dest.display());
            fs::rename(&dest, aside)
                .map_err(|e| self.install_error(format!("moving existing bundle aside: {e}")))?;
        }
        if let Err(e) = fs::rename(staged, &dest) {
            if had_previous && let Err(restore) = fs::rename(aside, &dest) {
                tracing::warn!("unable to restore {}: {restore}", dest.display());
            }
            return Err(self.install_error(format!("moving new bundle into place: {e}")));
        }
        Ok(())
    }
}

impl Applicable for AppBundleResource<'_> {
    fn description(&self) -> String {
        self.destination().display().to_string()
    }

    fn apply(&self) -> Result<()> {
        let Some(source) = &self.source else {
            anyhow::bail!("no bundle given for {}", self.name);
        };
        let Some(bundle) = source.file_name() else {
            anyhow::bail!("{} has no bundle name", source.display());
        };

        fs::create_dir_all(&self.location)
            .with_context(|| format!("creating {}", self.location.display()))
            .map_err(|e| self.install_error(format!("{e:#}")))?;

        // Staged on the destination volume so the final renames are atomic.
        let staging = tempfile::Builder::new()
            .prefix(".macos-pkg-staging-")
            .tempdir_in(&self.location)
            .map_err(|e| self.install_error(format!("creating staging directory: {e}")))?;
        let src_arg = source.to_string_lossy();
        let staging_arg = format!("{}/", staging.path().display());
        let result = self
            .executor
            .run_unchecked("cp", &["-R", &src_arg, &staging_arg])?;
        if !result.success {
            return Err(self.install_error(result.combined_output()));
        }

        self.swap_into_place(&staging.path().join(bundle), &staging.path().join("previous"))
    }
}

impl Resource for AppBundleResource<'_> {
    fn current_state(&self) -> Result<ResourceState> {
        let dest = self.destination();
        if !dest.is_dir() {
            return Ok(ResourceState::Missing);
        }
        let version = bundle_version(self.executor, &dest)?;
        Ok(ResourceState::Installed { version })
    }
}
