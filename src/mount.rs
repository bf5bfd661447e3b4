//! Disk image attach/detach with guaranteed cleanup.
//!
//! A [`MountedImage`] detaches its volume when [`MountedImage::detach`] is
//! called or, failing that, when it is dropped.  Every live mount point is
//! also recorded in a process-wide registry so the interrupt handler
//! installed by [`install_interrupt_handler`] can detach it on SIGINT or
//! SIGTERM before the process exits.  Download directories are registered
//! the same way, since `exit` skips their destructors.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context as _, Result};

use crate::error::InstallError;
use crate::exec::{Executor, SystemExecutor};

/// Exit status used when the process is interrupted.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Mount points currently attached by this process.
static ACTIVE_MOUNTS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

fn register(mount_point: &Path) {
    ACTIVE_MOUNTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(mount_point.to_path_buf());
}

fn unregister(mount_point: &Path) {
    ACTIVE_MOUNTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .retain(|p| p != mount_point);
}

/// Snapshot of the mount points currently attached by this process.
#[must_use]
pub fn active_mounts() -> Vec<PathBuf> {
    ACTIVE_MOUNTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Detach every registered mount point, best effort.
pub fn detach_all(executor: &dyn Executor) {
    let mounts = std::mem::take(&mut *ACTIVE_MOUNTS.lock().unwrap_or_else(PoisonError::into_inner));
    for mount_point in mounts {
        let mp = mount_point.to_string_lossy();
        let detached = executor
            .run_unchecked("hdiutil", &["detach", &mp, "-force"])
            .is_ok_and(|r| r.success);
        if detached {
            fs::remove_dir(&mount_point).ok();
        } else {
            tracing::warn!("unable to detach {mp}");
        }
    }
}

/// Scratch directories (downloads) to delete on interrupt.
static SCRATCH_DIRS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

/// Record `dir` for removal by the interrupt handler.
pub fn register_scratch_dir(dir: &Path) {
    SCRATCH_DIRS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(dir.to_path_buf());
}

/// Forget `dir` once its owner has cleaned it up.
pub fn unregister_scratch_dir(dir: &Path) {
    SCRATCH_DIRS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .retain(|p| p != dir);
}

/// Snapshot of the registered scratch directories.
#[must_use]
pub fn scratch_dirs() -> Vec<PathBuf> {
    SCRATCH_DIRS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Remove every registered scratch directory, best effort.
pub fn remove_scratch_dirs() {
    let dirs = std::mem::take(&mut *SCRATCH_DIRS.lock().unwrap_or_else(PoisonError::into_inner));
    remove_dirs(&dirs);
}

fn remove_dirs(dirs: &[PathBuf]) {
    for dir in dirs {
        if let Err(e) = fs::remove_dir_all(dir)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!("unable to remove {}: {e}", dir.display());
        }
    }
}

/// Install a SIGINT/SIGTERM handler that detaches any attached image,
/// removes pending downloads and exits with status 130.
///
/// # Errors
///
/// Returns an error if a handler is already installed.
pub fn install_interrupt_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        tracing::warn!("interrupted, detaching mounted images");
        detach_all(&SystemExecutor);
        remove_scratch_dirs();
        std::process::exit(INTERRUPTED_EXIT_CODE);
    })
    .context("installing interrupt handler")
}

/// A disk image attached read-only at a private mount point.
#[derive(Debug)]
pub struct MountedImage<'a> {
    image: PathBuf,
    mount_point: PathBuf,
    executor: &'a dyn Executor,
    attached: bool,
}

impl<'a> MountedImage<'a> {
    /// Attach `image` read-only, without Finder windows, at a fresh
    /// temporary mount point.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Mount`] if the mount point cannot be created
    /// or `hdiutil attach` fails.
    pub fn attach(image: &Path, executor: &'a dyn Executor) -> Result<Self, InstallError> {
        let mount_error = |reason: String| InstallError::Mount {
            image: image.display().to_string(),
            reason,
        };

        let mount_point = tempfile::Builder::new()
            .prefix("macos-pkg-mnt-")
            .tempdir()
            .map_err(|e| mount_error(format!("creating mount point: {e}")))?
            .keep();
        let image_arg = image.to_string_lossy();
        let mp_arg = mount_point.to_string_lossy();

        let result = executor.run_unchecked(
            "hdiutil",
            &[
                "attach",
                &image_arg,
                "-nobrowse",
                "-readonly",
                "-noautoopen",
                "-noverify",
                "-mountpoint",
                &mp_arg,
            ],
        );
        let failure = match result {
            Ok(r) if r.success => None,
            Ok(r) => Some(r.combined_output()),
            Err(e) => Some(format!("{e:#}")),
        };
        if let Some(reason) = failure {
            fs::remove_dir(&mount_point).ok();
            return Err(mount_error(reason));
        }

        register(&mount_point);
        tracing::debug!("attached {} at {}", image.display(), mount_point.display());
        Ok(Self {
            image: image.to_path_buf(),
            mount_point,
            executor,
            attached: true,
        })
    }

    /// Where the volume is mounted.
    #[must_use]
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// The attached image file.
    #[must_use]
    pub fn image(&self) -> &Path {
        &self.image
    }

    /// Detach the volume.
    ///
    /// A busy volume is retried once with `-force`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Unmount`] if the volume is still attached.
    /// Callers report this as a warning; it never fails the task.
    pub fn detach(mut self) -> Result<(), InstallError> {
        self.detach_inner()
    }

    fn detach_inner(&mut self) -> Result<(), InstallError> {
        if !self.attached {
            return Ok(());
        }
        self.attached = false;
        unregister(&self.mount_point);

        let mp = self.mount_point.to_string_lossy().into_owned();
        let mut reason = String::new();
        for args in [&["detach", mp.as_str()][..], &["detach", mp.as_str(), "-force"][..]] {
            match self.executor.run_unchecked("hdiutil", args) {
                Ok(r) if r.success => {
                    fs::remove_dir(&self.mount_point).ok();
                    tracing::debug!("detached {mp}");
                    return Ok(());
                }
                Ok(r) => reason = r.combined_output(),
                Err(e) => reason = format!("{e:#}"),
            }
        }
        Err(InstallError::Unmount {
            mount_point: mp,
            reason,
        })
    }
}

impl Drop for MountedImage<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.detach_inner() {
            tracing::warn!("{e}");
        }
    }
}
