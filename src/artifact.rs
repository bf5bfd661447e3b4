//! Inspect a resolved installer: mount disk images and find what to install.
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::InstallError;
use crate::exec::Executor;
use crate::logging::Log;
use crate::mount::MountedImage;
use crate::source::InstallerKind;

/// How deep to look for bundles inside a mounted volume.
const MAX_SCAN_DEPTH: usize = 3;

/// Something the installer can act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An installer package, installed with `installer`.
    Package(PathBuf),
    /// An application bundle, copied into place.
    Application(PathBuf),
}

/// Bundles found on a volume, each list sorted by path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VolumeContents {
    /// `.pkg` / `.mpkg` files or bundle directories.
    pub packages: Vec<PathBuf>,
    /// `.app` bundle directories.
    pub applications: Vec<PathBuf>,
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exts.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Walk `root` collecting packages and application bundles.
///
/// Bundles are not descended into, symlinks are not followed (disk images
/// routinely carry an `Applications -> /Applications` alias), and hidden
/// entries such as `.Trashes` or `.background` are skipped.
#[must_use]
pub fn scan_volume(root: &Path) -> VolumeContents {
    let mut contents = VolumeContents::default();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(MAX_SCAN_DEPTH)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let is_dir = entry.file_type().is_dir();

        if is_hidden(path) {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        if has_extension(path, &["pkg", "mpkg"]) {
            contents.packages.push(path.to_path_buf());
            if is_dir {
                walker.skip_current_dir();
            }
        } else if is_dir && has_extension(path, &["app"]) {
            contents.applications.push(path.to_path_buf());
            walker.skip_current_dir();
        }
    }
    contents
}

/// An inspected installer, holding the mounted volume (DMG only) until it
/// is closed or dropped.
#[derive(Debug)]
pub struct Artifact<'a> {
    /// Container format.
    pub kind: InstallerKind,
    /// What was found inside.
    pub contents: VolumeContents,
    mount: Option<MountedImage<'a>>,
}

impl<'a> Artifact<'a> {
    /// Inspect the installer at `path`.
    ///
    /// A package is its own single candidate.  A disk image is attached and
    /// scanned; when nothing installable is found it is detached again
    /// before [`InstallError::NoPackage`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Mount`] or [`InstallError::NoPackage`].
    pub fn inspect(
        kind: InstallerKind,
        path: &Path,
        executor: &'a dyn Executor,
        log: &dyn Log,
    ) -> Result<Self, InstallError> {
        match kind {
            InstallerKind::Pkg => Ok(Self {
                kind,
                contents: VolumeContents {
                    packages: vec![path.to_path_buf()],
                    applications: Vec::new(),
                },
                mount: None,
            }),
            InstallerKind::Dmg => {
                log.info(&format!("mounting {}", path.display()));
                let mount = MountedImage::attach(path, executor)?;
                log.debug(&format!("mounted at {}", mount.mount_point().display()));

                let contents = scan_volume(mount.mount_point());
                log.debug(&format!(
                    "found {} package(s), {} application(s)",
                    contents.packages.len(),
                    contents.applications.len()
                ));

                if contents.packages.is_empty() && contents.applications.is_empty() {
                    if let Err(e) = mount.detach() {
                        log.warn(&e.to_string());
                    }
                    return Err(InstallError::NoPackage {
                        image: path.display().to_string(),
                    });
                }

                Ok(Self {
                    kind,
                    contents,
                    mount: Some(mount),
                })
            }
        }
    }

    /// The candidate to install: the first package, else the first
    /// application bundle.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::NoPackage`] when the artifact is empty.
    pub fn target(&self) -> Result<Target, InstallError> {
        if let Some(pkg) = self.contents.packages.first() {
            return Ok(Target::Package(pkg.clone()));
        }
        if let Some(app) = self.contents.applications.first() {
            return Ok(Target::Application(app.clone()));
        }
        Err(InstallError::NoPackage {
            image: self
                .mount
                .as_ref()
                .map_or_else(String::new, |m| m.image().display().to_string()),
        })
    }

    /// Mount point of the disk image, if one is attached.
    #[must_use]
    pub fn mount_point(&self) -> Option<&Path> {
        self.mount.as_ref().map(MountedImage::mount_point)
    }

    /// Detach the disk image, if any.
    ///
    /// Returns the unmount failure instead of raising it: cleanup problems
    /// are reported, never fatal.
    #[must_use]
    pub fn close(mut self) -> Option<InstallError> {
        self.mount.take().and_then(|m| m.detach().err())
    }
}
