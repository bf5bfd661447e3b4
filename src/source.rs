//! Resolve a `source` argument (local path or http(s) URL) to a local
//! installer file.
use std::fmt;
use std::fs;
use std::io::{self, Read as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use sha2::{Digest, Sha256};

use crate::error::InstallError;
use crate::logging::Log;
use crate::mount;

/// TCP connect timeout in seconds.
const CONNECT_TIMEOUT: u64 = 10;

/// Installer container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InstallerKind {
    /// Flat or bundle installer package.
    Pkg,
    /// Disk image containing a package or an application bundle.
    Dmg,
}

impl fmt::Display for InstallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pkg => write!(f, "pkg"),
            Self::Dmg => write!(f, "dmg"),
        }
    }
}

impl InstallerKind {
    /// Determine the kind of `origin` from its extension unless `explicit`
    /// is given.
    ///
    /// For URLs only the path component counts; query and fragment are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::UnknownType`] when there is no extension or it
    /// is neither `.pkg` nor `.dmg`.
    pub fn detect(origin: &str, explicit: Option<Self>) -> Result<Self, InstallError> {
        if let Some(kind) = explicit {
            return Ok(kind);
        }
        let name = file_name_of(origin);
        let Some((_, ext)) = name.rsplit_once('.') else {
            return Err(InstallError::UnknownType {
                origin: origin.to_string(),
                reason: "Unable to determine the file type".to_string(),
            });
        };
        match ext.to_ascii_lowercase().as_str() {
            "pkg" | "mpkg" => Ok(Self::Pkg),
            "dmg" => Ok(Self::Dmg),
            other => Err(InstallError::UnknownType {
                origin: origin.to_string(),
                reason: format!("Unrecognized file extension: .{other}"),
            }),
        }
    }
}

/// Whether `s` is an `http://` or `https://` URL with a host.
#[must_use]
pub fn is_url(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    rest.is_some_and(|r| {
        r.split(['/', '?', '#'])
            .next()
            .is_some_and(|host| !host.is_empty())
    })
}

/// Last path segment of a path or URL, without query or fragment.
fn file_name_of(origin: &str) -> &str {
    let without_query = if is_url(origin) {
        origin.split(['?', '#']).next().unwrap_or(origin)
    } else {
        origin
    };
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
}

/// Expected SHA-256 digest of the installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum(String);

impl Checksum {
    /// Parse `sha256:<hex>` or a bare 64-character hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Options`] for any other algorithm or a
    /// malformed digest.
    pub fn parse(s: &str) -> Result<Self, InstallError> {
        let s = s.trim();
        let hex = match s.split_once(':') {
            Some((algo, hex)) if algo.eq_ignore_ascii_case("sha256") => hex,
            Some((algo, _)) => {
                return Err(InstallError::Options(format!(
                    "unsupported checksum algorithm '{algo}' (only sha256 is supported)"
                )));
            }
            None => s,
        };
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InstallError::Options(format!(
                "checksum must be 64 hex characters, got '{hex}'"
            )));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// The lowercase hex digest.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

/// Compute the SHA-256 hex digest of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn compute_sha256(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(buf.get(..n).unwrap_or_default());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Downloads a URL to a local file.
#[cfg_attr(test, mockall::automock)]
pub trait Fetcher: Send + Sync + fmt::Debug {
    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures, non-success HTTP statuses,
    /// or I/O errors while writing `dest`.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Production [`Fetcher`] backed by a [`ureq::Agent`].
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher").finish_non_exhaustive()
    }
}

impl HttpFetcher {
    /// Create a fetcher whose whole transfer must finish within `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(CONNECT_TIMEOUT)))
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::StatusCode(code) => anyhow::anyhow!("HTTP status {code}"),
            other => anyhow::anyhow!("{other}"),
        })?;
        let mut reader = response.into_body().into_reader();
        let mut file =
            fs::File::create(dest).with_context(|| format!("creating {}", dest.display()))?;
        io::copy(&mut reader, &mut file).with_context(|| format!("writing {}", dest.display()))
    }
}

/// A resolved installer on local disk.
///
/// Downloaded files live in a private temporary directory that is removed
/// when the source is dropped.
#[derive(Debug)]
pub struct InstallerSource {
    /// The `source` argument as given.
    pub origin: String,
    /// Local path of the installer.
    pub path: PathBuf,
    /// Container format.
    pub kind: InstallerKind,
    download_dir: Option<tempfile::TempDir>,
}

impl InstallerSource {
    /// Resolve `origin` to a local file, downloading it when it is a URL and
    /// verifying `checksum` when given.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::UnknownType`] when the kind cannot be
    /// determined, and [`InstallError::Fetch`] when the file is missing,
    /// the download fails, or the checksum does not match.
    pub fn resolve(
        origin: &str,
        explicit: Option<InstallerKind>,
        checksum: Option<&Checksum>,
        fetcher: &dyn Fetcher,
        log: &dyn Log,
    ) -> Result<Self, InstallError> {
        let kind = InstallerKind::detect(origin, explicit)?;

        let source = if is_url(origin) {
            Self::download(origin, kind, fetcher, log)?
        } else {
            let path = Path::new(origin);
            if !path.is_file() && !path.is_dir() {
                return Err(InstallError::fetch(origin, "no such file"));
            }
            let path = dunce::canonicalize(path)
                .map_err(|e| InstallError::fetch(origin, e.to_string()))?;
            log.debug(&format!("using local installer {}", path.display()));
            Self {
                origin: origin.to_string(),
                path,
                kind,
                download_dir: None,
            }
        };

        if let Some(expected) = checksum {
            source.verify(expected, log)?;
        }
        Ok(source)
    }

    fn download(
        url: &str,
        kind: InstallerKind,
        fetcher: &dyn Fetcher,
        log: &dyn Log,
    ) -> Result<Self, InstallError> {
        let dir = tempfile::Builder::new()
            .prefix("macos-pkg-download-")
            .tempdir()
            .map_err(|e| InstallError::fetch(url, format!("creating download directory: {e}")))?;
        mount::register_scratch_dir(dir.path());

        let name = file_name_of(url);
        let name = if name.is_empty() || name.contains(':') || !name.contains('.') {
            format!("installer.{kind}")
        } else {
            name.to_string()
        };
        let dest = dir.path().join(name);

        log.info(&format!("downloading {url}"));
        let bytes = fetcher.fetch(url, &dest).map_err(|e| {
            mount::unregister_scratch_dir(dir.path());
            InstallError::fetch(url, format!("{e:#}"))
        })?;
        log.debug(&format!("downloaded {bytes} bytes to {}", dest.display()));

        Ok(Self {
            origin: url.to_string(),
            path: dest,
            kind,
            download_dir: Some(dir),
        })
    }

    fn verify(&self, expected: &Checksum, log: &dyn Log) -> Result<(), InstallError> {
        if self.path.is_dir() {
            return Err(InstallError::fetch(
                &self.origin,
                "checksum cannot be verified for a bundle package directory",
            ));
        }
        let actual = compute_sha256(&self.path)
            .map_err(|e| InstallError::fetch(&self.origin, format!("{e:#}")))?;
        if actual != expected.as_hex() {
            return Err(InstallError::fetch(
                &self.origin,
                format!(
                    "checksum mismatch (expected sha256:{}, got sha256:{actual})",
                    expected.as_hex()
                ),
            ));
        }
        log.debug(&format!("checksum verified: sha256:{actual}"));
        Ok(())
    }

    /// Whether the installer was downloaded (and will be removed on drop).
    #[must_use]
    pub const fn is_downloaded(&self) -> bool {
        self.download_dir.is_some()
    }
}

impl Drop for InstallerSource {
    fn drop(&mut self) {
        if let Some(dir) = &self.download_dir {
            mount::unregister_scratch_dir(dir.path());
        }
    }
}
