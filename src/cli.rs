//! Command-line interface definition.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, ArgGroup, Parser, Subcommand};

use crate::config::{DEFAULT_TIMEOUT_SECS, InstallOptions};
use crate::error::InstallError;
use crate::source::{Checksum, InstallerKind};

/// Top-level CLI entry point for the installer.
#[derive(Parser, Debug)]
#[command(
    name = "macos-pkg",
    about = "Idempotent PKG/DMG installer for macOS",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install a .pkg or .dmg unless it is already present
    Install(InstallOpts),
    /// Run as an Ansible binary module
    Module(ModuleOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Install(_) => "install",
            Self::Module(_) => "module",
            Self::Version => "version",
        }
    }
}

/// Options for the `install` subcommand.
#[derive(Parser, Debug, Clone)]
#[command(group(ArgGroup::new("hint").args(["id", "app"])))]
pub struct InstallOpts {
    /// Path or http(s) URL of the installer
    #[arg(short, long, visible_alias = "src")]
    pub source: String,

    /// Installer type, when the file name has no usable extension
    #[arg(long = "type", value_enum)]
    pub kind: Option<InstallerKind>,

    /// Target volume for packages, or folder for app bundles
    #[arg(short, long)]
    pub location: Option<String>,

    /// Install packages with untrusted or expired signatures
    #[arg(long)]
    pub allow_untrusted: bool,

    /// Install even if the same or a newer version is present
    #[arg(short, long)]
    pub force: bool,

    /// Keep an older installed version instead of upgrading it
    #[arg(long = "no-upgrade", action = ArgAction::SetFalse)]
    pub upgrade: bool,

    /// Receipt identifier to check before downloading
    #[arg(long)]
    pub id: Option<String>,

    /// Application bundle name to check before downloading
    #[arg(long)]
    pub app: Option<String>,

    /// Minimum installed version that counts as up to date
    #[arg(long, value_name = "VERSION", requires = "hint")]
    pub version: Option<String>,

    /// Expected SHA-256 of the installer (sha256:<hex>)
    #[arg(long)]
    pub checksum: Option<String>,

    /// Download timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Report what would change without changing anything
    #[arg(long, visible_alias = "dry-run")]
    pub check: bool,
}

impl InstallOpts {
    /// Convert to validated task options.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Options`] for a malformed checksum or
    /// inconsistent options.
    pub fn to_options(&self) -> Result<InstallOptions, InstallError> {
        let mut opts = InstallOptions::new(self.source.clone());
        opts.kind = self.kind;
        opts.location.clone_from(&self.location);
        opts.allow_untrusted = self.allow_untrusted;
        opts.force = self.force;
        opts.upgrade = self.upgrade;
        opts.id.clone_from(&self.id);
        opts.app.clone_from(&self.app);
        opts.version.clone_from(&self.version);
        opts.checksum = self.checksum.as_deref().map(Checksum::parse).transpose()?;
        opts.timeout = Duration::from_secs(self.timeout);
        opts.check_mode = self.check;
        opts.validate()?;
        Ok(opts)
    }
}

/// Options for the `module` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ModuleOpts {
    /// JSON file holding the module arguments
    pub args_file: PathBuf,
}
