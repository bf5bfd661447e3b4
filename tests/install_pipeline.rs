#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for the install pipeline.
//!
//! Each test drives [`install::run`] against a simulated macOS host
//! ([`common::FakeMac`]) and checks both the reported outcome and the
//! commands that were (or were not) issued.

mod common;

use std::path::{Path, PathBuf};

use common::*;
use macos_pkg::config::InstallOptions;
use macos_pkg::error::InstallError;
use macos_pkg::install::{self, Context, TaskOutcome};
use macos_pkg::mount;
use macos_pkg::source::Checksum;

fn run(
    opts: &InstallOptions,
    mac: &FakeMac,
    fetcher: &StubFetcher,
) -> Result<TaskOutcome, InstallError> {
    let log = logger();
    let ctx = Context {
        executor: mac,
        fetcher,
        log: &log,
    };
    install::run(opts, &ctx)
}

fn options(path: &Path) -> InstallOptions {
    InstallOptions::new(path.to_str().unwrap())
}

/// Mount point passed to the first `hdiutil attach`.
fn attached_mount_point(mac: &FakeMac) -> PathBuf {
    let attach = mac.calls_starting_with("hdiutil attach").remove(0);
    let (_, mp) = attach.split_once("-mountpoint ").unwrap();
    PathBuf::from(mp)
}

// ---------------------------------------------------------------------------
// Pre-check
// ---------------------------------------------------------------------------

/// Already-installed software is detected from the `id` hint alone: nothing
/// is downloaded, mounted or installed.
#[test]
fn installed_software_skips_fetch_mount_and_install() {
    let mac = FakeMac::new().with_receipt(PKG_ID, "2.0");
    let fetcher = StubFetcher::serving(b"koly");
    let mut opts = InstallOptions::new("https://downloads.example.com/Tool.dmg");
    opts.id = Some(PKG_ID.to_string());
    opts.version = Some("1.5".to_string());

    let outcome = run(&opts, &mac, &fetcher).unwrap();

    assert!(!outcome.changed);
    assert_eq!(outcome.version_installed.as_deref(), Some("2.0"));
    assert!(fetcher.fetched().is_empty());
    assert_eq!(
        mac.calls(),
        vec!["pkgutil --pkgs", "pkgutil --pkg-info com.example.tool"]
    );
}

/// An installed version below the `version` hint falls through to a normal
/// install.
#[test]
fn older_installed_version_falls_through_precheck() {
    let mac = FakeMac::new()
        .with_receipt(PKG_ID, "0.9")
        .with_package_version("1.0");
    let (_dir, pkg) = installer_file("Tool.pkg");
    let mut opts = options(&pkg);
    opts.id = Some(PKG_ID.to_string());
    opts.version = Some("1.0".to_string());

    let outcome = run(&opts, &mac, &StubFetcher::failing("unused")).unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.previous_version.as_deref(), Some("0.9"));
    assert_eq!(mac.receipt(PKG_ID).as_deref(), Some("1.0"));
}

// ---------------------------------------------------------------------------
// Disk images
// ---------------------------------------------------------------------------

/// A DMG containing a PKG is attached, installed from and detached exactly
/// once, leaving no mounted volume behind.
#[test]
fn dmg_with_pkg_installs_and_detaches_once() {
    let mac = FakeMac::new();
    let (_dir, dmg) = installer_file("Tool.dmg");

    let outcome = run(&options(&dmg), &mac, &StubFetcher::failing("unused")).unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.identifier.as_deref(), Some(PKG_ID));
    assert_eq!(outcome.version_installed.as_deref(), Some("1.0"));
    assert!(outcome.pkg_path.as_deref().unwrap().ends_with("Tool.pkg"));
    assert!(outcome.warnings.is_empty());

    assert_eq!(mac.calls_starting_with("hdiutil attach").len(), 1);
    assert_eq!(mac.calls_starting_with("hdiutil detach").len(), 1);
    let installs = mac.calls_starting_with("installer");
    assert_eq!(installs.len(), 1);
    assert!(installs[0].ends_with("Tool.pkg -target /"));

    let mp = attached_mount_point(&mac);
    assert!(mac.mounted().is_empty());
    assert!(!mp.exists(), "mount point should be removed");
    assert!(!mount::active_mounts().contains(&mp));
    assert_eq!(mac.receipt(PKG_ID).as_deref(), Some("1.0"));
}

/// A failed install still detaches the image.
#[test]
fn failed_install_still_detaches() {
    let mac = FakeMac::new().failing_installer();
    let (_dir, dmg) = installer_file("Tool.dmg");

    let err = run(&options(&dmg), &mac, &StubFetcher::failing("unused")).unwrap_err();

    assert_eq!(err.kind(), "install");
    assert!(err.to_string().contains("The package is damaged"));
    assert_eq!(mac.calls_starting_with("hdiutil detach").len(), 1);
    assert!(mac.mounted().is_empty());
    assert!(mac.receipt(PKG_ID).is_none());
}

/// A DMG with nothing installable fails and is detached.
#[test]
fn empty_dmg_is_no_package_error() {
    let mac = FakeMac::new().with_volume(Volume::Empty);
    let (_dir, dmg) = installer_file("Empty.dmg");

    let err = run(&options(&dmg), &mac, &StubFetcher::failing("unused")).unwrap_err();

    assert_eq!(err.kind(), "no_package");
    assert!(mac.mounted().is_empty());
    assert!(mac.calls_starting_with("installer").is_empty());
}

/// A volume that will not detach is a warning, not a failure.
#[test]
fn busy_volume_is_reported_as_warning() {
    let mac = FakeMac::new().busy_volume();
    let (_dir, dmg) = installer_file("Tool.dmg");

    let outcome = run(&options(&dmg), &mac, &StubFetcher::failing("unused")).unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].starts_with("Unable to unmount"));
    let detaches = mac.calls_starting_with("hdiutil detach");
    assert_eq!(detaches.len(), 2);
    assert!(detaches[1].ends_with("-force"));
}

/// A DMG holding only an application bundle copies it into `location`,
/// and a second run is a no-op.
#[test]
fn app_bundle_dmg_is_copied_and_idempotent() {
    let apps = tempfile::tempdir().unwrap();
    let (_dir, dmg) = installer_file("Tool.dmg");
    let mut opts = options(&dmg);
    opts.location = Some(apps.path().to_str().unwrap().to_string());

    let mac = FakeMac::new().with_volume(Volume::Application("3.1".to_string()));
    let outcome = run(&opts, &mac, &StubFetcher::failing("unused")).unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.identifier.as_deref(), Some(PKG_ID));
    assert_eq!(outcome.version_installed.as_deref(), Some("3.1"));
    assert!(apps.path().join("Tool.app/Contents/Info.plist").is_file());
    assert_eq!(mac.calls_starting_with("cp -R").len(), 1);
    assert!(mac.calls_starting_with("installer").is_empty());

    let mac = FakeMac::new().with_volume(Volume::Application("3.1".to_string()));
    let outcome = run(&opts, &mac, &StubFetcher::failing("unused")).unwrap();
    assert!(!outcome.changed);
    assert!(mac.calls_starting_with("cp").is_empty());
    assert!(mac.mounted().is_empty());
}

/// Upgrading an application replaces the old bundle wholesale and leaves
/// no staging directory behind.
#[test]
fn app_bundle_upgrade_replaces_older_bundle() {
    let apps = tempfile::tempdir().unwrap();
    let installed = apps.path().join("Tool.app");
    write_info_plist(&installed, &[("CFBundleShortVersionString", "3.0")]);
    std::fs::write(installed.join("Contents/Stale.txt"), "old").unwrap();
    let (_dir, dmg) = installer_file("Tool.dmg");
    let mut opts = options(&dmg);
    opts.location = Some(apps.path().to_str().unwrap().to_string());

    let mac = FakeMac::new().with_volume(Volume::Application("3.1".to_string()));
    let outcome = run(&opts, &mac, &StubFetcher::failing("unused")).unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.previous_version.as_deref(), Some("3.0"));
    let plist = std::fs::read_to_string(installed.join("Contents/Info.plist")).unwrap();
    assert!(plist.contains("3.1"));
    assert!(!installed.join("Contents/Stale.txt").exists());
    let names: Vec<String> = std::fs::read_dir(apps.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["Tool.app".to_string()]);
}

/// The `app` hint finds an installed bundle without mounting anything.
#[test]
fn app_hint_precheck_skips_mount() {
    let apps = tempfile::tempdir().unwrap();
    write_info_plist(
        &apps.path().join("Tool.app"),
        &[("CFBundleShortVersionString", "3.1")],
    );
    let mac = FakeMac::new().with_volume(Volume::Application("3.1".to_string()));
    let mut opts = InstallOptions::new("https://downloads.example.com/Tool.dmg");
    opts.location = Some(apps.path().to_str().unwrap().to_string());
    opts.app = Some("Tool".to_string());
    opts.version = Some("3.0".to_string());
    let fetcher = StubFetcher::serving(b"koly");

    let outcome = run(&opts, &mac, &fetcher).unwrap();

    assert!(!outcome.changed);
    assert_eq!(
        outcome.pkg_path.map(PathBuf::from),
        Some(apps.path().join("Tool.app"))
    );
    assert!(fetcher.fetched().is_empty());
    assert!(mac.calls_starting_with("hdiutil").is_empty());
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// An unreachable URL is a fetch error and nothing is mounted.
#[test]
fn unreachable_url_is_fetch_error_without_mount() {
    let mac = FakeMac::new();
    let fetcher = StubFetcher::failing("Connection refused (os error 61)");
    let opts = InstallOptions::new("https://unreachable.example.com/Tool.dmg");

    let err = run(&opts, &mac, &fetcher).unwrap_err();

    assert_eq!(err.kind(), "fetch");
    assert!(err.to_string().contains("Connection refused"));
    assert!(mac.calls().is_empty());
}

/// A downloaded installer is removed once the task finishes.
#[test]
fn downloaded_installer_is_removed() {
    let mac = FakeMac::new();
    let fetcher = StubFetcher::serving(b"koly");
    let opts = InstallOptions::new("https://downloads.example.com/files/Tool.dmg?sig=abc");

    let outcome = run(&opts, &mac, &fetcher).unwrap();

    assert!(outcome.changed);
    let fetched = fetcher.fetched();
    assert_eq!(fetched.len(), 1);
    assert!(fetched[0].1.ends_with("Tool.dmg"));
    assert!(!fetched[0].1.exists(), "download should be cleaned up");
}

/// A checksum mismatch stops the task before any command runs.
#[test]
fn checksum_mismatch_is_fetch_error() {
    let mac = FakeMac::new();
    let (_dir, pkg) = installer_file("Tool.pkg");
    let mut opts = options(&pkg);
    opts.checksum = Some(
        Checksum::parse("sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
            .unwrap(),
    );

    let err = run(&opts, &mac, &StubFetcher::failing("unused")).unwrap_err();

    assert_eq!(err.kind(), "fetch");
    assert!(err.to_string().contains("checksum mismatch"));
    assert!(mac.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// A PKG without a matching receipt is installed.
#[test]
fn pkg_without_receipt_is_installed() {
    let mac = FakeMac::new();
    let (_dir, pkg) = installer_file("Tool.pkg");

    let outcome = run(&options(&pkg), &mac, &StubFetcher::failing("unused")).unwrap();

    assert!(outcome.changed);
    assert!(outcome.previous_version.is_none());
    assert!(mac.calls_starting_with("hdiutil").is_empty());
    assert_eq!(mac.calls_starting_with("installer -pkg").len(), 1);
}

/// Check mode reports the change without running `installer`.
#[test]
fn check_mode_never_installs() {
    let mac = FakeMac::new();
    let (_dir, dmg) = installer_file("Tool.dmg");
    let mut opts = options(&dmg);
    opts.check_mode = true;

    let outcome = run(&opts, &mac, &StubFetcher::failing("unused")).unwrap();

    assert!(outcome.changed);
    assert!(outcome.msg.starts_with("Would install"));
    assert!(mac.calls_starting_with("installer").is_empty());
    assert!(mac.receipt(PKG_ID).is_none());
    assert!(mac.mounted().is_empty());
}

/// The same version already installed is left alone.
#[test]
fn same_version_is_unchanged() {
    let mac = FakeMac::new().with_receipt(PKG_ID, "1.0");
    let (_dir, pkg) = installer_file("Tool.pkg");

    let outcome = run(&options(&pkg), &mac, &StubFetcher::failing("unused")).unwrap();

    assert!(!outcome.changed);
    assert_eq!(outcome.skipped_reason.as_deref(), Some("installed version is current"));
    assert!(mac.calls_starting_with("installer").is_empty());
}

/// A newer installed version is never downgraded.
#[test]
fn newer_installed_version_is_unchanged() {
    let mac = FakeMac::new().with_receipt(PKG_ID, "2.0");
    let (_dir, pkg) = installer_file("Tool.pkg");

    let outcome = run(&options(&pkg), &mac, &StubFetcher::failing("unused")).unwrap();

    assert!(!outcome.changed);
    assert_eq!(mac.receipt(PKG_ID).as_deref(), Some("2.0"));
}

/// An older installed version is upgraded.
#[test]
fn older_installed_version_is_upgraded() {
    let mac = FakeMac::new()
        .with_receipt(PKG_ID, "0.9")
        .with_package_version("1.0.1rev1");
    let (_dir, pkg) = installer_file("Tool.pkg");

    let outcome = run(&options(&pkg), &mac, &StubFetcher::failing("unused")).unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.previous_version.as_deref(), Some("0.9"));
    assert_eq!(mac.receipt(PKG_ID).as_deref(), Some("1.0.1rev1"));
}

/// `upgrade: false` keeps an older installed version.
#[test]
fn upgrade_disabled_keeps_older_version() {
    let mac = FakeMac::new().with_receipt(PKG_ID, "0.9");
    let (_dir, pkg) = installer_file("Tool.pkg");
    let mut opts = options(&pkg);
    opts.upgrade = false;

    let outcome = run(&opts, &mac, &StubFetcher::failing("unused")).unwrap();

    assert!(!outcome.changed);
    assert!(mac.calls_starting_with("installer").is_empty());
    assert_eq!(mac.receipt(PKG_ID).as_deref(), Some("0.9"));
}

/// `force` reinstalls the same version.
#[test]
fn force_reinstalls() {
    let mac = FakeMac::new().with_receipt(PKG_ID, "1.0");
    let (_dir, pkg) = installer_file("Tool.pkg");
    let mut opts = options(&pkg);
    opts.force = true;
    opts.allow_untrusted = true;

    let outcome = run(&opts, &mac, &StubFetcher::failing("unused")).unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.previous_version.as_deref(), Some("1.0"));
    let installs = mac.calls_starting_with("installer");
    assert_eq!(installs.len(), 1);
    assert!(installs[0].ends_with("-allowUntrusted"));
}
