// Shared helpers for integration tests.
//
// Provides `FakeMac`, an `Executor` that simulates the macOS tools the
// installer shells out to (hdiutil, pkgutil, tar, installer, plutil, cp)
// against real temporary directories, and `StubFetcher`, a `Fetcher` that
// never touches the network.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, bail};
use macos_pkg::exec::{ExecResult, Executor};
use macos_pkg::logging::Logger;
use macos_pkg::source::Fetcher;

/// Identifier declared by the fixture package.
pub const PKG_ID: &str = "com.example.tool";

/// `PackageInfo` document for a fixture package at `version`.
pub fn package_info_xml(version: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<pkg-info format-version="2" identifier="{PKG_ID}" version="{version}" install-location="/" auth="root">
    <payload numberOfFiles="3" installKBytes="120"/>
    <bundle path="./Tool.app" id="{PKG_ID}" CFBundleVersion="{version}"/>
</pkg-info>"#
    )
}

/// What `hdiutil attach` reveals on the mounted volume.
#[derive(Debug, Clone)]
pub enum Volume {
    /// A flat package named `Tool.pkg`.
    Package,
    /// An application bundle `Tool.app` with the given version.
    Application(String),
    /// Nothing installable.
    Empty,
}

/// Write a fake `Info.plist` (one `key=value` per line, read back by the
/// fake `plutil`).
pub fn write_info_plist(bundle: &Path, entries: &[(&str, &str)]) {
    let contents = bundle.join("Contents");
    fs::create_dir_all(&contents).unwrap();
    let body: String = entries.iter().map(|(k, v)| format!("{k}={v}\n")).collect();
    fs::write(contents.join("Info.plist"), body).unwrap();
}

fn copy_dir(src: &Path, dest: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

fn clear_dir(dir: &Path) {
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir_all(path).ok();
            } else {
                fs::remove_file(path).ok();
            }
        }
    }
}

fn ok(stdout: impl Into<String>) -> ExecResult {
    ExecResult {
        stdout: stdout.into(),
        stderr: String::new(),
        success: true,
        code: Some(0),
    }
}

fn fail(stderr: impl Into<String>) -> ExecResult {
    ExecResult {
        stdout: String::new(),
        stderr: stderr.into(),
        success: false,
        code: Some(1),
    }
}

/// A simulated macOS host.
#[derive(Debug)]
pub struct FakeMac {
    calls: Mutex<Vec<String>>,
    receipts: Mutex<BTreeMap<String, String>>,
    mounted: Mutex<Vec<PathBuf>>,
    volume: Volume,
    package_version: String,
    installer_ok: bool,
    detach_ok: bool,
}

impl FakeMac {
    /// A host with no receipts whose disk images hold a `Tool.pkg` at
    /// version `1.0`.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            receipts: Mutex::new(BTreeMap::new()),
            mounted: Mutex::new(Vec::new()),
            volume: Volume::Package,
            package_version: "1.0".to_string(),
            installer_ok: true,
            detach_ok: true,
        }
    }

    /// Record an installed receipt.
    pub fn with_receipt(self, id: &str, version: &str) -> Self {
        self.receipts
            .lock()
            .unwrap()
            .insert(id.to_string(), version.to_string());
        self
    }

    /// Set what mounted images contain.
    pub fn with_volume(mut self, volume: Volume) -> Self {
        self.volume = volume;
        self
    }

    /// Set the version the fixture package declares.
    pub fn with_package_version(mut self, version: &str) -> Self {
        self.package_version = version.to_string();
        self
    }

    /// Make `installer` fail.
    pub fn failing_installer(mut self) -> Self {
        self.installer_ok = false;
        self
    }

    /// Make `hdiutil detach` fail, even with `-force`.
    pub fn busy_volume(mut self) -> Self {
        self.detach_ok = false;
        self
    }

    /// Every command issued, as `"program arg1 arg2 …"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Commands whose line starts with `prefix`.
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    /// Mount points attached and not yet detached.
    pub fn mounted(&self) -> Vec<PathBuf> {
        self.mounted.lock().unwrap().clone()
    }

    /// Installed receipt version for `id`.
    pub fn receipt(&self, id: &str) -> Option<String> {
        self.receipts.lock().unwrap().get(id).cloned()
    }

    fn attach(&self, args: &[&str]) -> ExecResult {
        let Some(mp) = args
            .iter()
            .position(|a| *a == "-mountpoint")
            .and_then(|i| args.get(i + 1))
        else {
            return fail("hdiutil: attach: missing -mountpoint");
        };
        let mp = PathBuf::from(mp);
        match &self.volume {
            Volume::Package => fs::write(mp.join("Tool.pkg"), b"xar!").unwrap(),
            Volume::Application(version) => write_info_plist(
                &mp.join("Tool.app"),
                &[
                    ("CFBundleIdentifier", PKG_ID),
                    ("CFBundleShortVersionString", version.as_str()),
                ],
            ),
            Volume::Empty => {}
        }
        // Finder artefacts the scan must ignore.
        fs::create_dir_all(mp.join(".background")).unwrap();
        self.mounted.lock().unwrap().push(mp);
        ok("/dev/disk4s1\tApple_HFS\t/private/tmp/mnt\n")
    }

    fn detach(&self, args: &[&str]) -> ExecResult {
        if !self.detach_ok {
            return fail("hdiutil: couldn't unmount \"disk4\" - Resource busy");
        }
        let Some(mp) = args.get(1) else {
            return fail("hdiutil: detach: missing device");
        };
        let mp = PathBuf::from(mp);
        clear_dir(&mp);
        self.mounted.lock().unwrap().retain(|m| *m != mp);
        ok("\"disk4\" ejected.\n")
    }

    fn plutil(args: &[&str]) -> ExecResult {
        let (Some(key), Some(plist)) = (args.get(1), args.last()) else {
            return fail("plutil: bad arguments");
        };
        let Ok(body) = fs::read_to_string(plist) else {
            return fail(format!("{plist}: file does not exist or is not readable"));
        };
        body.lines()
            .find_map(|l| l.strip_prefix(&format!("{key}=")).map(str::to_string))
            .map_or_else(
                || fail(format!("Could not extract value, error: No value at that key path ({key})")),
                |v| ok(format!("{v}\n")),
            )
    }

    fn installer(&self, args: &[&str]) -> ExecResult {
        if !self.installer_ok {
            return ExecResult {
                stdout: "installer: Package name is Tool\n".to_string(),
                stderr: "installer: Error - The package is damaged.\n".to_string(),
                success: false,
                code: Some(1),
            };
        }
        if !args.first().is_some_and(|a| *a == "-pkg") {
            return fail("installer: usage");
        }
        self.receipts
            .lock()
            .unwrap()
            .insert(PKG_ID.to_string(), self.package_version.clone());
        ok("installer: Package name is Tool\ninstaller: Upgrading at base path /\ninstaller: The upgrade was successful.\n")
    }

    fn cp(args: &[&str]) -> ExecResult {
        let (Some(src), Some(dest)) = (args.get(1), args.get(2)) else {
            return fail("usage: cp -R source target");
        };
        let src = Path::new(src);
        let Some(name) = src.file_name() else {
            return fail("cp: bad source");
        };
        match copy_dir(src, &Path::new(dest).join(name)) {
            Ok(()) => ok(""),
            Err(e) => fail(format!("cp: {e}")),
        }
    }

    fn dispatch(&self, program: &str, args: &[&str]) -> ExecResult {
        match (program, args.first().copied()) {
            ("hdiutil", Some("attach")) => self.attach(args),
            ("hdiutil", Some("detach")) => self.detach(args),
            ("pkgutil", Some("--pkgs")) => {
                let receipts = self.receipts.lock().unwrap();
                let mut out = String::from("com.apple.pkg.Core\n");
                for id in receipts.keys() {
                    out.push_str(id);
                    out.push('\n');
                }
                ok(out)
            }
            ("pkgutil", Some("--pkg-info")) => {
                let id = args.get(1).copied().unwrap_or_default();
                self.receipts.lock().unwrap().get(id).map_or_else(
                    || fail(format!("No receipt for '{id}' found at '/'.")),
                    |v| {
                        ok(format!(
                            "package-id: {id}\nversion: {v}\nvolume: /\nlocation: /\ninstall-time: 1700000000\n"
                        ))
                    },
                )
            }
            ("tar", Some("-tf")) => ok("Distribution\nResources/\ntool.pkg/\ntool.pkg/PackageInfo\ntool.pkg/Payload\n"),
            ("tar", Some("-xOqf")) => ok(package_info_xml(&self.package_version)),
            ("installer", _) => self.installer(args),
            ("plutil", Some("-extract")) => Self::plutil(args),
            ("cp", Some("-R")) => Self::cp(args),
            _ => fail(format!("{program}: command not simulated")),
        }
    }
}

impl Executor for FakeMac {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let result = self.run_unchecked(program, args)?;
        if !result.success {
            bail!("{program} failed: {}", result.combined_output());
        }
        Ok(result)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.lock().unwrap().push(line);
        Ok(self.dispatch(program, args))
    }

    fn which(&self, _: &str) -> bool {
        true
    }
}

/// A [`Fetcher`] that writes canned bytes, or fails with a canned message.
#[derive(Debug)]
pub struct StubFetcher {
    response: std::result::Result<Vec<u8>, String>,
    fetched: Mutex<Vec<(String, PathBuf)>>,
}

impl StubFetcher {
    /// Serve `body` for every URL.
    pub fn serving(body: &[u8]) -> Self {
        Self {
            response: Ok(body.to_vec()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Fail every request with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            response: Err(reason.to_string()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// `(url, destination)` of every request.
    pub fn fetched(&self) -> Vec<(String, PathBuf)> {
        self.fetched.lock().unwrap().clone()
    }
}

impl Fetcher for StubFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        self.fetched
            .lock()
            .unwrap()
            .push((url.to_string(), dest.to_path_buf()));
        match &self.response {
            Ok(body) => {
                fs::write(dest, body)?;
                Ok(u64::try_from(body.len())?)
            }
            Err(reason) => bail!("{reason}"),
        }
    }
}

/// A logger that writes its file under a throwaway name.
pub fn logger() -> Logger {
    Logger::new("integration-test")
}

/// A local installer file named `name` inside a fresh temporary directory.
pub fn installer_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    fs::write(&path, b"installer bytes").unwrap();
    (dir, path)
}
