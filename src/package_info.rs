//! Read the identifier and version a package declares about itself.
//!
//! Flat packages are xar archives; `tar` on macOS reads them directly, so
//! the `PackageInfo` document is listed with `tar -tf` and extracted with
//! `tar -xOqf`.  Distribution ("product") archives carry one `PackageInfo`
//! per component; the first one is used.  Legacy bundle packages keep the
//! same data in `Contents/Info.plist`.
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::InstallError;
use crate::exec::Executor;
use crate::plist;

/// Identity of a package as recorded by its receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// Receipt identifier, e.g. `com.google.pkg.Keystone`.
    pub identifier: String,
    /// Package version, whitespace removed.
    pub version: String,
}

fn metadata_error(pkg: &Path, reason: impl Into<String>) -> InstallError {
    InstallError::Metadata {
        package: pkg.display().to_string(),
        reason: reason.into(),
    }
}

/// Read package properties from a flat or bundle package.
///
/// # Errors
///
/// Returns [`InstallError::Metadata`] when no `PackageInfo` exists or it
/// lacks an identifier or version.
pub fn read(pkg: &Path, executor: &dyn Executor) -> Result<PackageInfo, InstallError> {
    if pkg.is_dir() {
        return read_bundle(pkg, executor);
    }

    let pkg_arg = pkg.to_string_lossy();
    let listing = executor
        .run("tar", &["-tf", &pkg_arg])
        .map_err(|e| metadata_error(pkg, format!("{e:#}")))?;
    let entry = listing
        .stdout
        .lines()
        .map(str::trim)
        .find(|l| l.trim_end_matches('/').ends_with("PackageInfo"))
        .ok_or_else(|| {
            metadata_error(pkg, "the \"PackageInfo\" file does not exist in the PKG")
        })?;

    let xml = executor
        .run("tar", &["-xOqf", &pkg_arg, entry])
        .map_err(|e| metadata_error(pkg, format!("{e:#}")))?;
    parse(&xml.stdout).map_err(|reason| metadata_error(pkg, reason))
}

fn read_bundle(pkg: &Path, executor: &dyn Executor) -> Result<PackageInfo, InstallError> {
    let package_info = pkg.join("Contents").join("PackageInfo");
    if let Ok(xml) = fs::read_to_string(&package_info) {
        return parse(&xml).map_err(|reason| metadata_error(pkg, reason));
    }

    let info_plist = pkg.join("Contents").join("Info.plist");
    let identifier = plist::read_string(executor, &info_plist, "CFBundleIdentifier")?
        .ok_or_else(|| metadata_error(pkg, "bundle package has no CFBundleIdentifier"))?;
    let version = plist::read_first(
        executor,
        &info_plist,
        &["CFBundleShortVersionString", "CFBundleVersion"],
    )?
    .ok_or_else(|| metadata_error(pkg, "Package does not specify its version number"))?;
    Ok(PackageInfo {
        identifier,
        version: strip_whitespace(&version),
    })
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[allow(clippy::expect_used)]
static PKG_INFO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<pkg-info(\s[^>]*?)?/?>").expect("valid pkg-info regex"));
#[allow(clippy::expect_used)]
static BUNDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<bundle(\s[^>]*?)?/?>").expect("valid bundle regex"));
#[allow(clippy::expect_used)]
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w.:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid attribute regex")
});

/// Collect the attributes of the first element `element` matches in `xml`.
fn element_attributes(xml: &str, element: &Regex) -> Option<Vec<(String, String)>> {
    let captures = element.captures(xml)?;
    let body = captures.get(1).map_or("", |m| m.as_str());
    let attrs = ATTRIBUTE_RE
        .captures_iter(body)
        .filter_map(|c| {
            let name = c.get(1)?.as_str().to_string();
            let value = c.get(2).or_else(|| c.get(3))?.as_str();
            Some((name, unescape(value)))
        })
        .collect();
    Some(attrs)
}

fn unescape(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn lookup<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.trim().is_empty())
}

/// Parse a `PackageInfo` document.
///
/// The version comes from the `pkg-info` element (that is what `pkgutil`
/// records in the receipt) and falls back to the first `bundle` element's
/// `CFBundleVersion`.
///
/// # Errors
///
/// Returns a description of what is missing.
pub fn parse(xml: &str) -> Result<PackageInfo, String> {
    let pkg_info = element_attributes(xml, &PKG_INFO_RE)
        .ok_or_else(|| "no <pkg-info> element in PackageInfo".to_string())?;

    let identifier = lookup(&pkg_info, "identifier")
        .ok_or_else(|| "PackageInfo does not specify an identifier".to_string())?
        .trim()
        .to_string();

    let version = match lookup(&pkg_info, "version") {
        Some(v) => v.to_string(),
        None => element_attributes(xml, &BUNDLE_RE)
            .as_deref()
            .and_then(|attrs| lookup(attrs, "CFBundleVersion"))
            .map(str::to_string)
            .ok_or_else(|| {
                "Package does not specify its version number - PKG may be invalid".to_string()
            })?,
    };

    Ok(PackageInfo {
        identifier,
        version: strip_whitespace(&version),
    })
}
