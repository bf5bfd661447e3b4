//! Top-level subcommand orchestration (`install`, `module`, `version`).
pub mod install;
pub mod module;
pub mod version;

/// Version string set at build time, falling back to the crate version.
#[must_use]
pub fn version_string() -> &'static str {
    option_env!("MACOS_PKG_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}
