//! Idempotent installer for macOS `.pkg` and `.dmg` files.
//!
//! Given a local path or http(s) URL, the installer fetches the file,
//! mounts disk images read-only, reads the package's identifier and
//! version, and runs `installer` (or copies an `.app` bundle) only when the
//! software is missing or older than the candidate.
//!
//! The public API is organised into four layers:
//!
//! - **[`source`], [`artifact`], [`package_info`]**: fetch and inspect an installer
//! - **[`resources`]**: idempotent `check + apply` primitives (receipts, app bundles)
//! - **[`install`]**: the pipeline that ties them together and guarantees cleanup
//! - **[`commands`]**: the `install` CLI and the Ansible `module` front ends
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod artifact;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod install;
pub mod logging;
pub mod mount;
pub mod package_info;
pub mod platform;
pub mod plist;
pub mod resources;
pub mod source;
pub mod version;
