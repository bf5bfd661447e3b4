//! Property list lookups via `plutil`.
use std::path::Path;

use anyhow::Result;

use crate::exec::Executor;

/// Read a string value from a property list.
///
/// Returns `Ok(None)` when the key is absent or the file is unreadable;
/// `plutil` reports both as a non-zero exit.
///
/// # Errors
///
/// Returns an error only if `plutil` cannot be spawned.
pub fn read_string(executor: &dyn Executor, plist: &Path, key: &str) -> Result<Option<String>> {
    let plist = plist.to_string_lossy();
    let result = executor.run_unchecked("plutil", &["-extract", key, "raw", "-o", "-", &plist])?;
    if !result.success {
        return Ok(None);
    }
    let value = result.stdout.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

/// Read the first present key out of `keys`.
///
/// # Errors
///
/// Returns an error only if `plutil` cannot be spawned.
pub fn read_first(executor: &dyn Executor, plist: &Path, keys: &[&str]) -> Result<Option<String>> {
    for key in keys {
        if let Some(value) = read_string(executor, plist, key)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}
