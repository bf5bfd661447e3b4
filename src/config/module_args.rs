//! Ansible module arguments file.
//!
//! A binary module receives the path of a JSON file holding the task's
//! arguments, optionally wrapped in `ANSIBLE_MODULE_ARGS`.  Keys starting
//! with `_` are controller internals; only `_ansible_check_mode` is used.
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{DEFAULT_TIMEOUT_SECS, InstallOptions};
use crate::error::InstallError;
use crate::source::{Checksum, InstallerKind};

const WRAPPER_KEY: &str = "ANSIBLE_MODULE_ARGS";
const CHECK_MODE_KEY: &str = "_ansible_check_mode";

/// Raw task arguments as Ansible passes them.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModuleArgs {
    #[serde(alias = "src")]
    source: String,
    #[serde(default, rename = "type")]
    kind: Option<InstallerKind>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    allow_untrusted: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    force: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    upgrade: Option<bool>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    app: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    version: Option<String>,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    timeout: Option<u64>,
}

/// Interpret an Ansible boolean: `yes`/`no`, `true`/`false`, `on`/`off`,
/// `1`/`0`, case-insensitive, or a JSON bool or number.
fn parse_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
        Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "t" | "on" | "1" => Ok(true),
            "no" | "n" | "false" | "f" | "off" | "0" => Ok(false),
            other => Err(format!("'{other}' is not a valid boolean")),
        },
        other => Err(format!("{other} is not a valid boolean")),
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Option::<Value>::deserialize(d)?
        .filter(|v| !v.is_null())
        .map(|v| parse_bool(&v).map_err(de::Error::custom))
        .transpose()
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("{n} is not a valid timeout"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("'{s}' is not a valid timeout"))),
        Some(other) => Err(de::Error::custom(format!("{other} is not a valid timeout"))),
    }
}

/// YAML turns `version: 2.0` into a float; accept numbers as strings.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("{other} is not a valid version"))),
    }
}

fn options_error(reason: impl std::fmt::Display) -> InstallError {
    InstallError::Options(reason.to_string())
}

/// Parse the contents of an arguments file into validated options.
///
/// # Errors
///
/// Returns [`InstallError::Options`] for malformed JSON, unknown or
/// mistyped arguments, or options that fail validation.
pub fn parse(text: &str) -> Result<InstallOptions, InstallError> {
    let value: Value = serde_json::from_str(text).map_err(options_error)?;
    let Value::Object(mut map) = value else {
        return Err(options_error("module arguments must be a JSON object"));
    };
    if let Some(Value::Object(inner)) = map.remove(WRAPPER_KEY) {
        map = inner;
    }

    let check_mode = match map.get(CHECK_MODE_KEY) {
        Some(v) if !v.is_null() => parse_bool(v).map_err(options_error)?,
        _ => false,
    };
    let public: Map<String, Value> = map.into_iter().filter(|(k, _)| !k.starts_with('_')).collect();
    let args: ModuleArgs = serde_json::from_value(Value::Object(public)).map_err(options_error)?;

    let checksum = args.checksum.as_deref().map(Checksum::parse).transpose()?;
    let mut opts = InstallOptions::new(args.source);
    opts.kind = args.kind;
    opts.location = args.location;
    opts.allow_untrusted = args.allow_untrusted.unwrap_or(false);
    opts.force = args.force.unwrap_or(false);
    opts.upgrade = args.upgrade.unwrap_or(true);
    opts.id = args.id;
    opts.app = args.app;
    opts.version = args.version;
    opts.checksum = checksum;
    opts.timeout = Duration::from_secs(args.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));
    opts.check_mode = check_mode;
    opts.validate()?;
    Ok(opts)
}

/// Read and parse an arguments file.
///
/// # Errors
///
/// Returns [`InstallError::Options`] if the file cannot be read or parsed.
pub fn load(path: &Path) -> Result<InstallOptions, InstallError> {
    let text = fs::read_to_string(path)
        .map_err(|e| options_error(format!("reading {}: {e}", path.display())))?;
    parse(&text)
}
