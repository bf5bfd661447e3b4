//! Command: run as an Ansible binary module.
//!
//! The controller passes the path of a JSON arguments file and reads
//! exactly one JSON object from stdout.  Logging never touches stdout; the
//! subscriber is initialised in stderr mode for this command.
use std::path::Path;
use std::process::ExitCode;

use serde_json::{Value, json};

use crate::config::module_args;
use crate::error::InstallError;
use crate::exec::Executor;
use crate::install::{self, Context, TaskOutcome};
use crate::logging::Logger;
use crate::platform::Platform;
use crate::source::HttpFetcher;

/// Render a task result as the module's JSON result object.
///
/// Failures carry `failed: true`, the error message and its kind.
#[must_use]
pub fn result_json(result: &Result<TaskOutcome, InstallError>) -> Value {
    let failure = |msg: String, kind: &str| {
        json!({
            "changed": false,
            "failed": true,
            "msg": msg,
            "error_kind": kind,
        })
    };
    match result {
        Ok(outcome) => match serde_json::to_value(outcome) {
            Ok(Value::Object(mut map)) => {
                map.insert("failed".to_string(), Value::Bool(false));
                Value::Object(map)
            }
            Ok(_) => failure("task result is not an object".to_string(), "other"),
            Err(e) => failure(format!("serializing task result: {e}"), "other"),
        },
        Err(e) => failure(e.to_string(), e.kind()),
    }
}

/// Parse the arguments file, check the platform and run the task.
///
/// # Errors
///
/// Returns the first [`InstallError`] encountered.
pub fn execute(
    args_file: &Path,
    executor: &dyn Executor,
    platform: Platform,
    log: &Logger,
) -> Result<TaskOutcome, InstallError> {
    let options = module_args::load(args_file)?;
    platform.check(executor)?;
    if options.check_mode {
        log.debug("running in check mode");
    }
    let fetcher = HttpFetcher::new(options.timeout);
    let ctx = Context {
        executor,
        fetcher: &fetcher,
        log,
    };
    install::run(&options, &ctx)
}

/// Run the module command and print its JSON result.
#[must_use]
#[allow(clippy::print_stdout)]
pub fn run(args_file: &Path, executor: &dyn Executor, platform: Platform, log: &Logger) -> ExitCode {
    let result = execute(args_file, executor, platform, log);
    println!("{}", result_json(&result));
    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
