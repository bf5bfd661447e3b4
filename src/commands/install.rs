//! Command: install a package or disk image from the command line.

use anyhow::Result;

use crate::cli::InstallOpts;
use crate::exec::Executor;
use crate::install::{self, Context, TaskOutcome};
use crate::logging::Logger;
use crate::platform::Platform;
use crate::source::HttpFetcher;

/// One-line result shown after the summary.
fn describe(outcome: &TaskOutcome) -> String {
    let status = if outcome.changed { "changed" } else { "ok" };
    format!("{status}: {}", outcome.msg)
}

/// Run the install command.
///
/// # Errors
///
/// Returns an error if the options are invalid, the host is not a usable
/// macOS system, or any pipeline step fails.
pub fn run(opts: &InstallOpts, executor: &dyn Executor, platform: Platform, log: &Logger) -> Result<()> {
    log.info(&format!("macos-pkg {}", super::version_string()));
    let options = opts.to_options()?;
    platform.check(executor)?;

    let fetcher = HttpFetcher::new(options.timeout);
    let ctx = Context {
        executor,
        fetcher: &fetcher,
        log,
    };
    let result = install::run(&options, &ctx);
    log.print_summary();

    let outcome = result?;
    log.info(&describe(&outcome));
    Ok(())
}
