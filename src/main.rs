//! Command-line entry point for macos-pkg.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use macos_pkg::cli::{Cli, Command};
use macos_pkg::exec::SystemExecutor;
use macos_pkg::logging::{self, ConsoleMode, Logger};
use macos_pkg::platform::Platform;
use macos_pkg::{commands, mount};

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    let name = args.command.name();
    let mode = if matches!(args.command, Command::Module(_)) {
        ConsoleMode::Stderr
    } else {
        ConsoleMode::Terminal
    };
    logging::init_subscriber(args.verbose, name, mode);
    if let Err(e) = mount::install_interrupt_handler() {
        tracing::warn!("{e:#}");
    }

    let log = Logger::new(name);
    let executor = SystemExecutor;
    let platform = Platform::detect();

    match args.command {
        Command::Install(opts) => {
            commands::install::run(&opts, &executor, platform, &log)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Module(opts) => Ok(commands::module::run(
            &opts.args_file,
            &executor,
            platform,
            &log,
        )),
        Command::Version => {
            commands::version::run();
            Ok(ExitCode::SUCCESS)
        }
    }
}
