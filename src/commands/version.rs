//! Command: print version information.

/// Print the macos-pkg version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("macos-pkg {}", super::version_string());
}
