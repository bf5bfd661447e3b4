//! Logging infrastructure for structured console and file output.

mod logger;
mod subscriber;
mod types;
mod utils;

pub use logger::Logger;
pub use subscriber::{ConsoleMode, init_subscriber};
pub use types::{Log, StepEntry, StepStatus};
