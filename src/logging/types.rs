//! Core logging types: step entries, status, and the [`Log`] trait.

/// Pipeline step result for summary reporting.
#[derive(Debug, Clone)]
pub struct StepEntry {
    /// Human-readable step name.
    pub name: String,
    /// Final status of the step.
    pub status: StepStatus,
    /// Optional detail message (e.g., skip reason or error description).
    pub message: Option<String>,
}

/// Status of a completed pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Step completed and changed nothing that needs reporting.
    Ok,
    /// Step made a change on the host.
    Changed,
    /// Step was not needed (e.g., software already installed).
    Skipped,
    /// Step ran in check mode; no changes were applied.
    DryRun,
    /// Step failed.
    Failed,
}

/// Abstraction over logging backends.
///
/// The pipeline logs through this trait so tests can pass a [`Logger`]
/// without installing a global subscriber.
///
/// [`Logger`]: super::Logger
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a check-mode action message.
    fn dry_run(&self, msg: &str);
    /// Record a step result for the summary.
    fn record_step(&self, name: &str, status: StepStatus, message: Option<&str>);
}
