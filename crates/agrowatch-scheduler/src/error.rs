//! Error types for agrowatch-scheduler.

use thiserror::Error;

/// Error returned by a single job cycle.
pub type CycleError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a single job cycle.
pub type CycleResult = Result<(), CycleError>;

/// Errors raised while controlling a periodic task.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The loop did not finish its current cycle within the stop timeout
    /// and was aborted.
    #[error("task {task} did not stop within {waited_ms}ms and was aborted")]
    StopTimedOut { task: String, waited_ms: u64 },

    /// The loop terminated abnormally.
    #[error("task {task} terminated abnormally: {reason}")]
    Terminated { task: String, reason: String },
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
