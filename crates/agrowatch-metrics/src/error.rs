//! Error types for agrowatch-metrics.

use agrowatch_scheduler::SchedulerError;
use thiserror::Error;

/// Errors that can occur while collecting metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The host figures could not be read at all.
    #[error("system source unavailable: {0}")]
    SourceUnavailable(String),

    /// The blocking sampling call did not complete.
    #[error("sampling task failed: {0}")]
    SamplingTask(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Result type for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;
