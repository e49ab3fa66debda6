//! Error types for agrowatch-health.

use agrowatch_scheduler::SchedulerError;
use thiserror::Error;

/// Errors raised by health checks and the orchestrator.
#[derive(Debug, Error)]
pub enum HealthError {
    /// No check is registered under this name.
    #[error("health check '{0}' not found")]
    CheckNotFound(String),

    /// A check with this name is already registered.
    #[error("health check '{0}' already registered")]
    DuplicateCheck(String),

    /// A resource is above its configured threshold.
    #[error("{resource} usage {used_percent:.1}% exceeds threshold {threshold_percent}%")]
    ThresholdExceeded {
        resource: String,
        used_percent: f64,
        threshold_percent: f64,
    },

    /// The figures needed by a check could not be read.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A check failed for a reason of its own.
    #[error("{reason}")]
    CheckFailed { error_type: String, reason: String },

    /// The check panicked while running.
    #[error("health check panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl HealthError {
    /// Create a failure with a caller-chosen error type.
    pub fn failed(error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        HealthError::CheckFailed {
            error_type: error_type.into(),
            reason: reason.into(),
        }
    }

    /// Short classification reported as `error_type` on unhealthy results.
    pub fn error_type(&self) -> &str {
        match self {
            HealthError::CheckNotFound(_) => "CheckNotFound",
            HealthError::DuplicateCheck(_) => "DuplicateCheck",
            HealthError::ThresholdExceeded { .. } => "ThresholdExceeded",
            HealthError::ResourceUnavailable(_) => "ResourceUnavailable",
            HealthError::CheckFailed { error_type, .. } => error_type,
            HealthError::Panicked(_) => "Panic",
            HealthError::Scheduler(_) => "Scheduler",
        }
    }
}

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_and_message() {
        let err = HealthError::ThresholdExceeded {
            resource: "disk".into(),
            used_percent: 93.456,
            threshold_percent: 90.0,
        };
        assert_eq!(err.error_type(), "ThresholdExceeded");
        assert_eq!(err.to_string(), "disk usage 93.5% exceeds threshold 90%");

        let err = HealthError::failed("ConnectionRefused", "datastore unreachable");
        assert_eq!(err.error_type(), "ConnectionRefused");
        assert_eq!(err.to_string(), "datastore unreachable");
    }
}
