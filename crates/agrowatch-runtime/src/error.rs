//! Error types for agrowatch-runtime.

use agrowatch_alerts::AlertError;
use agrowatch_health::HealthError;
use agrowatch_metrics::MetricsError;
use thiserror::Error;

/// Errors raised while building, configuring or running the telemetry context.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Loading the layered configuration failed.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration loaded but is not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A global subscriber is already installed, or the filter is malformed.
    #[error("logging initialization failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Alert(#[from] AlertError),
}

/// Result type for runtime operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
