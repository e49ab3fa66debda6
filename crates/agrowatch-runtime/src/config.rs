//! Configuration for the telemetry context.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! file, then `AGROWATCH_*` environment variables using `__` between
//! sections (`AGROWATCH_ALERTS__COOLDOWN_SECS=600`).

use std::time::Duration;

use agrowatch_alerts::{AlertConfig, EmailConfig};
use agrowatch_health::HealthConfig;
use agrowatch_metrics::{MetricsConfig, SamplerConfig};
use serde::{Deserialize, Serialize};

use crate::error::{TelemetryError, TelemetryResult};

/// Main telemetry configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Global monitoring switch and request tracking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// When false, observations and requests are ignored
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests slower than this are logged
    #[serde(default = "default_slow_request_secs")]
    pub slow_request_secs: f64,

    /// Number of recent response times averaged
    #[serde(default = "default_response_window")]
    pub response_window: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            slow_request_secs: default_slow_request_secs(),
            response_window: default_response_window(),
        }
    }
}

impl MonitoringConfig {
    pub fn slow_request_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.slow_request_secs.max(0.0))
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_slow_request_secs() -> f64 {
    2.0
}

fn default_response_window() -> usize {
    agrowatch_metrics::DEFAULT_RESPONSE_WINDOW
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TelemetryConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> TelemetryResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&TelemetryConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("AGROWATCH")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("email.to")
                .try_parsing(true),
        );

        let config: TelemetryConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero intervals and capacities, bad thresholds and duplicate rules
    pub fn validate(&self) -> TelemetryResult<()> {
        let positive = [
            ("metrics.histogram_capacity", self.metrics.histogram_capacity as u64),
            ("metrics.metric_buffer_capacity", self.metrics.metric_buffer_capacity as u64),
            ("monitoring.response_window", self.monitoring.response_window as u64),
            ("sampler.interval_secs", self.sampler.interval_secs),
            ("health.interval_secs", self.health.interval_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(TelemetryError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    key
                )));
            }
        }

        if !self.monitoring.slow_request_secs.is_finite() || self.monitoring.slow_request_secs < 0.0 {
            return Err(TelemetryError::InvalidConfig(
                "monitoring.slow_request_secs must be a non-negative number".into(),
            ));
        }

        self.alerts.validate()?;
        Ok(())
    }
}
