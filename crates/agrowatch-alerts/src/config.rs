//! Alert engine configuration and the default threshold table.

use std::collections::HashSet;
use std::time::Duration;

use agrowatch_types::{ChannelId, Comparison, Severity};
use serde::{Deserialize, Serialize};

use crate::error::{AlertError, AlertResult};
use crate::rule::ThresholdRule;

/// One row of the threshold table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSpec {
    pub metric: String,
    pub threshold: f64,
    #[serde(default)]
    pub comparison: Comparison,
    #[serde(default)]
    pub severity: Severity,
    /// Rule name; the metric name when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Per-rule cooldown; the engine default when absent.
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    /// Channels; the engine default when empty.
    #[serde(default)]
    pub channels: Vec<ChannelId>,
}

impl ThresholdSpec {
    pub fn new(
        metric: impl Into<String>,
        threshold: f64,
        comparison: Comparison,
        severity: Severity,
    ) -> Self {
        Self {
            metric: metric.into(),
            threshold,
            comparison,
            severity,
            name: None,
            cooldown_secs: None,
            channels: Vec::new(),
        }
    }

    pub fn rule_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.metric)
    }
}

/// Alert engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Cooldown applied to rules that do not set their own.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Resolved alerts older than this are purged.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Alerts kept in memory. Past this, the oldest resolved alert is
    /// evicted first, then the oldest alert.
    #[serde(default = "default_max_alerts")]
    pub max_alerts: usize,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    #[serde(default = "default_cleanup_error_backoff_secs")]
    pub cleanup_error_backoff_secs: u64,

    /// Channels used by rules that do not name their own.
    #[serde(default = "default_channels")]
    pub default_channels: Vec<ChannelId>,

    /// Rules installed at construction.
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<ThresholdSpec>,
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_max_alerts() -> usize {
    1000
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn default_cleanup_error_backoff_secs() -> u64 {
    60
}

fn default_channels() -> Vec<ChannelId> {
    vec![ChannelId::log()]
}

/// The platform's standard thresholds.
pub fn default_thresholds() -> Vec<ThresholdSpec> {
    use Comparison::{GreaterThan, LessThan};
    vec![
        ThresholdSpec::new("response_time", 2.0, GreaterThan, Severity::Medium),
        ThresholdSpec::new("cpu_usage", 80.0, GreaterThan, Severity::High),
        ThresholdSpec::new("memory_usage", 85.0, GreaterThan, Severity::High),
        ThresholdSpec::new("disk_usage", 90.0, GreaterThan, Severity::Critical),
        ThresholdSpec::new("active_connections", 1000.0, GreaterThan, Severity::Medium),
        ThresholdSpec::new("error_rate", 15.0, GreaterThan, Severity::High),
        ThresholdSpec::new("cache_hit_rate", 60.0, LessThan, Severity::Medium),
    ]
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            retention_secs: default_retention_secs(),
            max_alerts: default_max_alerts(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            cleanup_error_backoff_secs: default_cleanup_error_backoff_secs(),
            default_channels: default_channels(),
            thresholds: default_thresholds(),
        }
    }
}

impl AlertConfig {
    /// A config with no rules, for callers that register their own.
    pub fn without_thresholds() -> Self {
        Self {
            thresholds: Vec::new(),
            ..Self::default()
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Build a rule from a table row, filling in engine defaults.
    pub fn rule_from_spec(&self, spec: &ThresholdSpec) -> ThresholdRule {
        let channels = if spec.channels.is_empty() {
            self.default_channels.clone()
        } else {
            spec.channels.clone()
        };
        ThresholdRule::new(
            spec.rule_name(),
            spec.metric.clone(),
            spec.threshold,
            spec.comparison,
            spec.severity,
        )
        .with_cooldown(Duration::from_secs(
            spec.cooldown_secs.unwrap_or(self.cooldown_secs),
        ))
        .with_channels(channels)
    }

    /// Every rule the table describes.
    pub fn rules(&self) -> Vec<ThresholdRule> {
        self.thresholds.iter().map(|s| self.rule_from_spec(s)).collect()
    }

    /// Reject zero intervals or capacity, unusable rules and duplicate rule names.
    pub fn validate(&self) -> AlertResult<()> {
        if self.cleanup_interval_secs == 0 {
            return Err(AlertError::InvalidRule(
                "cleanup_interval_secs must be greater than zero".into(),
            ));
        }
        if self.retention_secs == 0 {
            return Err(AlertError::InvalidRule(
                "retention_secs must be greater than zero".into(),
            ));
        }
        if self.max_alerts == 0 {
            return Err(AlertError::InvalidRule(
                "max_alerts must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for rule in self.rules() {
            rule.validate()?;
            if !seen.insert(rule.name.clone()) {
                return Err(AlertError::DuplicateRule(rule.name));
            }
        }
        Ok(())
    }
}
