//! Threshold rules.

use std::collections::BTreeSet;
use std::time::Duration;

use agrowatch_types::{to_chrono, ChannelId, Comparison, MetricReading, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AlertError, AlertResult};

/// Minimum time between two alerts of one rule, by default.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// A named condition over one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub name: String,
    pub metric_name: String,
    pub threshold: f64,
    pub comparison: Comparison,
    pub severity: Severity,
    pub cooldown_secs: u64,
    pub last_triggered: Option<DateTime<Utc>>,
    pub channels: BTreeSet<ChannelId>,
    /// Message with `{metric_name}`, `{value}`, `{threshold}` and
    /// `{comparison}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_template: Option<String>,
}

impl ThresholdRule {
    /// Create a rule with the default cooldown, delivered to the log channel.
    pub fn new(
        name: impl Into<String>,
        metric_name: impl Into<String>,
        threshold: f64,
        comparison: Comparison,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.into(),
            metric_name: metric_name.into(),
            threshold,
            comparison,
            severity,
            cooldown_secs: DEFAULT_COOLDOWN.as_secs(),
            last_triggered: None,
            channels: BTreeSet::from([ChannelId::log()]),
            message_template: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_secs = cooldown.as_secs();
        self
    }

    pub fn with_channels(mut self, channels: impl IntoIterator<Item = ChannelId>) -> Self {
        self.channels = channels.into_iter().collect();
        self
    }

    pub fn with_message_template(mut self, template: impl Into<String>) -> Self {
        self.message_template = Some(template.into());
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Reject rules that could never be evaluated sensibly.
    pub fn validate(&self) -> AlertResult<()> {
        if self.name.trim().is_empty() {
            return Err(AlertError::InvalidRule("rule name is empty".into()));
        }
        if self.metric_name.trim().is_empty() {
            return Err(AlertError::InvalidRule(format!(
                "rule {} has no metric name",
                self.name
            )));
        }
        if !self.threshold.is_finite() {
            return Err(AlertError::InvalidThreshold {
                rule: self.name.clone(),
                value: self.threshold,
            });
        }
        Ok(())
    }

    /// Whether `value` crosses the threshold. Non-numeric readings never do.
    pub fn should_trigger<V: MetricReading + ?Sized>(&self, value: &V) -> bool {
        match value.as_metric_value() {
            Some(v) if self.threshold.is_finite() => self.comparison.evaluate(v, self.threshold),
            _ => false,
        }
    }

    /// Whether the cooldown since the last trigger has strictly elapsed.
    pub fn can_trigger(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered {
            None => true,
            Some(last) => now - last > to_chrono(self.cooldown()),
        }
    }

    /// Render the alert message for a triggering value.
    pub fn render_message(&self, value: f64) -> String {
        match &self.message_template {
            Some(template) => template
                .replace("{metric_name}", &self.metric_name)
                .replace("{value}", &value.to_string())
                .replace("{threshold}", &self.threshold.to_string())
                .replace("{comparison}", self.comparison.as_str()),
            None => format!(
                "Metric {} value {} {} threshold {}",
                self.metric_name, value, self.comparison, self.threshold
            ),
        }
    }
}
