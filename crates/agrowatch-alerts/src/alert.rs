//! Alerts and their lifecycle.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use agrowatch_types::{AlertId, ChannelId, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::ThresholdRule;

/// Component recorded on alerts produced by rule evaluation.
pub const THRESHOLD_COMPONENT: &str = "threshold_monitor";

/// Lifecycle state of an alert. Only `Active -> Resolved` is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Resolved,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Active => write!(f, "active"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// An alert raised by a rule or created manually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub rule_name: String,
    pub message: String,
    pub severity: Severity,
    pub component: Option<String>,
    pub metric_name: Option<String>,
    pub metric_value: Option<f64>,
    pub threshold: Option<f64>,
    pub channels: BTreeSet<ChannelId>,
    pub triggered_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Alert {
    /// Build the alert a rule produces for a triggering value.
    pub fn from_rule(rule: &ThresholdRule, value: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: AlertId::generate(),
            rule_name: rule.name.clone(),
            message: rule.render_message(value),
            severity: rule.severity,
            component: Some(THRESHOLD_COMPONENT.to_string()),
            metric_name: Some(rule.metric_name.clone()),
            metric_value: Some(value),
            threshold: Some(rule.threshold),
            channels: rule.channels.clone(),
            triggered_at: now,
            resolved: false,
            resolved_at: None,
            details: BTreeMap::new(),
        }
    }

    /// Build a manual alert.
    pub fn manual(
        rule_name: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        details: AlertDetails,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AlertId::generate(),
            rule_name: rule_name.into(),
            message: message.into(),
            severity,
            component: details.component,
            metric_name: details.metric_name,
            metric_value: details.metric_value,
            threshold: details.threshold,
            channels: details
                .channels
                .unwrap_or_else(|| BTreeSet::from([ChannelId::log()])),
            triggered_at: now,
            resolved: false,
            resolved_at: None,
            details: details.extra,
        }
    }

    pub fn status(&self) -> AlertStatus {
        if self.resolved {
            AlertStatus::Resolved
        } else {
            AlertStatus::Active
        }
    }

    /// Mark resolved. Returns `false` if it already was.
    pub fn resolve(&mut self, now: DateTime<Utc>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(now);
        true
    }
}

/// Optional fields of a manually created alert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertDetails {
    pub component: Option<String>,
    pub metric_name: Option<String>,
    pub metric_value: Option<f64>,
    pub threshold: Option<f64>,
    /// Channels to notify; the log channel when `None`.
    pub channels: Option<BTreeSet<ChannelId>>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AlertDetails {
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metric_name = Some(name.into());
        self.metric_value = Some(value);
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn channels(mut self, channels: impl IntoIterator<Item = ChannelId>) -> Self {
        self.channels = Some(channels.into_iter().collect());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrowatch_types::Comparison;

    #[test]
    fn test_from_rule() {
        let rule = ThresholdRule::new("cpu_usage", "cpu_usage", 80.0, Comparison::GreaterThan, Severity::High);
        let now = Utc::now();
        let alert = Alert::from_rule(&rule, 85.0, now);

        assert!(alert.id.as_str().starts_with("alert_"));
        assert_eq!(alert.metric_value, Some(85.0));
        assert_eq!(alert.threshold, Some(80.0));
        assert_eq!(alert.component.as_deref(), Some(THRESHOLD_COMPONENT));
        assert_eq!(alert.channels, BTreeSet::from([ChannelId::log()]));
        assert_eq!(alert.status(), AlertStatus::Active);
    }

    #[test]
    fn test_resolve_once() {
        let mut alert = Alert::manual(
            "backup",
            "nightly backup missing",
            Severity::Low,
            AlertDetails::default(),
            Utc::now(),
        );
        let at = Utc::now();

        assert!(alert.resolve(at));
        assert!(!alert.resolve(at + chrono::Duration::seconds(5)));
        assert_eq!(alert.resolved_at, Some(at));
        assert_eq!(alert.status(), AlertStatus::Resolved);
    }

    #[test]
    fn test_manual_details() {
        let details = AlertDetails::default()
            .component("marketplace")
            .metric("listings.pending", 42.0)
            .channels([ChannelId::email()])
            .extra("region", serde_json::json!("Alentejo"));
        let alert = Alert::manual("listings", "queue backed up", Severity::Medium, details, Utc::now());

        assert_eq!(alert.metric_name.as_deref(), Some("listings.pending"));
        assert_eq!(alert.channels, BTreeSet::from([ChannelId::email()]));
        assert_eq!(alert.details["region"], "Alentejo");
    }
}
