//! Structured-log channel.

use agrowatch_types::{ChannelId, Severity};
use async_trait::async_trait;
use tracing::{error, info, warn};

use super::NotificationChannel;
use crate::alert::Alert;
use crate::error::AlertResult;

/// Writes each alert as one log event at a severity-mapped level.
///
/// low -> INFO, medium -> WARN, high -> ERROR, critical -> ERROR with
/// `critical = true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

macro_rules! log_alert {
    ($level:ident, $alert:ident $(, $key:ident = $value:expr)*) => {
        $level!(
            target: "agrowatch::alerts",
            alert_id = %$alert.id,
            rule_name = %$alert.rule_name,
            severity = %$alert.severity,
            component = ?$alert.component,
            metric_name = ?$alert.metric_name,
            metric_value = ?$alert.metric_value,
            threshold = ?$alert.threshold,
            triggered_at = %$alert.triggered_at.to_rfc3339(),
            $($key = $value,)*
            "ALERT: {} - {}",
            $alert.rule_name,
            $alert.message
        )
    };
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn id(&self) -> ChannelId {
        ChannelId::log()
    }

    async fn send(&self, alert: &Alert) -> AlertResult<()> {
        match alert.severity {
            Severity::Low => log_alert!(info, alert),
            Severity::Medium => log_alert!(warn, alert),
            Severity::High => log_alert!(error, alert),
            Severity::Critical => log_alert!(error, alert, critical = true),
        }
        Ok(())
    }
}
