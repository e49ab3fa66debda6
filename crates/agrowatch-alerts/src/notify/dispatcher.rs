//! Channel registry and fan-out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use agrowatch_types::ChannelId;
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::{EmailChannel, EmailConfig, LogChannel, NotificationChannel};
use crate::alert::Alert;

/// Per-channel outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub delivered: Vec<ChannelId>,
    pub failed: Vec<ChannelId>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registry of notification channels keyed by id.
#[derive(Default)]
pub struct NotificationDispatcher {
    channels: DashMap<ChannelId, Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher with the log channel and an email channel.
    ///
    /// The email channel is returned too so its settings can be replaced later.
    pub fn with_defaults(email: EmailConfig) -> (Self, Arc<EmailChannel>) {
        let dispatcher = Self::new();
        let email = Arc::new(EmailChannel::new(email));
        dispatcher.register(Arc::new(LogChannel));
        dispatcher.register(email.clone());
        (dispatcher, email)
    }

    /// Register a channel, replacing any channel with the same id.
    pub fn register(&self, channel: Arc<dyn NotificationChannel>) -> Option<Arc<dyn NotificationChannel>> {
        let id = channel.id();
        debug!(channel = %id, "Notification channel registered");
        self.channels.insert(id, channel)
    }

    pub fn unregister(&self, id: &ChannelId) -> Option<Arc<dyn NotificationChannel>> {
        self.channels.remove(id).map(|(_, channel)| channel)
    }

    pub fn channel(&self, id: &ChannelId) -> Option<Arc<dyn NotificationChannel>> {
        self.channels.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Registered channel ids, sorted.
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.channels.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Send `alert` to each of its channels in turn.
    ///
    /// Unknown channels, failures and panics are logged and reported; they
    /// never prevent delivery to the remaining channels.
    pub async fn dispatch(&self, alert: &Alert) -> DispatchReport {
        let mut report = DispatchReport::default();

        for id in &alert.channels {
            let Some(channel) = self.channel(id) else {
                warn!(channel = %id, alert_id = %alert.id, "Unknown notification channel");
                report.failed.push(id.clone());
                continue;
            };

            let delivered = match AssertUnwindSafe(channel.send_alert(alert))
                .catch_unwind()
                .await
            {
                Ok(delivered) => delivered,
                Err(_) => {
                    error!(channel = %id, alert_id = %alert.id, "Notification channel panicked");
                    false
                }
            };

            if delivered {
                report.delivered.push(id.clone());
            } else {
                report.failed.push(id.clone());
            }
        }

        report
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("channels", &self.channel_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertDetails;
    use crate::error::{AlertError, AlertResult};
    use agrowatch_types::Severity;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        id: &'static str,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        fn id(&self) -> ChannelId {
            ChannelId::new(self.id)
        }

        async fn send(&self, _alert: &Alert) -> AlertResult<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingChannel;

    #[async_trait]
    impl NotificationChannel for FailingChannel {
        fn id(&self) -> ChannelId {
            ChannelId::new("webhook")
        }

        async fn send(&self, _alert: &Alert) -> AlertResult<()> {
            Err(AlertError::ChannelFailed {
                channel: self.id(),
                reason: "connection reset".into(),
            })
        }
    }

    struct PanickingChannel;

    #[async_trait]
    impl NotificationChannel for PanickingChannel {
        fn id(&self) -> ChannelId {
            ChannelId::new("pager")
        }

        async fn send(&self, _alert: &Alert) -> AlertResult<()> {
            panic!("pager driver bug");
        }
    }

    fn alert_for(channels: &[&str]) -> Alert {
        Alert::manual(
            "r",
            "m",
            Severity::High,
            AlertDetails::default().channels(channels.iter().map(|c| ChannelId::new(*c))),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let dispatcher = NotificationDispatcher::new();
        let sms = Arc::new(CountingChannel {
            id: "sms",
            sent: AtomicUsize::new(0),
        });
        dispatcher.register(sms.clone());
        dispatcher.register(Arc::new(FailingChannel));
        dispatcher.register(Arc::new(PanickingChannel));

        let report = dispatcher
            .dispatch(&alert_for(&["pager", "sms", "webhook", "missing"]))
            .await;

        assert_eq!(report.delivered, vec![ChannelId::new("sms")]);
        assert_eq!(
            report.failed,
            vec![
                ChannelId::new("missing"),
                ChannelId::new("pager"),
                ChannelId::new("webhook")
            ]
        );
        assert!(!report.all_delivered());
        assert_eq!(sms.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_defaults_register_log_and_email() {
        let (dispatcher, email) = NotificationDispatcher::with_defaults(EmailConfig::default());
        assert_eq!(dispatcher.channel_ids(), vec![ChannelId::email(), ChannelId::log()]);
        assert!(!email.is_configured());

        // Log succeeds, unconfigured email fails.
        let report = dispatcher.dispatch(&alert_for(&["log", "email"])).await;
        assert_eq!(report.delivered, vec![ChannelId::log()]);
        assert_eq!(report.failed, vec![ChannelId::email()]);
    }

    #[test]
    fn test_register_replaces_and_unregisters() {
        let dispatcher = NotificationDispatcher::new();
        assert!(dispatcher.register(Arc::new(LogChannel)).is_none());
        assert!(dispatcher.register(Arc::new(LogChannel)).is_some());
        assert!(dispatcher.unregister(&ChannelId::log()).is_some());
        assert!(dispatcher.channel_ids().is_empty());
    }
}
