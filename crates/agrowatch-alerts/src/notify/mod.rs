//! Notification channels.
//!
//! Each alert names the channels it goes to. A channel implements
//! [`NotificationChannel`] and is registered with the
//! [`NotificationDispatcher`] under its [`ChannelId`]. A failing channel
//! never stops delivery to the others.

mod dispatcher;
mod email;
mod log;

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use email::{EmailChannel, EmailConfig, MailTransport, OutgoingMail, SmtpMailTransport};
pub use log::LogChannel;

use agrowatch_types::ChannelId;
use async_trait::async_trait;
use tracing::error;

use crate::alert::Alert;
use crate::error::AlertResult;

/// A destination for alerts.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn id(&self) -> ChannelId;

    /// Deliver one alert.
    async fn send(&self, alert: &Alert) -> AlertResult<()>;

    /// Deliver one alert, logging any failure. Returns whether it was delivered.
    async fn send_alert(&self, alert: &Alert) -> bool {
        match self.send(alert).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    channel = %self.id(),
                    alert_id = %alert.id,
                    error = %e,
                    "Failed to send alert"
                );
                false
            }
        }
    }
}
