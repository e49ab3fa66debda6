//! Email channel.

use std::fmt;
use std::sync::Arc;

use agrowatch_types::ChannelId;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::NotificationChannel;
use crate::alert::Alert;
use crate::error::{AlertError, AlertResult};

/// SMTP settings of the email channel.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: String::new(),
            to: Vec::new(),
        }
    }
}

impl EmailConfig {
    /// Host, credentials, sender and at least one recipient are all set.
    pub fn is_complete(&self) -> bool {
        !self.smtp_host.trim().is_empty()
            && !self.username.is_empty()
            && !self.password.is_empty()
            && !self.from.trim().is_empty()
            && self.to.iter().any(|t| !t.trim().is_empty())
    }
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// A rendered mail ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    /// Render the mail for an alert.
    pub fn for_alert(config: &EmailConfig, alert: &Alert) -> Self {
        let severity = alert.severity.as_str().to_uppercase();
        let na = || "N/A".to_string();

        let body = format!(
            "AgroWatch alert\n\n\
             Rule: {rule}\n\
             Severity: {severity}\n\
             Component: {component}\n\
             Timestamp: {timestamp}\n\n\
             Message:\n{message}\n\n\
             Details:\n\
             - Metric: {metric}\n\
             - Value: {value}\n\
             - Threshold: {threshold}\n\n\
             Alert ID: {id}\n",
            rule = alert.rule_name,
            severity = severity,
            component = alert.component.clone().unwrap_or_else(na),
            timestamp = alert.triggered_at.format("%Y-%m-%d %H:%M:%S UTC"),
            message = alert.message,
            metric = alert.metric_name.clone().unwrap_or_else(na),
            value = alert.metric_value.map(|v| v.to_string()).unwrap_or_else(na),
            threshold = alert.threshold.map(|v| v.to_string()).unwrap_or_else(na),
            id = alert.id,
        );

        Self {
            from: config.from.clone(),
            to: config.to.clone(),
            subject: format!("[AgroWatch Alert - {}] {}", severity, alert.rule_name),
            body,
        }
    }
}

/// Delivers rendered mail.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, config: &EmailConfig, mail: OutgoingMail) -> AlertResult<()>;
}

/// [`MailTransport`] over SMTP with STARTTLS, using `lettre`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpMailTransport;

fn mailbox(address: &str) -> AlertResult<Mailbox> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| AlertError::Email(format!("invalid address {}: {}", address, e)))
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn deliver(&self, config: &EmailConfig, mail: OutgoingMail) -> AlertResult<()> {
        let mut builder = Message::builder()
            .from(mailbox(&mail.from)?)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN);
        for to in mail.to.iter().filter(|t| !t.trim().is_empty()) {
            builder = builder.to(mailbox(to)?);
        }
        let message = builder
            .body(mail.body)
            .map_err(|e| AlertError::Email(e.to_string()))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| AlertError::Email(e.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| AlertError::Email(e.to_string()))?;
        Ok(())
    }
}

/// Sends alerts by mail. Configuration can be replaced at runtime.
pub struct EmailChannel {
    config: RwLock<EmailConfig>,
    transport: Arc<dyn MailTransport>,
}

impl EmailChannel {
    /// Create a channel delivering over SMTP.
    pub fn new(config: EmailConfig) -> Self {
        Self::with_transport(config, Arc::new(SmtpMailTransport))
    }

    pub fn with_transport(config: EmailConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            config: RwLock::new(config),
            transport,
        }
    }

    /// Replace the SMTP settings.
    pub fn configure(&self, config: EmailConfig) {
        info!(
            smtp_host = %config.smtp_host,
            recipients = config.to.len(),
            complete = config.is_complete(),
            "Email notifications configured"
        );
        *self.config.write() = config;
    }

    pub fn config(&self) -> EmailConfig {
        self.config.read().clone()
    }

    pub fn is_configured(&self) -> bool {
        self.config.read().is_complete()
    }
}

impl fmt::Debug for EmailChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailChannel")
            .field("config", &*self.config.read())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn id(&self) -> ChannelId {
        ChannelId::email()
    }

    async fn send(&self, alert: &Alert) -> AlertResult<()> {
        let config = self.config();
        if !config.is_complete() {
            return Err(AlertError::EmailNotConfigured);
        }

        let mail = OutgoingMail::for_alert(&config, alert);
        self.transport.deliver(&config, mail).await
    }

    async fn send_alert(&self, alert: &Alert) -> bool {
        match self.send(alert).await {
            Ok(()) => {
                info!(alert_id = %alert.id, "Alert email sent");
                true
            }
            Err(AlertError::EmailNotConfigured) => {
                warn!(alert_id = %alert.id, "Email configuration incomplete, skipping email alert");
                false
            }
            Err(e) => {
                error!(alert_id = %alert.id, error = %e, "Failed to send alert email");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertDetails;
    use agrowatch_types::Severity;
    use chrono::Utc;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutgoingMail>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn deliver(&self, _config: &EmailConfig, mail: OutgoingMail) -> AlertResult<()> {
            self.sent.lock().push(mail);
            Ok(())
        }
    }

    struct RejectingTransport;

    #[async_trait]
    impl MailTransport for RejectingTransport {
        async fn deliver(&self, _config: &EmailConfig, _mail: OutgoingMail) -> AlertResult<()> {
            Err(AlertError::Email("550 mailbox unavailable".into()))
        }
    }

    fn complete_config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.pt".into(),
            smtp_port: 587,
            username: "alerts".into(),
            password: "secret".into(),
            from: "alerts@example.pt".into(),
            to: vec!["ops@example.pt".into()],
        }
    }

    fn alert() -> Alert {
        Alert::manual(
            "disk_usage",
            "disk almost full",
            Severity::Critical,
            AlertDetails::default().metric("disk_usage", 93.0).threshold(90.0),
            Utc::now(),
        )
    }

    #[test]
    fn test_is_complete() {
        assert!(!EmailConfig::default().is_complete());
        assert!(complete_config().is_complete());

        let mut config = complete_config();
        config.to.clear();
        assert!(!config.is_complete());
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", complete_config());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_mail_rendering() {
        let mail = OutgoingMail::for_alert(&complete_config(), &alert());
        assert_eq!(mail.subject, "[AgroWatch Alert - CRITICAL] disk_usage");
        assert!(mail.body.contains("- Value: 93"));
        assert!(mail.body.contains("- Threshold: 90"));
        assert!(mail.body.contains("Component: N/A"));
        assert_eq!(mail.to, vec!["ops@example.pt".to_string()]);
    }

    #[tokio::test]
    async fn test_incomplete_config_reports_failure() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = EmailChannel::with_transport(EmailConfig::default(), transport.clone());

        assert!(!channel.send_alert(&alert()).await);
        assert!(matches!(
            channel.send(&alert()).await,
            Err(AlertError::EmailNotConfigured)
        ));
        assert!(transport.sent.lock().is_empty());

        channel.configure(complete_config());
        assert!(channel.is_configured());
        assert!(channel.send_alert(&alert()).await);
        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_contained() {
        let channel = EmailChannel::with_transport(complete_config(), Arc::new(RejectingTransport));
        assert!(!channel.send_alert(&alert()).await);
    }
}
