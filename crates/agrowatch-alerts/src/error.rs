//! Error types for agrowatch-alerts.

use agrowatch_scheduler::SchedulerError;
use agrowatch_types::{ChannelId, ParseError};
use thiserror::Error;

/// Errors raised by the alert engine and notification channels.
#[derive(Debug, Error)]
pub enum AlertError {
    /// Rule definition is unusable (empty name or metric).
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Threshold is NaN or infinite.
    #[error("invalid threshold {value} for rule {rule}")]
    InvalidThreshold { rule: String, value: f64 },

    /// Two rules share one name in a rule table.
    #[error("duplicate rule name: {0}")]
    DuplicateRule(String),

    /// No rule with this name.
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    /// Email channel lacks host, credentials, sender or recipients.
    #[error("email configuration incomplete")]
    EmailNotConfigured,

    /// Building or delivering the mail failed.
    #[error("email delivery failed: {0}")]
    Email(String),

    /// A channel is referenced by an alert but not registered.
    #[error("unknown notification channel: {0}")]
    UnknownChannel(ChannelId),

    /// A channel failed for a reason of its own.
    #[error("channel {channel} failed: {reason}")]
    ChannelFailed { channel: ChannelId, reason: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Result type for alert operations.
pub type AlertResult<T> = Result<T, AlertError>;
