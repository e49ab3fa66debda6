//! # AgroWatch Alerts
//!
//! Threshold rules over metric values, the alert lifecycle, and the
//! notification channels alerts are delivered through.
//!
//! ## Lifecycle
//!
//! ```text
//! value ──► rule matches metric? ──► crosses threshold? ──► cooldown elapsed?
//!                                                                │
//!                                                                ▼
//!                                    active ──resolve──► resolved ──retention──► purged
//! ```
//!
//! A rule never raises two alerts within its cooldown. Direction is explicit
//! on every rule ([`Comparison`](agrowatch_types::Comparison)), so success
//! ratios such as `cache_hit_rate` use `less_than` instead of a name-based
//! exception.
//!
//! ## Notification
//!
//! Alerts name their channels. The [`NotificationDispatcher`] delivers to each
//! in turn; a failing channel is logged and reported, never propagated.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod alert;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod rule;

pub use alert::{Alert, AlertDetails, AlertStatus, THRESHOLD_COMPONENT};
pub use config::{default_thresholds, AlertConfig, ThresholdSpec};
pub use engine::{AlertEngine, AlertSummary, ALERT_SENT_COUNTER, DEFAULT_HISTORY_LIMIT};
pub use error::{AlertError, AlertResult};
pub use notify::{
    DispatchReport, EmailChannel, EmailConfig, LogChannel, MailTransport, NotificationChannel,
    NotificationDispatcher, OutgoingMail, SmtpMailTransport,
};
pub use rule::{ThresholdRule, DEFAULT_COOLDOWN};
