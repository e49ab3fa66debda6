//! AgroWatch Types - Core vocabulary for the telemetry and alerting core
//!
//! The farm-management platform emits metric observations from its request
//! middleware and domain services. The AgroWatch crates turn those
//! observations into summaries, health reports and threshold alerts.
//!
//! ## Architectural Boundaries
//!
//! - **agrowatch-metrics** owns: counters, gauges, histograms, host sampling
//! - **agrowatch-health** owns: named checks and the aggregated status
//! - **agrowatch-alerts** owns: threshold rules, alert lifecycle, notifications
//! - **agrowatch-runtime** owns: wiring, configuration, background loops
//!
//! ## Key Concepts
//!
//! - **Metric**: an immutable observation (`name`, `value`, `unit`, `tags`)
//! - **Severity**: alert importance, low to critical
//! - **Comparison**: the direction of a threshold rule
//! - **Clock**: the source of wall-clock time, swappable in tests

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod clock;
pub mod error;
pub mod health;
pub mod ids;
pub mod metric;
pub mod severity;

// Re-export main types
pub use clock::{system_clock, to_chrono, Clock, ManualClock, SharedClock, SystemClock};
pub use error::{ParseError, ParseResult};
pub use health::{HealthStatus, OverallStatus};
pub use ids::{AlertId, ChannelId};
pub use metric::{metric_key, tags, Metric, MetricReading, Tags};
pub use severity::{Comparison, Severity};
