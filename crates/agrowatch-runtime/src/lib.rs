//! # AgroWatch Runtime
//!
//! Wiring for the telemetry core. The web application builds one
//! [`TelemetryContext`] at startup from a layered [`TelemetryConfig`] and
//! passes it to its request middleware, domain services and API handlers.
//!
//! ```rust,no_run
//! use agrowatch_runtime::{init_tracing, TelemetryConfig, TelemetryContext};
//!
//! # async fn example() -> agrowatch_runtime::TelemetryResult<()> {
//! let config = TelemetryConfig::load(Some("config/agrowatch"))?;
//! init_tracing(&config.logging)?;
//!
//! let telemetry = TelemetryContext::new(config)?;
//! telemetry.start();
//!
//! telemetry
//!     .record_request(std::time::Duration::from_millis(120), 200)
//!     .await;
//! let dashboard = telemetry.dashboard();
//! println!("active alerts: {}", dashboard.alerts.active_count);
//!
//! telemetry.stop().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod context;
pub mod error;
pub mod logging;

pub use config::{LoggingConfig, MonitoringConfig, TelemetryConfig};
pub use context::{DashboardSnapshot, SystemView, TelemetryContext, TelemetryContextBuilder};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{env_filter, init_tracing};
