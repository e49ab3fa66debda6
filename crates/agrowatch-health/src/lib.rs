//! # AgroWatch Health - Health check orchestration
//!
//! Collaborators register named checks ("can the datastore be reached",
//! "is the weather API answering") with a `critical` flag. The
//! [`HealthOrchestrator`] runs them, captures every failure as an unhealthy
//! [`HealthCheckResult`], and folds the results into a [`HealthSummary`]:
//!
//! - `unhealthy` if any critical check failed
//! - `degraded` if only non-critical checks failed
//! - `healthy` otherwise
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agrowatch_health::{CheckDetails, HealthConfig, HealthOrchestrator};
//!
//! # async fn example() {
//! let health = Arc::new(HealthOrchestrator::new(HealthConfig::default()));
//! health
//!     .register_fn("datastore", true, || async { Ok(CheckDetails::new()) })
//!     .unwrap();
//!
//! let summary = health.run_all_checks().await;
//! println!("overall: {}", summary.overall_status);
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod check;
pub mod checks;
pub mod error;
pub mod orchestrator;
pub mod result;

pub use check::{FnCheck, HealthCheck, DEFAULT_CHECK_TIMEOUT};
pub use checks::{DiskSpaceCheck, MemoryCheck};
pub use error::{HealthError, HealthResult};
pub use orchestrator::{HealthConfig, HealthOrchestrator};
pub use result::{CheckDetails, HealthCheckResult, HealthSummary};
