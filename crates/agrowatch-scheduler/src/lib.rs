//! # AgroWatch Scheduler - Cancellable periodic tasks
//!
//! Every background subsystem of the telemetry core (host sampling, periodic
//! health checks, alert retention cleanup) runs on its own [`PeriodicTask`].
//!
//! A task owns:
//!
//! - a **running flag** observable through [`PeriodicTask::is_running`]
//! - a dedicated tokio task executing the job
//! - a **sleep interval** between successful cycles
//! - a fixed **error backoff** after a failed (or panicking) cycle
//!
//! Cancellation is cooperative: [`PeriodicTask::stop`] signals the loop over a
//! watch channel, the loop finishes its current cycle, and `stop` waits for it
//! for at most [`TaskConfig::stop_timeout`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use agrowatch_scheduler::{CycleResult, PeriodicJob, PeriodicTask, TaskConfig};
//!
//! struct Heartbeat;
//!
//! #[async_trait]
//! impl PeriodicJob for Heartbeat {
//!     fn name(&self) -> &str {
//!         "heartbeat"
//!     }
//!
//!     async fn run_cycle(&self) -> CycleResult {
//!         tracing::info!("still alive");
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() {
//! let task = PeriodicTask::new(Arc::new(Heartbeat), TaskConfig::every(Duration::from_secs(30)));
//! task.start();
//! // ...
//! task.stop().await.ok();
//! # }
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod task;

pub use error::{CycleError, CycleResult, SchedulerError, SchedulerResult};
pub use task::{panic_message, PeriodicJob, PeriodicTask, TaskConfig, TaskStats};
