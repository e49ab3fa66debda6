//! # AgroWatch Metrics
//!
//! In-process metrics for the farm-management platform:
//!
//! - [`MetricsStore`]: counters, gauges and bounded histograms behind one
//!   coarse lock, plus a ring buffer of raw [`Metric`](agrowatch_types::Metric)
//!   observations and the daily business totals
//! - [`RequestTracker`]: request totals, error rate and recent response times
//! - [`SystemSampler`]: periodic host figures written as `system.*` gauges
//! - [`TimingGuard`] / [`time_operation`]: duration plus call/success/error
//!   counters for an operation
//!
//! Keys are rendered `name[k1=v1,k2=v2]` with tags sorted by key, so equal tag
//! sets always address the same series.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod histogram;
pub mod requests;
pub mod sampler;
pub mod store;
pub mod timing;

pub use error::{MetricsError, MetricsResult};
pub use histogram::{nearest_rank, Histogram, HistogramStats, DEFAULT_HISTOGRAM_CAPACITY};
pub use requests::{RequestStats, RequestTracker, DEFAULT_RESPONSE_WINDOW};
pub use sampler::{
    SampleObserver, SamplerConfig, SysinfoSource, SystemSampler, SystemSnapshot, SystemSource,
};
pub use store::{BusinessMetric, MetricsConfig, MetricsStore, MetricsSummary};
pub use timing::{time_operation, TimingGuard};
