//! The in-process metrics store.
//!
//! Counters, gauges, histograms, the raw observation buffer and the daily
//! business totals all live behind one mutex, so every mutation is atomic and
//! every summary is a consistent snapshot.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use agrowatch_types::{metric_key, system_clock, to_chrono, Metric, SharedClock, Tags};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::histogram::{Histogram, HistogramStats, DEFAULT_HISTOGRAM_CAPACITY};

/// Counter-name pattern that also feeds a daily business total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessMetric {
    /// Substring matched against the counter name.
    pub pattern: String,
    /// Name of the daily total it accumulates into.
    pub total: String,
}

impl BusinessMetric {
    pub fn new(pattern: impl Into<String>, total: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            total: total.into(),
        }
    }
}

/// Metrics store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Samples kept per histogram.
    #[serde(default = "default_histogram_capacity")]
    pub histogram_capacity: usize,

    /// Raw observations kept in the ring buffer.
    #[serde(default = "default_metric_buffer_capacity")]
    pub metric_buffer_capacity: usize,

    /// Timings above this are logged as slow operations.
    #[serde(default = "default_slow_operation_secs")]
    pub slow_operation_secs: u64,

    /// Business totals, checked in order; a counter feeds the first match only.
    #[serde(default = "default_business_metrics")]
    pub business_metrics: Vec<BusinessMetric>,
}

fn default_histogram_capacity() -> usize {
    DEFAULT_HISTOGRAM_CAPACITY
}

fn default_metric_buffer_capacity() -> usize {
    1000
}

fn default_slow_operation_secs() -> u64 {
    5
}

fn default_business_metrics() -> Vec<BusinessMetric> {
    vec![
        BusinessMetric::new("user.register", "users_registered_today"),
        BusinessMetric::new("culture.create", "cultures_created_today"),
        BusinessMetric::new("recommendation.generate", "recommendations_generated_today"),
        BusinessMetric::new("alert.send", "alerts_sent_today"),
        BusinessMetric::new("marketplace.create", "marketplace_items_listed_today"),
    ]
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            histogram_capacity: default_histogram_capacity(),
            metric_buffer_capacity: default_metric_buffer_capacity(),
            slow_operation_secs: default_slow_operation_secs(),
            business_metrics: default_business_metrics(),
        }
    }
}

impl MetricsConfig {
    pub fn slow_operation_threshold(&self) -> Duration {
        Duration::from_secs(self.slow_operation_secs)
    }
}

/// Point-in-time view of the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub counters: BTreeMap<String, f64>,
    pub gauges: BTreeMap<String, f64>,
    /// Stats per histogram key; empty histograms are omitted.
    pub histograms: BTreeMap<String, HistogramStats>,
    pub business_metrics: BTreeMap<String, f64>,
}

struct StoreState {
    counters: BTreeMap<String, f64>,
    gauges: BTreeMap<String, f64>,
    histograms: BTreeMap<String, Histogram>,
    observations: VecDeque<Metric>,
    business: BTreeMap<String, f64>,
    started_at: DateTime<Utc>,
}

impl StoreState {
    fn new(config: &MetricsConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            counters: BTreeMap::new(),
            gauges: BTreeMap::new(),
            histograms: BTreeMap::new(),
            observations: VecDeque::new(),
            business: zeroed_business(config),
            started_at,
        }
    }
}

fn zeroed_business(config: &MetricsConfig) -> BTreeMap<String, f64> {
    config
        .business_metrics
        .iter()
        .map(|b| (b.total.clone(), 0.0))
        .collect()
}

/// Thread-safe counters, gauges and histograms.
pub struct MetricsStore {
    config: MetricsConfig,
    clock: SharedClock,
    state: Mutex<StoreState>,
}

impl MetricsStore {
    /// Create a new store using the system clock.
    pub fn new(config: MetricsConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Create a new store reading time from `clock`.
    pub fn with_clock(config: MetricsConfig, clock: SharedClock) -> Self {
        let state = StoreState::new(&config, clock.now());
        info!(
            component = "metrics",
            histogram_capacity = config.histogram_capacity,
            "Metrics store initialized"
        );
        Self {
            config,
            clock,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Add `delta` to the counter at `name[tags]`, creating it on first use.
    pub fn increment_counter(&self, name: &str, delta: f64, tags: Option<&Tags>) {
        let key = metric_key(name, tags);
        let business = self
            .config
            .business_metrics
            .iter()
            .find(|b| name.contains(b.pattern.as_str()));

        let mut state = self.state.lock();
        *state.counters.entry(key).or_insert(0.0) += delta;
        if let Some(business) = business {
            *state.business.entry(business.total.clone()).or_insert(0.0) += delta;
        }
    }

    /// Increment an untagged counter by one.
    pub fn increment(&self, name: &str) {
        self.increment_counter(name, 1.0, None);
    }

    /// Overwrite the gauge at `name[tags]`.
    pub fn set_gauge(&self, name: &str, value: f64, tags: Option<&Tags>) {
        let key = metric_key(name, tags);
        self.state.lock().gauges.insert(key, value);
    }

    /// Append a sample to the histogram at `name[tags]`.
    pub fn record_histogram(&self, name: &str, value: f64, tags: Option<&Tags>) {
        let key = metric_key(name, tags);
        let capacity = self.config.histogram_capacity;
        self.state
            .lock()
            .histograms
            .entry(key)
            .or_insert_with(|| Histogram::new(capacity))
            .record(value);
    }

    /// Record `duration` (seconds) into `name.duration`.
    pub fn record_timing(&self, name: &str, duration: Duration, tags: Option<&Tags>) {
        let seconds = duration.as_secs_f64();
        self.record_histogram(&format!("{}.duration", name), seconds, tags);

        if duration > self.config.slow_operation_threshold() {
            warn!(
                component = "performance",
                operation = %name,
                duration_secs = seconds,
                tags = ?tags,
                "Slow operation detected"
            );
        }
    }

    /// Append an immutable observation to the ring buffer and return it.
    pub fn record_metric(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        tags: Option<&Tags>,
    ) -> Metric {
        let mut metric = Metric::new(name, value, unit, self.clock.now());
        if let Some(tags) = tags {
            metric = metric.with_tags(tags.clone());
        }

        let capacity = self.config.metric_buffer_capacity.max(1);
        let mut state = self.state.lock();
        if state.observations.len() >= capacity {
            state.observations.pop_front();
        }
        state.observations.push_back(metric.clone());
        metric
    }

    /// Buffered observations of `name` newer than `now - window`, oldest first.
    pub fn metric_history(&self, name: &str, window: Duration) -> Vec<Metric> {
        let cutoff = self.clock.now() - to_chrono(window);
        self.state
            .lock()
            .observations
            .iter()
            .filter(|m| m.name == name && m.timestamp > cutoff)
            .cloned()
            .collect()
    }

    /// Current value of a counter, zero if it was never incremented.
    pub fn counter(&self, name: &str, tags: Option<&Tags>) -> f64 {
        let key = metric_key(name, tags);
        self.state.lock().counters.get(&key).copied().unwrap_or(0.0)
    }

    pub fn gauge(&self, name: &str, tags: Option<&Tags>) -> Option<f64> {
        let key = metric_key(name, tags);
        self.state.lock().gauges.get(&key).copied()
    }

    pub fn histogram_stats(&self, name: &str, tags: Option<&Tags>) -> Option<HistogramStats> {
        let key = metric_key(name, tags);
        self.state.lock().histograms.get(&key).and_then(Histogram::stats)
    }

    pub fn business_metrics(&self) -> BTreeMap<String, f64> {
        self.state.lock().business.clone()
    }

    /// Zero the daily business totals, leaving everything else intact.
    pub fn reset_daily_metrics(&self) {
        self.state.lock().business = zeroed_business(&self.config);
        info!(component = "metrics", "Daily business metrics reset");
    }

    /// Clear all state and restart the uptime clock.
    pub fn reset(&self) {
        *self.state.lock() = StoreState::new(&self.config, self.clock.now());
        info!(component = "metrics", action = "reset", "Metrics store reset");
    }

    pub fn uptime(&self) -> Duration {
        let started_at = self.state.lock().started_at;
        (self.clock.now() - started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Snapshot of every counter, gauge, histogram and business total.
    pub fn get_summary(&self) -> MetricsSummary {
        let now = self.clock.now();
        let state = self.state.lock();

        let uptime = (now - state.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        let histograms = state
            .histograms
            .iter()
            .filter_map(|(key, h)| h.stats().map(|stats| (key.clone(), stats)))
            .collect();

        MetricsSummary {
            timestamp: now,
            uptime_seconds: uptime.as_secs_f64(),
            counters: state.counters.clone(),
            gauges: state.gauges.clone(),
            histograms,
            business_metrics: state.business.clone(),
        }
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl std::fmt::Debug for MetricsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrowatch_types::{tags, Clock, ManualClock};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn manual_store() -> (MetricsStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = MetricsStore::with_clock(MetricsConfig::default(), clock.clone());
        (store, clock)
    }

    #[test]
    fn test_counters_are_keyed_by_tags() {
        let store = MetricsStore::default();
        let get = tags([("method", "GET")]);

        store.increment("http.requests.total");
        store.increment_counter("http.requests.total", 2.0, Some(&get));
        store.increment_counter("http.requests.total", 1.0, Some(&get));

        assert_eq!(store.counter("http.requests.total", None), 1.0);
        assert_eq!(store.counter("http.requests.total", Some(&get)), 3.0);

        let summary = store.get_summary();
        assert_eq!(summary.counters["http.requests.total[method=GET]"], 3.0);
    }

    #[test]
    fn test_gauge_last_write_wins() {
        let store = MetricsStore::default();
        assert_eq!(store.gauge("system.cpu.percent", None), None);

        store.set_gauge("system.cpu.percent", 10.0, None);
        store.set_gauge("system.cpu.percent", 42.5, None);
        assert_eq!(store.gauge("system.cpu.percent", None), Some(42.5));
    }

    #[test]
    fn test_record_timing_writes_duration_histogram() {
        let store = MetricsStore::default();
        store.record_timing("db.query", Duration::from_millis(250), None);
        store.record_timing("db.query", Duration::from_secs(6), None);

        let stats = store.histogram_stats("db.query.duration", None).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, 0.25);
        assert_eq!(stats.max, 6.0);
        assert!(store.histogram_stats("db.query", None).is_none());
    }

    #[test]
    fn test_histogram_capacity_from_config() {
        let config = MetricsConfig {
            histogram_capacity: 3,
            ..MetricsConfig::default()
        };
        let store = MetricsStore::new(config);
        for v in [1.0, 2.0, 3.0, 4.0] {
            store.record_histogram("latency", v, None);
        }

        let stats = store.histogram_stats("latency", None).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 2.0);
    }

    #[test]
    fn test_business_metrics_first_match_only() {
        let store = MetricsStore::default();
        store.increment("user.register");
        store.increment_counter("api.culture.create", 2.0, Some(&tags([("crop", "vine")])));
        store.increment("unrelated.counter");

        let business = store.business_metrics();
        assert_eq!(business["users_registered_today"], 1.0);
        assert_eq!(business["cultures_created_today"], 2.0);
        assert_eq!(business["alerts_sent_today"], 0.0);
        assert_eq!(business.len(), 5);

        store.reset_daily_metrics();
        assert_eq!(store.business_metrics()["users_registered_today"], 0.0);
        // Counters themselves survive the daily reset.
        assert_eq!(store.counter("user.register", None), 1.0);
    }

    #[test]
    fn test_reset_clears_everything_and_uptime() {
        let (store, clock) = manual_store();
        store.increment("a");
        store.set_gauge("b", 1.0, None);
        store.record_histogram("c", 1.0, None);
        store.record_metric("d", 1.0, "count", None);
        clock.advance(Duration::from_secs(120));
        assert_eq!(store.uptime(), Duration::from_secs(120));

        store.reset();

        let summary = store.get_summary();
        assert!(summary.counters.is_empty());
        assert!(summary.gauges.is_empty());
        assert!(summary.histograms.is_empty());
        assert_eq!(summary.uptime_seconds, 0.0);
        assert!(store.metric_history("d", Duration::from_secs(3600)).is_empty());
    }

    #[test]
    fn test_metric_history_window_and_ring_buffer() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = MetricsConfig {
            metric_buffer_capacity: 3,
            ..MetricsConfig::default()
        };
        let store = MetricsStore::with_clock(config, clock.clone());

        store.record_metric("cpu_usage", 10.0, "%", None);
        clock.advance(Duration::from_secs(600));
        store.record_metric("cpu_usage", 20.0, "%", None);
        store.record_metric("memory_usage", 30.0, "%", None);

        let recent = store.metric_history("cpu_usage", Duration::from_secs(300));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].value, 20.0);

        // Fourth observation evicts the first.
        store.record_metric("cpu_usage", 40.0, "%", None);
        let all: Vec<f64> = store
            .metric_history("cpu_usage", Duration::from_secs(86_400))
            .iter()
            .map(|m| m.value)
            .collect();
        assert_eq!(all, vec![20.0, 40.0]);
    }

    #[test]
    fn test_summary_omits_empty_histograms_and_reports_uptime() {
        let (store, clock) = manual_store();
        store.record_histogram("x", 1.0, None);
        clock.advance(Duration::from_secs(30));

        let summary = store.get_summary();
        assert_eq!(summary.uptime_seconds, 30.0);
        assert_eq!(summary.histograms["x"].count, 1);
        assert_eq!(summary.timestamp, clock.now());
    }

    proptest! {
        #[test]
        fn prop_counter_equals_sum_of_deltas(deltas in proptest::collection::vec(0u32..10_000, 0..200)) {
            let forward = MetricsStore::default();
            let backward = MetricsStore::default();

            for d in &deltas {
                forward.increment_counter("ops", f64::from(*d), None);
            }
            for d in deltas.iter().rev() {
                backward.increment_counter("ops", f64::from(*d), None);
            }

            let expected: f64 = deltas.iter().map(|d| f64::from(*d)).sum();
            prop_assert_eq!(forward.counter("ops", None), expected);
            prop_assert_eq!(backward.counter("ops", None), expected);
        }
    }
}
