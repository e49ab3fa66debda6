//! Threshold alert engine.
//!
//! Rules and alerts live behind one coarse lock. Evaluation and storage
//! happen under the lock; notification happens after it is released, so a
//! slow channel never blocks other writers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use agrowatch_metrics::MetricsStore;
use agrowatch_scheduler::{CycleResult, PeriodicJob, PeriodicTask, TaskConfig};
use agrowatch_types::{
    system_clock, tags, to_chrono, AlertId, Comparison, MetricReading, SharedClock, Severity,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::alert::{Alert, AlertDetails};
use crate::config::AlertConfig;
use crate::error::{AlertError, AlertResult};
use crate::notify::NotificationDispatcher;
use crate::rule::ThresholdRule;

/// Default number of alerts returned by [`AlertEngine::get_alert_history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Counter incremented for every stored alert, tagged by severity.
pub const ALERT_SENT_COUNTER: &str = "alert.send";

/// Aggregate view of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub timestamp: DateTime<Utc>,
    pub active_count: usize,
    /// Alerts currently stored, active or resolved.
    pub total_count: usize,
    /// Alerts raised since start, including purged ones.
    pub total_triggered: u64,
    pub rules_count: usize,
    pub by_severity: BTreeMap<String, u64>,
    pub by_rule: BTreeMap<String, u64>,
    /// Stored alerts triggered within the last 24 hours.
    pub last_24h: usize,
}

#[derive(Debug, Default)]
struct AlertStats {
    total_triggered: u64,
    by_severity: BTreeMap<Severity, u64>,
    by_rule: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct EngineState {
    rules: BTreeMap<String, ThresholdRule>,
    /// Alerts keyed by insertion sequence, oldest first.
    alerts: BTreeMap<u64, Alert>,
    index: HashMap<AlertId, u64>,
    next_seq: u64,
    stats: AlertStats,
}

impl EngineState {
    /// Store `alert`, evicting down to `capacity`. Returns the number evicted.
    fn store(&mut self, alert: Alert, capacity: usize) -> usize {
        self.stats.total_triggered += 1;
        *self.stats.by_severity.entry(alert.severity).or_insert(0) += 1;
        *self.stats.by_rule.entry(alert.rule_name.clone()).or_insert(0) += 1;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(alert.id.clone(), seq);
        self.alerts.insert(seq, alert);

        let mut evicted = 0;
        while self.alerts.len() > capacity {
            let victim = self
                .alerts
                .iter()
                .find(|(_, a)| a.resolved)
                .or_else(|| self.alerts.iter().next())
                .map(|(seq, _)| *seq);
            let Some(victim) = victim else {
                break;
            };
            if let Some(evicted_alert) = self.alerts.remove(&victim) {
                self.index.remove(&evicted_alert.id);
                evicted += 1;
            }
        }
        evicted
    }
}

/// Evaluates threshold rules and owns the alert lifecycle.
pub struct AlertEngine {
    config: AlertConfig,
    state: Mutex<EngineState>,
    dispatcher: Arc<NotificationDispatcher>,
    metrics: Option<Arc<MetricsStore>>,
    clock: SharedClock,
    cleanup: Mutex<Option<PeriodicTask>>,
}

impl AlertEngine {
    /// Create an engine with the rules of `config`.
    pub fn new(config: AlertConfig, dispatcher: Arc<NotificationDispatcher>) -> AlertResult<Self> {
        config.validate()?;

        let rules = config
            .rules()
            .into_iter()
            .map(|rule| (rule.name.clone(), rule))
            .collect();

        Ok(Self {
            config,
            state: Mutex::new(EngineState {
                rules,
                ..EngineState::default()
            }),
            dispatcher,
            metrics: None,
            clock: system_clock(),
            cleanup: Mutex::new(None),
        })
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Count stored alerts in `store`.
    pub fn with_metrics(mut self, store: Arc<MetricsStore>) -> Self {
        self.metrics = Some(store);
        self
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// Register or overwrite a rule with the engine's default cooldown and channels.
    pub fn add_threshold_rule(
        &self,
        name: &str,
        metric_name: &str,
        threshold: f64,
        comparison: Comparison,
        severity: Severity,
    ) -> AlertResult<()> {
        let rule = self.default_rule(name, metric_name, threshold, comparison, severity);
        self.add_rule(rule).map(|_| ())
    }

    fn default_rule(
        &self,
        name: &str,
        metric_name: &str,
        threshold: f64,
        comparison: Comparison,
        severity: Severity,
    ) -> ThresholdRule {
        ThresholdRule::new(name, metric_name, threshold, comparison, severity)
            .with_cooldown(self.config.cooldown())
            .with_channels(self.config.default_channels.iter().cloned())
    }

    /// Register a rule, returning the rule it replaced.
    pub fn add_rule(&self, rule: ThresholdRule) -> AlertResult<Option<ThresholdRule>> {
        rule.validate()?;
        info!(
            rule_name = %rule.name,
            metric_name = %rule.metric_name,
            threshold = rule.threshold,
            comparison = %rule.comparison,
            severity = %rule.severity,
            "Threshold rule registered"
        );
        Ok(self.state.lock().rules.insert(rule.name.clone(), rule))
    }

    pub fn remove_rule(&self, name: &str) -> AlertResult<ThresholdRule> {
        self.state
            .lock()
            .rules
            .remove(name)
            .ok_or_else(|| AlertError::RuleNotFound(name.to_string()))
    }

    pub fn rule(&self, name: &str) -> Option<ThresholdRule> {
        self.state.lock().rules.get(name).cloned()
    }

    /// All rules, ordered by name.
    pub fn rules(&self) -> Vec<ThresholdRule> {
        self.state.lock().rules.values().cloned().collect()
    }

    /// Set the threshold of every rule on `metric_name`.
    ///
    /// When no rule watches the metric, a `greater_than` rule named after it
    /// is created. That fails with [`AlertError::DuplicateRule`] if the name
    /// is already taken by a rule on another metric. Returns the number of
    /// rules affected.
    pub fn set_threshold(&self, metric_name: &str, threshold: f64) -> AlertResult<usize> {
        if !threshold.is_finite() {
            return Err(AlertError::InvalidThreshold {
                rule: metric_name.to_string(),
                value: threshold,
            });
        }

        let mut state = self.state.lock();
        let mut updated = 0;
        for rule in state.rules.values_mut().filter(|r| r.metric_name == metric_name) {
            rule.threshold = threshold;
            updated += 1;
        }

        if updated == 0 {
            if state.rules.contains_key(metric_name) {
                return Err(AlertError::DuplicateRule(metric_name.to_string()));
            }
            let rule = self.default_rule(
                metric_name,
                metric_name,
                threshold,
                Comparison::GreaterThan,
                Severity::default(),
            );
            rule.validate()?;
            state.rules.insert(rule.name.clone(), rule);
            updated = 1;
        }
        drop(state);

        info!(metric_name, threshold, rules = updated, "Threshold updated");
        Ok(updated)
    }

    /// Evaluate every rule on `metric_name` against `value` and deliver the
    /// alerts raised before returning them.
    ///
    /// Readings that are not numbers raise nothing.
    #[instrument(skip(self, value))]
    pub async fn check_metric_alerts<V: MetricReading>(
        &self,
        metric_name: &str,
        value: V,
    ) -> Vec<Alert> {
        let raised = self.evaluate(metric_name, value);
        for alert in &raised {
            self.deliver(alert).await;
        }
        raised
    }

    /// Like [`check_metric_alerts`](Self::check_metric_alerts), but delivery
    /// runs on a spawned task so the caller never waits on a channel.
    ///
    /// The returned alerts are already stored. Must be called from within a
    /// tokio runtime.
    pub fn check_metric_alerts_detached<V: MetricReading>(
        self: &Arc<Self>,
        metric_name: &str,
        value: V,
    ) -> Vec<Alert> {
        let raised = self.evaluate(metric_name, value);
        if !raised.is_empty() {
            let engine = Arc::clone(self);
            let pending = raised.clone();
            tokio::spawn(async move {
                for alert in &pending {
                    engine.deliver(alert).await;
                }
            });
        }
        raised
    }

    /// Evaluate and store under the lock; nothing is delivered.
    fn evaluate<V: MetricReading>(&self, metric_name: &str, value: V) -> Vec<Alert> {
        let Some(reading) = value.as_metric_value() else {
            debug!(metric_name, "Ignoring non-numeric metric value");
            return Vec::new();
        };
        let now = self.clock.now();

        let (raised, evicted) = {
            let mut state = self.state.lock();
            let mut raised = Vec::new();
            for rule in state.rules.values_mut() {
                if rule.metric_name != metric_name
                    || !rule.should_trigger(&reading)
                    || !rule.can_trigger(now)
                {
                    continue;
                }
                rule.last_triggered = Some(now);
                raised.push(Alert::from_rule(rule, reading, now));
            }
            let mut evicted = 0;
            for alert in &raised {
                evicted += state.store(alert.clone(), self.config.max_alerts);
            }
            (raised, evicted)
        };

        self.log_evicted(evicted);
        for alert in &raised {
            self.announce(alert);
        }
        raised
    }

    /// Raise an alert directly. No cooldown applies.
    pub async fn create_alert(
        &self,
        rule_name: &str,
        message: &str,
        severity: Severity,
        details: AlertDetails,
    ) -> Alert {
        let alert = Alert::manual(rule_name, message, severity, details, self.clock.now());
        let evicted = self.state.lock().store(alert.clone(), self.config.max_alerts);
        self.log_evicted(evicted);
        self.announce(&alert);
        self.deliver(&alert).await;
        alert
    }

    fn log_evicted(&self, evicted: usize) {
        if evicted > 0 {
            debug!(
                evicted,
                max_alerts = self.config.max_alerts,
                "Alert store at capacity, oldest alerts evicted"
            );
        }
    }

    fn announce(&self, alert: &Alert) {
        if let Some(metrics) = &self.metrics {
            metrics.increment_counter(
                ALERT_SENT_COUNTER,
                1.0,
                Some(&tags([("severity", alert.severity.as_str())])),
            );
        }

        info!(
            alert_id = %alert.id,
            rule_name = %alert.rule_name,
            severity = %alert.severity,
            "Alert triggered"
        );
    }

    async fn deliver(&self, alert: &Alert) {
        let report = self.dispatcher.dispatch(alert).await;
        if !report.all_delivered() {
            warn!(
                alert_id = %alert.id,
                failed = ?report.failed,
                delivered = report.delivered.len(),
                "Alert not delivered to every channel"
            );
        }
    }

    /// Mark an alert resolved. `false` if unknown or already resolved.
    pub fn resolve_alert(&self, id: &AlertId) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let Some(seq) = state.index.get(id).copied() else {
            return false;
        };
        let resolved = state
            .alerts
            .get_mut(&seq)
            .map(|alert| alert.resolve(now))
            .unwrap_or(false);
        if resolved {
            info!(alert_id = %id, "Alert resolved");
        }
        resolved
    }

    pub fn get_alert(&self, id: &AlertId) -> Option<Alert> {
        let state = self.state.lock();
        let seq = state.index.get(id)?;
        state.alerts.get(seq).cloned()
    }

    /// Unresolved alerts, oldest first.
    pub fn get_active_alerts(&self) -> Vec<Alert> {
        self.state
            .lock()
            .alerts
            .values()
            .filter(|a| !a.resolved)
            .cloned()
            .collect()
    }

    /// Stored alerts, most recent first, at most `limit`.
    pub fn get_alert_history(&self, limit: usize) -> Vec<Alert> {
        self.state
            .lock()
            .alerts
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get_alert_summary(&self) -> AlertSummary {
        let now = self.clock.now();
        let day_ago = now - chrono::Duration::hours(24);
        let state = self.state.lock();

        AlertSummary {
            timestamp: now,
            active_count: state.alerts.values().filter(|a| !a.resolved).count(),
            total_count: state.alerts.len(),
            total_triggered: state.stats.total_triggered,
            rules_count: state.rules.len(),
            by_severity: state
                .stats
                .by_severity
                .iter()
                .map(|(s, n)| (s.as_str().to_string(), *n))
                .collect(),
            by_rule: state.stats.by_rule.clone(),
            last_24h: state
                .alerts
                .values()
                .filter(|a| a.triggered_at > day_ago)
                .count(),
        }
    }

    /// Delete resolved alerts whose resolution is older than the retention window.
    pub fn purge_resolved(&self) -> usize {
        let cutoff = self.clock.now() - to_chrono(self.config.retention());
        let mut state = self.state.lock();

        let expired: Vec<(u64, AlertId)> = state
            .alerts
            .iter()
            .filter(|(_, a)| a.resolved && a.resolved_at.map(|at| at < cutoff).unwrap_or(false))
            .map(|(seq, a)| (*seq, a.id.clone()))
            .collect();

        for (seq, id) in &expired {
            state.alerts.remove(seq);
            state.index.remove(id);
        }
        expired.len()
    }

    /// Start purging on the configured interval. Returns `false` if already running.
    pub fn start_cleanup(self: &Arc<Self>) -> bool {
        let mut cleanup = self.cleanup.lock();
        if cleanup.as_ref().map(PeriodicTask::is_running).unwrap_or(false) {
            return false;
        }

        let job = Arc::new(CleanupJob {
            engine: Arc::downgrade(self),
        });
        let config = TaskConfig::every(Duration::from_secs(self.config.cleanup_interval_secs))
            .with_error_backoff(Duration::from_secs(self.config.cleanup_error_backoff_secs));
        let task = PeriodicTask::new(job, config);
        task.start();
        *cleanup = Some(task);

        info!(
            interval_secs = self.config.cleanup_interval_secs,
            retention_secs = self.config.retention_secs,
            "Alert cleanup started"
        );
        true
    }

    pub async fn stop_cleanup(&self) -> AlertResult<()> {
        let task = self.cleanup.lock().take();
        if let Some(task) = task {
            task.stop().await?;
            info!("Alert cleanup stopped");
        }
        Ok(())
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup
            .lock()
            .as_ref()
            .map(PeriodicTask::is_running)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

struct CleanupJob {
    engine: Weak<AlertEngine>,
}

#[async_trait]
impl PeriodicJob for CleanupJob {
    fn name(&self) -> &str {
        "alert-cleanup"
    }

    async fn run_cycle(&self) -> CycleResult {
        let Some(engine) = self.engine.upgrade() else {
            return Ok(());
        };

        let purged = engine.purge_resolved();
        if purged > 0 {
            info!(purged, "Purged resolved alerts");
        }
        Ok(())
    }
}
