//! The telemetry context.
//!
//! One [`TelemetryContext`] is built at startup and shared by reference with
//! every collaborator: request middleware, domain services, API handlers.
//! It owns the metrics store, request tracker, health orchestrator, alert
//! engine and host sampler, and starts and stops their background loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agrowatch_alerts::{
    Alert, AlertEngine, AlertSummary, EmailChannel, EmailConfig, LogChannel, MailTransport,
    NotificationDispatcher, SmtpMailTransport,
};
use agrowatch_health::{HealthOrchestrator, HealthSummary};
use agrowatch_metrics::{
    MetricsStore, MetricsSummary, RequestStats, RequestTracker, SampleObserver, SysinfoSource,
    SystemSampler, SystemSnapshot, SystemSource,
};
use agrowatch_types::{system_clock, tags, OverallStatus, SharedClock, Tags};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::TelemetryConfig;
use crate::error::{TelemetryError, TelemetryResult};

/// Host figures as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SystemView {
    Available(SystemSnapshot),
    /// No sample yet, or the source could provide no figure at all.
    Unavailable,
}

impl SystemView {
    fn from_snapshot(snapshot: Option<SystemSnapshot>) -> Self {
        match snapshot {
            Some(snapshot) if !snapshot.gauges().is_empty() => SystemView::Available(snapshot),
            _ => SystemView::Unavailable,
        }
    }
}

/// Everything a monitoring dashboard shows, read without running anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub timestamp: DateTime<Utc>,
    pub monitoring_enabled: bool,
    pub uptime_seconds: f64,
    pub system: SystemView,
    pub requests: RequestStats,
    pub alerts: AlertSummary,
    pub active_alerts: Vec<Alert>,
    /// Status of the last health run; `None` before the first one.
    pub health_status: Option<OverallStatus>,
}

/// Builder for [`TelemetryContext`].
pub struct TelemetryContextBuilder {
    config: TelemetryConfig,
    clock: Option<SharedClock>,
    system_source: Option<Arc<dyn SystemSource>>,
    mail_transport: Option<Arc<dyn MailTransport>>,
}

impl TelemetryContextBuilder {
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Read host figures from `source` instead of `sysinfo`.
    pub fn system_source(mut self, source: Arc<dyn SystemSource>) -> Self {
        self.system_source = Some(source);
        self
    }

    /// Deliver mail through `transport` instead of SMTP.
    pub fn mail_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.mail_transport = Some(transport);
        self
    }

    pub fn build(self) -> TelemetryResult<Arc<TelemetryContext>> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(system_clock);
        let metrics = Arc::new(MetricsStore::with_clock(config.metrics.clone(), Arc::clone(&clock)));

        let dispatcher = NotificationDispatcher::new();
        let transport = self
            .mail_transport
            .unwrap_or_else(|| Arc::new(SmtpMailTransport));
        let email = Arc::new(EmailChannel::with_transport(config.email.clone(), transport));
        dispatcher.register(Arc::new(LogChannel));
        dispatcher.register(email.clone());

        let alerts = Arc::new(
            AlertEngine::new(config.alerts.clone(), Arc::new(dispatcher))?
                .with_clock(Arc::clone(&clock))
                .with_metrics(Arc::clone(&metrics)),
        );

        let health = Arc::new(
            HealthOrchestrator::new(config.health.clone())
                .with_clock(Arc::clone(&clock))
                .with_metrics(Arc::clone(&metrics)),
        );
        if config.health.builtin_checks {
            health.register_builtin_checks()?;
        }

        let source = self.system_source.unwrap_or_else(|| {
            Arc::new(SysinfoSource::new(config.sampler.disk_mount.clone()))
        });
        let sampler = SystemSampler::with_source(config.sampler.clone(), Arc::clone(&metrics), source);

        let monitoring = Arc::new(AtomicBool::new(config.monitoring.enabled));
        sampler.add_observer(Arc::new(HostAlertFeed {
            alerts: Arc::clone(&alerts),
            monitoring: Arc::clone(&monitoring),
        }));

        info!(
            monitoring = config.monitoring.enabled,
            rules = alerts.rules().len(),
            health_checks = health.check_names().len(),
            email_configured = email.is_configured(),
            "Telemetry context created"
        );

        Ok(Arc::new(TelemetryContext {
            requests: RequestTracker::new(config.monitoring.response_window),
            config,
            clock,
            metrics,
            health,
            alerts,
            email,
            sampler,
            monitoring,
        }))
    }
}

/// Registry of the telemetry components.
pub struct TelemetryContext {
    config: TelemetryConfig,
    clock: SharedClock,
    metrics: Arc<MetricsStore>,
    requests: RequestTracker,
    health: Arc<HealthOrchestrator>,
    alerts: Arc<AlertEngine>,
    email: Arc<EmailChannel>,
    sampler: SystemSampler,
    monitoring: Arc<AtomicBool>,
}

impl TelemetryContext {
    /// Build a context with the system clock, `sysinfo` and SMTP delivery.
    pub fn new(config: TelemetryConfig) -> TelemetryResult<Arc<Self>> {
        Self::builder(config).build()
    }

    pub fn builder(config: TelemetryConfig) -> TelemetryContextBuilder {
        TelemetryContextBuilder {
            config,
            clock: None,
            system_source: None,
            mail_transport: None,
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsStore> {
        &self.metrics
    }

    pub fn requests(&self) -> &RequestTracker {
        &self.requests
    }

    pub fn health(&self) -> &Arc<HealthOrchestrator> {
        &self.health
    }

    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    pub fn sampler(&self) -> &SystemSampler {
        &self.sampler
    }

    pub fn email(&self) -> &Arc<EmailChannel> {
        &self.email
    }

    pub fn enable_monitoring(&self) {
        self.monitoring.store(true, Ordering::SeqCst);
        info!("Monitoring enabled");
    }

    pub fn disable_monitoring(&self) {
        self.monitoring.store(false, Ordering::SeqCst);
        info!("Monitoring disabled");
    }

    pub fn is_monitoring_enabled(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    /// Record an observation and evaluate the rules on it, waiting for the
    /// raised alerts to be delivered.
    ///
    /// Ignored while monitoring is disabled.
    pub async fn observe(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        tags: Option<&Tags>,
    ) -> Vec<Alert> {
        if !self.is_monitoring_enabled() {
            return Vec::new();
        }
        self.metrics.record_metric(name, value, unit, tags);
        self.alerts.check_metric_alerts(name, value).await
    }

    /// Account one handled request. Called by the request middleware.
    ///
    /// Feeds `response_time` (seconds) and `error_rate` (percent) to the
    /// alert engine. Raised alerts are stored before this returns; their
    /// delivery runs in the background. Ignored while monitoring is disabled.
    #[instrument(skip(self))]
    pub async fn record_request(&self, response_time: Duration, status_code: u16) -> RequestStats {
        if !self.is_monitoring_enabled() {
            return self.requests.stats();
        }

        let status_tags = tags([("status_code", status_code.to_string())]);
        self.metrics.increment_counter("http.requests.total", 1.0, None);
        self.metrics
            .increment_counter("http.responses.total", 1.0, Some(&status_tags));
        self.metrics.record_timing("http.request", response_time, None);

        let seconds = response_time.as_secs_f64();
        if response_time > self.config.monitoring.slow_request_threshold() {
            warn!(
                component = "performance",
                response_time_secs = seconds,
                status_code,
                "Slow request detected"
            );
        }

        let stats = self.requests.record(seconds, status_code);
        self.observe_detached("response_time", seconds, "s");
        self.observe_detached("error_rate", stats.error_rate, "%");
        stats
    }

    fn observe_detached(&self, name: &str, value: f64, unit: &str) {
        self.metrics.record_metric(name, value, unit, None);
        self.alerts.check_metric_alerts_detached(name, value);
    }

    /// Update the threshold of every rule on `metric_name`.
    pub fn set_threshold(&self, metric_name: &str, threshold: f64) -> TelemetryResult<usize> {
        Ok(self.alerts.set_threshold(metric_name, threshold)?)
    }

    pub fn configure_email(&self, config: EmailConfig) {
        self.email.configure(config);
    }

    /// Start the sampler, the periodic health checks and the alert cleanup.
    ///
    /// Must be called from within a tokio runtime. Starting twice is a no-op.
    pub fn start(&self) {
        self.sampler.start();
        self.health.start_periodic_checks(self.config.health.interval());
        self.alerts.start_cleanup();
        info!("Telemetry background tasks started");
    }

    /// Stop every background loop, waiting for in-flight cycles.
    ///
    /// Every loop is stopped even if an earlier one fails; the first error is
    /// returned. Stopping twice is a no-op.
    pub async fn stop(&self) -> TelemetryResult<()> {
        let sampler = self.sampler.stop().await.map_err(TelemetryError::from);
        let health = self
            .health
            .stop_periodic_checks()
            .await
            .map_err(TelemetryError::from);
        let alerts = self.alerts.stop_cleanup().await.map_err(TelemetryError::from);

        sampler?;
        health?;
        alerts?;
        info!("Telemetry background tasks stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.sampler.is_running() || self.health.is_periodic_running() || self.alerts.is_cleanup_running()
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        self.metrics.get_summary()
    }

    /// The cached health summary, or a fresh run when `fresh` is set or
    /// nothing has run yet.
    pub async fn health_summary(&self, fresh: bool) -> HealthSummary {
        if !fresh {
            if let Some(summary) = self.health.get_last_results() {
                return summary;
            }
        }
        self.health.run_all_checks().await
    }

    pub fn alert_summary(&self) -> AlertSummary {
        self.alerts.get_alert_summary()
    }

    pub fn dashboard(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            timestamp: self.clock.now(),
            monitoring_enabled: self.is_monitoring_enabled(),
            uptime_seconds: self.metrics.uptime().as_secs_f64(),
            system: SystemView::from_snapshot(self.sampler.last_snapshot()),
            requests: self.requests.stats(),
            alerts: self.alerts.get_alert_summary(),
            active_alerts: self.alerts.get_active_alerts(),
            health_status: self.health.get_last_results().map(|s| s.overall_status),
        }
    }
}

impl std::fmt::Debug for TelemetryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryContext")
            .field("monitoring", &self.is_monitoring_enabled())
            .field("alerts", &self.alerts)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

/// Feeds host usage percentages to the alert engine after every sample.
struct HostAlertFeed {
    alerts: Arc<AlertEngine>,
    monitoring: Arc<AtomicBool>,
}

#[async_trait]
impl SampleObserver for HostAlertFeed {
    async fn on_sample(&self, snapshot: &SystemSnapshot) {
        if !self.monitoring.load(Ordering::SeqCst) {
            return;
        }

        let figures = [
            ("cpu_usage", snapshot.cpu_percent),
            ("memory_usage", snapshot.memory_percent),
            ("disk_usage", snapshot.disk_percent),
        ];
        for (metric, value) in figures {
            if let Some(value) = value {
                self.alerts.check_metric_alerts(metric, value).await;
            }
        }
    }
}
