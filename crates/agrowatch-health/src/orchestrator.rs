//! Health check orchestrator.
//!
//! Holds the registered checks in registration order, runs them one at a
//! time, aggregates the outcome, and optionally repeats on a periodic task.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use agrowatch_metrics::MetricsStore;
use agrowatch_scheduler::{panic_message, CycleResult, PeriodicJob, PeriodicTask, TaskConfig};
use agrowatch_types::{system_clock, tags, SharedClock};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::check::{FnCheck, HealthCheck};
use crate::checks::{DiskSpaceCheck, MemoryCheck, DEFAULT_DISK_THRESHOLD, DEFAULT_MEMORY_THRESHOLD};
use crate::error::{HealthError, HealthResult};
use crate::result::{round_ms, CheckDetails, HealthCheckResult, HealthSummary};

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval of the periodic run.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Pause after a failed periodic cycle.
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    /// Register the disk and memory checks at startup.
    #[serde(default = "default_builtin_checks")]
    pub builtin_checks: bool,

    #[serde(default = "default_disk_threshold")]
    pub disk_threshold_percent: f64,

    #[serde(default = "default_memory_threshold")]
    pub memory_threshold_percent: f64,
}

fn default_interval_secs() -> u64 {
    600
}

fn default_error_backoff_secs() -> u64 {
    60
}

fn default_builtin_checks() -> bool {
    true
}

fn default_disk_threshold() -> f64 {
    DEFAULT_DISK_THRESHOLD
}

fn default_memory_threshold() -> f64 {
    DEFAULT_MEMORY_THRESHOLD
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            builtin_checks: default_builtin_checks(),
            disk_threshold_percent: default_disk_threshold(),
            memory_threshold_percent: default_memory_threshold(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Runs named checks and aggregates their status.
pub struct HealthOrchestrator {
    config: HealthConfig,
    checks: RwLock<Vec<Arc<dyn HealthCheck>>>,
    metrics: Option<Arc<MetricsStore>>,
    clock: SharedClock,
    last: RwLock<Option<HealthSummary>>,
    periodic: Mutex<Option<PeriodicTask>>,
}

impl HealthOrchestrator {
    /// Create a new orchestrator with no checks registered.
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            checks: RwLock::new(Vec::new()),
            metrics: None,
            clock: system_clock(),
            last: RwLock::new(None),
            periodic: Mutex::new(None),
        }
    }

    /// Record check timings and outcomes into `store`.
    pub fn with_metrics(mut self, store: Arc<MetricsStore>) -> Self {
        self.metrics = Some(store);
        self
    }

    /// Stamp results and summaries with `clock`.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Register the disk space and memory checks with the configured thresholds.
    pub fn register_builtin_checks(&self) -> HealthResult<()> {
        self.register_check(Arc::new(DiskSpaceCheck::new(
            self.config.disk_threshold_percent,
        )))?;
        self.register_check(Arc::new(MemoryCheck::new(
            self.config.memory_threshold_percent,
        )))
    }

    /// Register a check. Names are unique.
    pub fn register_check(&self, check: Arc<dyn HealthCheck>) -> HealthResult<()> {
        let mut checks = self.checks.write();
        if checks.iter().any(|c| c.name() == check.name()) {
            return Err(HealthError::DuplicateCheck(check.name().to_string()));
        }

        debug!(
            check_name = %check.name(),
            critical = check.critical(),
            timeout_secs = check.timeout().as_secs(),
            "Health check registered"
        );
        checks.push(check);
        Ok(())
    }

    /// Register a closure-backed check.
    pub fn register_fn<F, Fut>(&self, name: &str, critical: bool, check_fn: F) -> HealthResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HealthResult<CheckDetails>> + Send + 'static,
    {
        self.register_check(Arc::new(FnCheck::new(name, critical, check_fn)))
    }

    /// Remove a check. Returns `false` if no check had that name.
    pub fn unregister_check(&self, name: &str) -> bool {
        let mut checks = self.checks.write();
        let before = checks.len();
        checks.retain(|c| c.name() != name);
        checks.len() != before
    }

    /// Registered check names in registration order.
    pub fn check_names(&self) -> Vec<String> {
        self.checks.read().iter().map(|c| c.name().to_string()).collect()
    }

    /// Run one check by name.
    pub async fn run_check(&self, name: &str) -> HealthResult<HealthCheckResult> {
        let check = self
            .checks
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| HealthError::CheckNotFound(name.to_string()))?;

        Ok(self.execute(check.as_ref()).await)
    }

    /// Run every registered check sequentially and cache the summary.
    #[instrument(skip(self))]
    pub async fn run_all_checks(&self) -> HealthSummary {
        let started = Instant::now();
        let checks: Vec<Arc<dyn HealthCheck>> = self.checks.read().clone();

        let mut results = Vec::with_capacity(checks.len());
        for check in &checks {
            results.push(self.execute(check.as_ref()).await);
        }

        let summary = HealthSummary::from_results(results, round_ms(started.elapsed()), self.clock.now());

        info!(
            component = "health_check_summary",
            overall_status = %summary.overall_status,
            total_checks = summary.total_checks,
            failed_checks = summary.failed_checks,
            critical_failures = summary.critical_failures,
            duration_ms = summary.duration_ms,
            "Health check completed"
        );

        *self.last.write() = Some(summary.clone());
        summary
    }

    /// The summary of the most recent `run_all_checks`, if any.
    pub fn get_last_results(&self) -> Option<HealthSummary> {
        self.last.read().clone()
    }

    async fn execute(&self, check: &dyn HealthCheck) -> HealthCheckResult {
        let name = check.name().to_string();
        let critical = check.critical();
        let started = Instant::now();

        let outcome = match AssertUnwindSafe(check.check()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(HealthError::Panicked(panic_message(panic.as_ref()))),
        };

        let elapsed = started.elapsed();
        let duration_ms = round_ms(elapsed);

        let result = match outcome {
            Ok(details) => {
                debug!(
                    component = "health_check",
                    check_name = %name,
                    duration_ms,
                    "Health check passed"
                );
                HealthCheckResult::healthy(&name, critical, duration_ms, details, self.clock.now())
            }
            Err(e) => {
                if critical {
                    error!(
                        component = "health_check",
                        check_name = %name,
                        critical,
                        error = %e,
                        duration_ms,
                        "Health check failed"
                    );
                } else {
                    warn!(
                        component = "health_check",
                        check_name = %name,
                        critical,
                        error = %e,
                        duration_ms,
                        "Health check failed"
                    );
                }
                HealthCheckResult::unhealthy(&name, critical, duration_ms, &e, self.clock.now())
            }
        };

        if let Some(metrics) = &self.metrics {
            let check_tags = tags([("check", name.as_str())]);
            metrics.record_timing("health_check", elapsed, Some(&check_tags));
            let counter = if result.is_healthy() {
                "health_check.success"
            } else {
                "health_check.errors"
            };
            metrics.increment_counter(counter, 1.0, Some(&check_tags));
        }

        result
    }

    /// Start running every check each `interval`. Returns `false` if already running.
    pub fn start_periodic_checks(self: &Arc<Self>, interval: Duration) -> bool {
        let mut periodic = self.periodic.lock();
        if let Some(task) = periodic.as_ref() {
            if task.is_running() {
                return false;
            }
        }

        let job = Arc::new(PeriodicHealthJob {
            orchestrator: Arc::downgrade(self),
        });
        let config = TaskConfig::every(interval)
            .with_error_backoff(Duration::from_secs(self.config.error_backoff_secs));
        let task = PeriodicTask::new(job, config);
        task.start();
        *periodic = Some(task);

        info!(
            component = "health_check_manager",
            interval_secs = interval.as_secs(),
            "Periodic health checks started"
        );
        true
    }

    /// Stop the periodic run, waiting for an in-flight run to finish.
    pub async fn stop_periodic_checks(&self) -> HealthResult<()> {
        let task = self.periodic.lock().take();
        if let Some(task) = task {
            task.stop().await?;
            info!(component = "health_check_manager", "Periodic health checks stopped");
        }
        Ok(())
    }

    pub fn is_periodic_running(&self) -> bool {
        self.periodic
            .lock()
            .as_ref()
            .map(PeriodicTask::is_running)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for HealthOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthOrchestrator")
            .field("config", &self.config)
            .field("checks", &self.check_names())
            .finish_non_exhaustive()
    }
}

struct PeriodicHealthJob {
    orchestrator: Weak<HealthOrchestrator>,
}

#[async_trait]
impl PeriodicJob for PeriodicHealthJob {
    fn name(&self) -> &str {
        "health-checks"
    }

    async fn run_cycle(&self) -> CycleResult {
        let Some(orchestrator) = self.orchestrator.upgrade() else {
            return Ok(());
        };

        let summary = orchestrator.run_all_checks().await;
        for failed in summary.critical_failures() {
            error!(
                component = "health_check_alert",
                check_name = %failed.name,
                error = failed.error.as_deref().unwrap_or("unknown error"),
                "Critical health check failed"
            );
        }
        Ok(())
    }
}
