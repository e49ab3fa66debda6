//! Periodic host sampling.
//!
//! The sampler reads CPU, memory, disk and process figures from a
//! [`SystemSource`] and writes them as gauges into the [`MetricsStore`].
//! Figures the source cannot provide are left out of the store and show up
//! as `None` in the [`SystemSnapshot`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agrowatch_scheduler::{CycleResult, PeriodicJob, PeriodicTask, TaskConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};
use tracing::{debug, instrument, warn};

use crate::error::{MetricsError, MetricsResult};
use crate::store::MetricsStore;

const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Sampler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    /// Mount point whose usage is reported as `system.disk.*`.
    #[serde(default = "default_disk_mount")]
    pub disk_mount: PathBuf,

    /// CPU percentage above which a warning is logged on every sample.
    #[serde(default = "default_cpu_warn_percent")]
    pub cpu_warn_percent: f64,

    /// Memory percentage above which a warning is logged on every sample.
    #[serde(default = "default_memory_warn_percent")]
    pub memory_warn_percent: f64,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_error_backoff_secs() -> u64 {
    60
}

fn default_disk_mount() -> PathBuf {
    PathBuf::from("/")
}

fn default_cpu_warn_percent() -> f64 {
    80.0
}

fn default_memory_warn_percent() -> f64 {
    85.0
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            disk_mount: default_disk_mount(),
            cpu_warn_percent: default_cpu_warn_percent(),
            memory_warn_percent: default_memory_warn_percent(),
        }
    }
}

impl SamplerConfig {
    pub fn task_config(&self) -> TaskConfig {
        TaskConfig::every(Duration::from_secs(self.interval_secs))
            .with_error_backoff(Duration::from_secs(self.error_backoff_secs))
    }
}

/// One reading of the host figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub memory_available_mb: Option<f64>,
    pub memory_used_mb: Option<f64>,
    pub disk_percent: Option<f64>,
    pub disk_free_gb: Option<f64>,
    pub disk_used_gb: Option<f64>,
    pub process_count: Option<u64>,
}

impl SystemSnapshot {
    /// A snapshot with every figure unavailable.
    pub fn unavailable(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cpu_percent: None,
            memory_percent: None,
            memory_available_mb: None,
            memory_used_mb: None,
            disk_percent: None,
            disk_free_gb: None,
            disk_used_gb: None,
            process_count: None,
        }
    }

    /// Gauge name and value for every figure present.
    pub fn gauges(&self) -> Vec<(&'static str, f64)> {
        [
            ("system.cpu.percent", self.cpu_percent),
            ("system.memory.percent", self.memory_percent),
            ("system.memory.available_mb", self.memory_available_mb),
            ("system.memory.used_mb", self.memory_used_mb),
            ("system.disk.percent", self.disk_percent),
            ("system.disk.free_gb", self.disk_free_gb),
            ("system.disk.used_gb", self.disk_used_gb),
            ("system.processes.count", self.process_count.map(|c| c as f64)),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

/// Provider of host figures. Implementations may block.
pub trait SystemSource: Send + Sync + 'static {
    fn sample(&self) -> MetricsResult<SystemSnapshot>;
}

/// [`SystemSource`] backed by `sysinfo`.
pub struct SysinfoSource {
    system: Mutex<System>,
    disk_mount: PathBuf,
}

impl SysinfoSource {
    pub fn new(disk_mount: impl Into<PathBuf>) -> Self {
        let mut system = System::new();
        // Prime the CPU counters so the first real sample has a baseline.
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
            disk_mount: disk_mount.into(),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new(default_disk_mount())
    }
}

impl SystemSource for SysinfoSource {
    fn sample(&self) -> MetricsResult<SystemSnapshot> {
        let mut snapshot = SystemSnapshot::unavailable(Utc::now());

        {
            let mut sys = self.system.lock();
            sys.refresh_cpu();
            sys.refresh_memory();
            sys.refresh_processes();

            if !sys.cpus().is_empty() {
                snapshot.cpu_percent = Some(f64::from(sys.global_cpu_info().cpu_usage()));
            }

            let total = sys.total_memory();
            if total > 0 {
                let available = sys.available_memory();
                let used_pct = total.saturating_sub(available) as f64 / total as f64 * 100.0;
                snapshot.memory_percent = Some(used_pct);
                snapshot.memory_available_mb = Some(available as f64 / MB);
                snapshot.memory_used_mb = Some(sys.used_memory() as f64 / MB);
            }

            let processes = sys.processes().len();
            if processes > 0 {
                snapshot.process_count = Some(processes as u64);
            }
        }

        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == self.disk_mount.as_path())
            .or_else(|| disks.list().iter().max_by_key(|d| d.total_space()));

        if let Some(disk) = disk {
            let total = disk.total_space();
            let free = disk.available_space();
            if total > 0 {
                let used = total.saturating_sub(free);
                snapshot.disk_percent = Some(used as f64 / total as f64 * 100.0);
                snapshot.disk_free_gb = Some(free as f64 / GB);
                snapshot.disk_used_gb = Some(used as f64 / GB);
            }
        }

        if snapshot.gauges().is_empty() {
            return Err(MetricsError::SourceUnavailable(
                "sysinfo reported no figures".to_string(),
            ));
        }
        Ok(snapshot)
    }
}

/// Hook receiving every successful snapshot.
#[async_trait]
pub trait SampleObserver: Send + Sync {
    async fn on_sample(&self, snapshot: &SystemSnapshot);
}

struct SamplerInner {
    config: SamplerConfig,
    store: Arc<MetricsStore>,
    source: Arc<dyn SystemSource>,
    observers: RwLock<Vec<Arc<dyn SampleObserver>>>,
    last: Mutex<Option<SystemSnapshot>>,
}

impl SamplerInner {
    async fn sample_once(&self) -> MetricsResult<SystemSnapshot> {
        let source = Arc::clone(&self.source);
        let snapshot = tokio::task::spawn_blocking(move || source.sample())
            .await
            .map_err(|e| MetricsError::SamplingTask(e.to_string()))??;

        for (name, value) in snapshot.gauges() {
            self.store.set_gauge(name, value, None);
        }

        if let Some(cpu) = snapshot.cpu_percent {
            if cpu > self.config.cpu_warn_percent {
                warn!(
                    component = "system_alert",
                    metric = "cpu_usage",
                    value = cpu,
                    threshold = self.config.cpu_warn_percent,
                    "High CPU usage detected"
                );
            }
        }
        if let Some(memory) = snapshot.memory_percent {
            if memory > self.config.memory_warn_percent {
                warn!(
                    component = "system_alert",
                    metric = "memory_usage",
                    value = memory,
                    threshold = self.config.memory_warn_percent,
                    "High memory usage detected"
                );
            }
        }

        *self.last.lock() = Some(snapshot.clone());

        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_sample(&snapshot).await;
        }

        debug!(component = "system_metrics", figures = snapshot.gauges().len(), "Host sample recorded");
        Ok(snapshot)
    }
}

struct SamplerJob {
    inner: Arc<SamplerInner>,
}

#[async_trait]
impl PeriodicJob for SamplerJob {
    fn name(&self) -> &str {
        "system-sampler"
    }

    async fn run_cycle(&self) -> CycleResult {
        self.inner.sample_once().await?;
        Ok(())
    }
}

/// Samples host figures on its own periodic task.
pub struct SystemSampler {
    inner: Arc<SamplerInner>,
    task: PeriodicTask,
}

impl SystemSampler {
    /// Create a sampler reading from `sysinfo`.
    pub fn new(config: SamplerConfig, store: Arc<MetricsStore>) -> Self {
        let source = Arc::new(SysinfoSource::new(config.disk_mount.clone()));
        Self::with_source(config, store, source)
    }

    /// Create a sampler reading from a custom source.
    pub fn with_source(
        config: SamplerConfig,
        store: Arc<MetricsStore>,
        source: Arc<dyn SystemSource>,
    ) -> Self {
        let task_config = config.task_config();
        let inner = Arc::new(SamplerInner {
            config,
            store,
            source,
            observers: RwLock::new(Vec::new()),
            last: Mutex::new(None),
        });
        let job = Arc::new(SamplerJob {
            inner: Arc::clone(&inner),
        });
        Self {
            inner,
            task: PeriodicTask::new(job, task_config),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn SampleObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Take one sample immediately, outside the periodic loop.
    #[instrument(skip(self))]
    pub async fn sample_now(&self) -> MetricsResult<SystemSnapshot> {
        self.inner.sample_once().await
    }

    /// The most recent successful snapshot.
    pub fn last_snapshot(&self) -> Option<SystemSnapshot> {
        self.inner.last.lock().clone()
    }

    pub fn start(&self) -> bool {
        self.task.start()
    }

    pub async fn stop(&self) -> MetricsResult<()> {
        self.task.stop().await?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn task(&self) -> &PeriodicTask {
        &self.task
    }
}
