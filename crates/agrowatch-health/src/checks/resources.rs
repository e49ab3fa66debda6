//! Host resource checks backed by `sysinfo`.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::json;
use sysinfo::{Disks, System};
use tracing::instrument;

use crate::check::HealthCheck;
use crate::error::{HealthError, HealthResult};
use crate::result::CheckDetails;

pub const DEFAULT_DISK_THRESHOLD: f64 = 90.0;
pub const DEFAULT_MEMORY_THRESHOLD: f64 = 85.0;

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Compare `used` against `total` and produce details or a threshold error.
///
/// `free` is the figure reported alongside (available memory, free disk).
pub fn evaluate_usage(
    resource: &str,
    used: u64,
    free: u64,
    total: u64,
    threshold_percent: f64,
) -> HealthResult<CheckDetails> {
    if total == 0 {
        return Err(HealthError::ResourceUnavailable(format!(
            "{} total reported as zero",
            resource
        )));
    }

    let used_percent = used as f64 / total as f64 * 100.0;
    if used_percent > threshold_percent {
        return Err(HealthError::ThresholdExceeded {
            resource: resource.to_string(),
            used_percent,
            threshold_percent,
        });
    }

    let mut details = CheckDetails::new();
    details.insert("used_percent".into(), json!(round2(used_percent)));
    details.insert("free_gb".into(), json!(round2(free as f64 / GB)));
    details.insert("total_gb".into(), json!(round2(total as f64 / GB)));
    details.insert("threshold_percent".into(), json!(threshold_percent));
    Ok(details)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn run_blocking<F>(f: F) -> HealthResult<CheckDetails>
where
    F: FnOnce() -> HealthResult<CheckDetails> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HealthError::ResourceUnavailable(e.to_string()))?
}

/// Fails when the monitored mount is fuller than the threshold. Critical.
#[derive(Debug, Clone)]
pub struct DiskSpaceCheck {
    threshold_percent: f64,
    mount: PathBuf,
}

impl DiskSpaceCheck {
    pub fn new(threshold_percent: f64) -> Self {
        Self {
            threshold_percent,
            mount: PathBuf::from("/"),
        }
    }

    pub fn with_mount(mut self, mount: impl Into<PathBuf>) -> Self {
        self.mount = mount.into();
        self
    }
}

impl Default for DiskSpaceCheck {
    fn default() -> Self {
        Self::new(DEFAULT_DISK_THRESHOLD)
    }
}

#[async_trait]
impl HealthCheck for DiskSpaceCheck {
    fn name(&self) -> &str {
        "disk_space"
    }

    fn critical(&self) -> bool {
        true
    }

    #[instrument(skip(self), fields(mount = %self.mount.display()))]
    async fn check(&self) -> HealthResult<CheckDetails> {
        let mount = self.mount.clone();
        let threshold = self.threshold_percent;

        run_blocking(move || {
            let disks = Disks::new_with_refreshed_list();
            let disk = disks
                .list()
                .iter()
                .find(|d| d.mount_point() == mount.as_path())
                .or_else(|| disks.list().iter().max_by_key(|d| d.total_space()))
                .ok_or_else(|| HealthError::ResourceUnavailable("no disks reported".into()))?;

            let total = disk.total_space();
            let free = disk.available_space();
            let mut details =
                evaluate_usage("disk", total.saturating_sub(free), free, total, threshold)?;
            details.insert(
                "mount".into(),
                json!(disk.mount_point().to_string_lossy()),
            );
            Ok(details)
        })
        .await
    }
}

/// Fails when memory usage is above the threshold. Critical.
#[derive(Debug, Clone)]
pub struct MemoryCheck {
    threshold_percent: f64,
}

impl MemoryCheck {
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent }
    }
}

impl Default for MemoryCheck {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_THRESHOLD)
    }
}

#[async_trait]
impl HealthCheck for MemoryCheck {
    fn name(&self) -> &str {
        "memory"
    }

    fn critical(&self) -> bool {
        true
    }

    async fn check(&self) -> HealthResult<CheckDetails> {
        let threshold = self.threshold_percent;

        run_blocking(move || {
            let mut sys = System::new();
            sys.refresh_memory();

            let total = sys.total_memory();
            let available = sys.available_memory();
            evaluate_usage(
                "memory",
                total.saturating_sub(available),
                available,
                total,
                threshold,
            )
        })
        .await
    }
}
