//! Health status vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Aggregated status over every registered check.
///
/// `Unhealthy` when any critical check failed, `Degraded` when only
/// non-critical checks failed, `Healthy` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl OverallStatus {
    /// Fold one check outcome into the running aggregate.
    pub fn absorb(self, status: HealthStatus, critical: bool) -> Self {
        match (status, critical) {
            (HealthStatus::Healthy, _) => self,
            (HealthStatus::Unhealthy, true) => OverallStatus::Unhealthy,
            (HealthStatus::Unhealthy, false) => match self {
                OverallStatus::Healthy => OverallStatus::Degraded,
                other => other,
            },
        }
    }
}

impl Default for OverallStatus {
    fn default() -> Self {
        OverallStatus::Healthy
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Healthy => write!(f, "healthy"),
            OverallStatus::Degraded => write!(f, "degraded"),
            OverallStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}
