//! Health check results and the aggregated summary.

use std::collections::BTreeMap;

use agrowatch_types::{HealthStatus, OverallStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HealthError;

/// Free-form details reported by a passing check.
pub type CheckDetails = BTreeMap<String, serde_json::Value>;

/// Outcome of running one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub critical: bool,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<CheckDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl HealthCheckResult {
    /// Create a healthy result.
    pub fn healthy(
        name: impl Into<String>,
        critical: bool,
        duration_ms: f64,
        details: CheckDetails,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            critical,
            duration_ms,
            timestamp,
            details: Some(details),
            error: None,
            error_type: None,
        }
    }

    /// Create an unhealthy result from the error the check produced.
    pub fn unhealthy(
        name: impl Into<String>,
        critical: bool,
        duration_ms: f64,
        error: &HealthError,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            critical,
            duration_ms,
            timestamp,
            details: None,
            error: Some(error.to_string()),
            error_type: Some(error.error_type().to_string()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Unhealthy and flagged critical.
    pub fn is_critical_failure(&self) -> bool {
        self.critical && !self.is_healthy()
    }
}

/// Aggregate over one run of every registered check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub overall_status: OverallStatus,
    pub timestamp: DateTime<Utc>,
    pub total_checks: usize,
    pub failed_checks: usize,
    pub critical_failures: usize,
    pub duration_ms: f64,
    pub checks: BTreeMap<String, HealthCheckResult>,
}

impl HealthSummary {
    /// Fold individual results into a summary stamped `timestamp`.
    pub fn from_results(
        results: Vec<HealthCheckResult>,
        duration_ms: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut overall_status = OverallStatus::Healthy;
        let mut failed_checks = 0;
        let mut critical_failures = 0;

        for result in &results {
            overall_status = overall_status.absorb(result.status, result.critical);
            if !result.is_healthy() {
                failed_checks += 1;
                if result.critical {
                    critical_failures += 1;
                }
            }
        }

        Self {
            overall_status,
            timestamp,
            total_checks: results.len(),
            failed_checks,
            critical_failures,
            duration_ms,
            checks: results.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }

    /// Results that are both unhealthy and critical.
    pub fn critical_failures(&self) -> impl Iterator<Item = &HealthCheckResult> {
        self.checks.values().filter(|r| r.is_critical_failure())
    }
}

/// Milliseconds rounded to two decimals.
pub(crate) fn round_ms(duration: std::time::Duration) -> f64 {
    (duration.as_micros() as f64 / 10.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(name: &str, critical: bool) -> HealthCheckResult {
        HealthCheckResult::unhealthy(
            name,
            critical,
            1.0,
            &HealthError::failed("Boom", "boom"),
            Utc::now(),
        )
    }

    fn passing(name: &str, critical: bool) -> HealthCheckResult {
        HealthCheckResult::healthy(name, critical, 1.0, CheckDetails::new(), Utc::now())
    }

    #[test]
    fn test_summary_status_rules() {
        let summary = HealthSummary::from_results(vec![passing("a", true), passing("b", false)], 2.0, Utc::now());
        assert_eq!(summary.overall_status, OverallStatus::Healthy);
        assert_eq!(summary.failed_checks, 0);

        let summary = HealthSummary::from_results(vec![passing("a", true), failing("b", false)], 2.0, Utc::now());
        assert_eq!(summary.overall_status, OverallStatus::Degraded);
        assert_eq!(summary.failed_checks, 1);
        assert_eq!(summary.critical_failures, 0);

        let summary = HealthSummary::from_results(
            vec![failing("a", false), failing("b", true), passing("c", false)],
            2.0,
            Utc::now(),
        );
        assert_eq!(summary.overall_status, OverallStatus::Unhealthy);
        assert_eq!(summary.failed_checks, 2);
        assert_eq!(summary.critical_failures, 1);
        assert_eq!(summary.critical_failures().count(), 1);
    }

    #[test]
    fn test_unhealthy_result_carries_error_type() {
        let result = failing("datastore", true);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.error_type.as_deref(), Some("Boom"));
        assert!(result.details.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_round_ms() {
        assert_eq!(round_ms(std::time::Duration::from_micros(12_345)), 12.35);
    }
}
