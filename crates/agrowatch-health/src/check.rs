//! The health check seam.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::HealthResult;
use crate::result::CheckDetails;

/// Nominal timeout of a check when none is given.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// A named unit of health verification.
///
/// Returning `Err` marks the check unhealthy; the orchestrator never lets the
/// error escape. The `timeout` is informational: checks that talk to remote
/// collaborators are expected to bound their own I/O.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a failure makes the whole system unhealthy rather than degraded.
    fn critical(&self) -> bool;

    fn timeout(&self) -> Duration {
        DEFAULT_CHECK_TIMEOUT
    }

    async fn check(&self) -> HealthResult<CheckDetails>;
}

/// A check backed by an async closure.
pub struct FnCheck<F> {
    name: String,
    critical: bool,
    timeout: Duration,
    check_fn: F,
}

impl<F, Fut> FnCheck<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = HealthResult<CheckDetails>> + Send,
{
    /// Create a new closure-backed check.
    pub fn new(name: impl Into<String>, critical: bool, check_fn: F) -> Self {
        Self {
            name: name.into(),
            critical,
            timeout: DEFAULT_CHECK_TIMEOUT,
            check_fn,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<F, Fut> HealthCheck for FnCheck<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = HealthResult<CheckDetails>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn critical(&self) -> bool {
        self.critical
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn check(&self) -> HealthResult<CheckDetails> {
        (self.check_fn)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HealthError;

    #[tokio::test]
    async fn test_fn_check() {
        let check = FnCheck::new("datastore", true, || async {
            let mut details = CheckDetails::new();
            details.insert("connection".into(), "ok".into());
            Ok(details)
        })
        .with_timeout(Duration::from_secs(3));

        assert_eq!(check.name(), "datastore");
        assert!(check.critical());
        assert_eq!(check.timeout(), Duration::from_secs(3));
        assert_eq!(check.check().await.unwrap()["connection"], "ok");
    }

    #[tokio::test]
    async fn test_fn_check_failure() {
        let check = FnCheck::new("weather_service", false, || async {
            Err(HealthError::failed("Timeout", "IPMA did not answer"))
        });

        assert_eq!(check.timeout(), DEFAULT_CHECK_TIMEOUT);
        let err = check.check().await.unwrap_err();
        assert_eq!(err.error_type(), "Timeout");
    }
}
