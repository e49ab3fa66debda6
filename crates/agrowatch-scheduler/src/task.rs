//! Periodic task loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{CycleResult, SchedulerError, SchedulerResult};

/// Default pause after a failed cycle.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Default bound on how long `stop` waits for the loop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Unit of work executed once per cycle.
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Run one cycle. An error puts the loop into backoff; it never stops it.
    async fn run_cycle(&self) -> CycleResult;
}

/// Timing of a periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Sleep between successful cycles.
    pub interval: Duration,
    /// Sleep after a failed cycle.
    pub error_backoff: Duration,
    /// How long `stop` waits for the current cycle to finish.
    pub stop_timeout: Duration,
}

impl TaskConfig {
    /// Create a config running every `interval` with default backoff and stop timeout.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

/// Counters describing what the loop has done so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_error: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl TaskStats {
    fn record_success(&mut self) {
        self.cycles_completed += 1;
        self.last_cycle_at = Some(Utc::now());
    }

    fn record_failure(&mut self, reason: String) {
        self.cycles_failed += 1;
        self.last_error = Some(reason);
        self.last_cycle_at = Some(Utc::now());
    }
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// A job plus the loop that drives it.
///
/// `start` and `stop` are both idempotent. Dropping a started task aborts
/// its loop without waiting.
pub struct PeriodicTask {
    job: Arc<dyn PeriodicJob>,
    config: TaskConfig,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<TaskStats>>,
    active: Mutex<Option<RunningLoop>>,
}

impl PeriodicTask {
    /// Create a new, stopped task.
    pub fn new(job: Arc<dyn PeriodicJob>, config: TaskConfig) -> Self {
        Self {
            job,
            config,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(TaskStats::default())),
            active: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Whether the loop is currently alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> TaskStats {
        self.stats.lock().clone()
    }

    /// Spawn the loop. Returns `false` if it was already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut active = self.active.lock();
        if active.is_some() {
            debug!(task = %self.name(), "Periodic task already running");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        self.running.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.job),
            self.config,
            shutdown_rx,
            Arc::clone(&self.stats),
            Arc::clone(&self.running),
        ));

        *active = Some(RunningLoop { shutdown, handle });

        info!(
            task = %self.name(),
            interval_secs = self.config.interval.as_secs_f64(),
            "Periodic task started"
        );
        true
    }

    /// Signal the loop and wait for its current cycle to finish.
    ///
    /// If the loop does not exit within the stop timeout it is aborted and
    /// [`SchedulerError::StopTimedOut`] is returned. Stopping an idle task is
    /// a no-op.
    pub async fn stop(&self) -> SchedulerResult<()> {
        let active = self.active.lock().take();
        let Some(RunningLoop {
            shutdown,
            mut handle,
        }) = active
        else {
            return Ok(());
        };

        // The receiver may already be gone if the loop exited on its own.
        let _ = shutdown.send(true);

        let outcome = tokio::time::timeout(self.config.stop_timeout, &mut handle).await;
        self.running.store(false, Ordering::SeqCst);

        match outcome {
            Ok(Ok(())) => {
                info!(task = %self.name(), "Periodic task stopped");
                Ok(())
            }
            Ok(Err(join_error)) => {
                error!(task = %self.name(), error = %join_error, "Periodic task terminated abnormally");
                Err(SchedulerError::Terminated {
                    task: self.name().to_string(),
                    reason: join_error.to_string(),
                })
            }
            Err(_) => {
                handle.abort();
                warn!(
                    task = %self.name(),
                    waited_ms = self.config.stop_timeout.as_millis() as u64,
                    "Periodic task did not stop in time, aborted"
                );
                Err(SchedulerError::StopTimedOut {
                    task: self.name().to_string(),
                    waited_ms: self.config.stop_timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.handle.abort();
        }
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name())
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run_loop(
    job: Arc<dyn PeriodicJob>,
    config: TaskConfig,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<TaskStats>>,
    running: Arc<AtomicBool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let outcome = AssertUnwindSafe(job.run_cycle()).catch_unwind().await;

        let delay = match outcome {
            Ok(Ok(())) => {
                stats.lock().record_success();
                config.interval
            }
            Ok(Err(e)) => {
                error!(
                    task = %job.name(),
                    error = %e,
                    backoff_secs = config.error_backoff.as_secs_f64(),
                    "Periodic cycle failed"
                );
                stats.lock().record_failure(e.to_string());
                config.error_backoff
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(
                    task = %job.name(),
                    panic = %reason,
                    backoff_secs = config.error_backoff.as_secs_f64(),
                    "Periodic cycle panicked"
                );
                stats.lock().record_failure(reason);
                config.error_backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Owner dropped without calling stop.
                    break;
                }
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    debug!(task = %job.name(), "Periodic loop exited");
}

/// Text of a caught panic payload, for logs and error values.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct CountingJob {
        runs: AtomicU64,
        fail: bool,
    }

    impl CountingJob {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicU64::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl PeriodicJob for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run_cycle(&self) -> CycleResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("boom".into());
            }
            Ok(())
        }
    }

    struct PanicOnceJob {
        runs: AtomicU64,
    }

    #[async_trait]
    impl PeriodicJob for PanicOnceJob {
        fn name(&self) -> &str {
            "panic-once"
        }

        async fn run_cycle(&self) -> CycleResult {
            if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first cycle explodes");
            }
            Ok(())
        }
    }

    struct SlowJob;

    #[async_trait]
    impl PeriodicJob for SlowJob {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run_cycle(&self) -> CycleResult {
            tokio::time::sleep(Duration::from_secs(100)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_interval() {
        let job = CountingJob::new(false);
        let task = PeriodicTask::new(job.clone(), TaskConfig::every(Duration::from_secs(10)));

        assert!(task.start());
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(job.runs.load(Ordering::SeqCst), 3);
        assert_eq!(task.stats().cycles_completed, 3);
        assert!(task.is_running());

        task.stop().await.unwrap();
        assert!(!task.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_uses_backoff() {
        let job = CountingJob::new(true);
        let config = TaskConfig::every(Duration::from_secs(10))
            .with_error_backoff(Duration::from_secs(60));
        let task = PeriodicTask::new(job.clone(), config);

        task.start();
        tokio::time::sleep(Duration::from_secs(65)).await;

        // t=0 and t=60 only; the 10s interval is not used after a failure.
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
        let stats = task.stats();
        assert_eq!(stats.cycles_failed, 2);
        assert_eq!(stats.last_error.as_deref(), Some("boom"));

        task.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_does_not_kill_loop() {
        let job = Arc::new(PanicOnceJob {
            runs: AtomicU64::new(0),
        });
        let config = TaskConfig::every(Duration::from_secs(5))
            .with_error_backoff(Duration::from_secs(1));
        let task = PeriodicTask::new(job.clone(), config);

        task.start();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let stats = task.stats();
        assert_eq!(stats.cycles_failed, 1);
        assert_eq!(stats.cycles_completed, 1);
        assert!(task.is_running());

        task.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let task = PeriodicTask::new(CountingJob::new(false), TaskConfig::every(Duration::from_secs(1)));

        assert!(task.start());
        assert!(!task.start());

        task.stop().await.unwrap();
        task.stop().await.unwrap();
        assert!(!task.is_running());

        // A stopped task can be started again.
        assert!(task.start());
        task.stop().await.unwrap();
    }

    #[test]
    fn test_panic_message_payloads() {
        let payload = std::panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static text");

        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_times_out_on_stuck_cycle() {
        let config = TaskConfig::every(Duration::from_secs(1))
            .with_stop_timeout(Duration::from_secs(2));
        let task = PeriodicTask::new(Arc::new(SlowJob), config);

        task.start();
        tokio::task::yield_now().await;

        let err = task.stop().await.unwrap_err();
        assert!(matches!(err, SchedulerError::StopTimedOut { waited_ms: 2000, .. }));
        assert!(!task.is_running());
    }
}
