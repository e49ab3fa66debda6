use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agrowatch_alerts::{AlertResult, EmailConfig, MailTransport, OutgoingMail, ThresholdRule};
use agrowatch_health::{CheckDetails, HealthError};
use agrowatch_metrics::{MetricsResult, SystemSnapshot, SystemSource};
use agrowatch_runtime::{SystemView, TelemetryConfig, TelemetryContext};
use agrowatch_types::{tags, ChannelId, Comparison, ManualClock, OverallStatus, Severity};
use async_trait::async_trait;
use chrono::Utc;

struct FixedSource {
    cpu: Option<f64>,
    memory: Option<f64>,
    disk: Option<f64>,
}

impl SystemSource for FixedSource {
    fn sample(&self) -> MetricsResult<SystemSnapshot> {
        let mut snapshot = SystemSnapshot::unavailable(Utc::now());
        snapshot.cpu_percent = self.cpu;
        snapshot.memory_percent = self.memory;
        snapshot.disk_percent = self.disk;
        Ok(snapshot)
    }
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMail>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn deliver(&self, _config: &EmailConfig, mail: OutgoingMail) -> AlertResult<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Accepts mail but never finishes delivering it.
#[derive(Default)]
struct StalledTransport {
    attempts: AtomicUsize,
}

#[async_trait]
impl MailTransport for StalledTransport {
    async fn deliver(&self, _config: &EmailConfig, _mail: OutgoingMail) -> AlertResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(())
    }
}

fn email_config() -> EmailConfig {
    EmailConfig {
        smtp_host: "smtp.example.pt".into(),
        smtp_port: 587,
        username: "alerts".into(),
        password: "secret".into(),
        from: "alerts@example.pt".into(),
        to: vec!["ops@example.pt".into()],
    }
}

struct Harness {
    telemetry: Arc<TelemetryContext>,
    clock: Arc<ManualClock>,
    mail: Arc<RecordingTransport>,
}

fn harness_with_source(source: FixedSource) -> Harness {
    let mut config = TelemetryConfig::default();
    config.health.builtin_checks = false;

    let clock = Arc::new(ManualClock::starting_now());
    let mail = Arc::new(RecordingTransport::default());
    let telemetry = TelemetryContext::builder(config)
        .clock(clock.clone())
        .system_source(Arc::new(source))
        .mail_transport(mail.clone())
        .build()
        .unwrap();

    Harness {
        telemetry,
        clock,
        mail,
    }
}

fn harness() -> Harness {
    harness_with_source(FixedSource {
        cpu: Some(20.0),
        memory: Some(40.0),
        disk: Some(50.0),
    })
}

fn ok_details() -> CheckDetails {
    let mut details = CheckDetails::new();
    details.insert("status".into(), "ok".into());
    details
}

#[tokio::test]
async fn slow_request_raises_response_time_alert() {
    let h = harness();

    let stats = h
        .telemetry
        .record_request(Duration::from_secs(3), 200)
        .await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.errors, 0);

    let active = h.telemetry.alerts().get_active_alerts();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].rule_name, "response_time");
    assert_eq!(active[0].metric_value, Some(3.0));

    let metrics = h.telemetry.metrics();
    assert_eq!(metrics.counter("http.requests.total", None), 1.0);
    assert_eq!(
        metrics.counter(
            "http.responses.total",
            Some(&tags([("status_code", "200")]))
        ),
        1.0
    );
    assert_eq!(
        metrics
            .histogram_stats("http.request.duration", None)
            .unwrap()
            .count,
        1
    );
}

#[tokio::test]
async fn error_rate_alert_respects_cooldown() {
    let h = harness();
    let fast = Duration::from_millis(100);

    h.telemetry.record_request(fast, 500).await;
    h.telemetry.record_request(fast, 200).await;
    assert_eq!(h.telemetry.alerts().get_alert_history(10).len(), 1);

    h.clock.advance(Duration::from_secs(301));
    let stats = h.telemetry.record_request(fast, 503).await;
    assert!((stats.error_rate - 200.0 / 3.0).abs() < 1e-9);

    let history = h.telemetry.alerts().get_alert_history(10);
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|a| a.rule_name == "error_rate"));
}

#[tokio::test]
async fn disabled_monitoring_ignores_everything() {
    let h = harness();
    h.telemetry.disable_monitoring();
    assert!(!h.telemetry.is_monitoring_enabled());

    assert!(h
        .telemetry
        .observe("cpu_usage", 99.0, "%", None)
        .await
        .is_empty());
    h.telemetry
        .record_request(Duration::from_secs(10), 500)
        .await;
    assert_eq!(h.telemetry.metrics().counter("http.requests.total", None), 0.0);
    assert_eq!(h.telemetry.requests().stats().total, 0);

    h.telemetry.enable_monitoring();
    let raised = h.telemetry.observe("cpu_usage", 99.0, "%", None).await;
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].severity, Severity::High);
    assert_eq!(
        h.telemetry
            .metrics()
            .metric_history("cpu_usage", Duration::from_secs(60))
            .len(),
        1
    );
}

#[tokio::test]
async fn host_samples_feed_the_alert_engine() {
    let h = harness_with_source(FixedSource {
        cpu: Some(95.0),
        memory: Some(40.0),
        disk: Some(92.0),
    });
    assert_eq!(h.telemetry.dashboard().system, SystemView::Unavailable);

    h.telemetry.sampler().sample_now().await.unwrap();

    let mut rules: Vec<String> = h
        .telemetry
        .alerts()
        .get_active_alerts()
        .into_iter()
        .map(|a| a.rule_name)
        .collect();
    rules.sort();
    assert_eq!(rules, vec!["cpu_usage", "disk_usage"]);

    let dashboard = h.telemetry.dashboard();
    assert!(matches!(dashboard.system, SystemView::Available(_)));
    assert_eq!(dashboard.alerts.active_count, 2);
    assert_eq!(dashboard.alerts.by_severity["critical"], 1);
    assert_eq!(
        h.telemetry.metrics().gauge("system.cpu.percent", None),
        Some(95.0)
    );
}

#[tokio::test]
async fn unavailable_host_figures_degrade_gracefully() {
    let h = harness_with_source(FixedSource {
        cpu: None,
        memory: None,
        disk: None,
    });

    h.telemetry.sampler().sample_now().await.unwrap();

    let dashboard = h.telemetry.dashboard();
    assert_eq!(dashboard.system, SystemView::Unavailable);
    assert!(dashboard.active_alerts.is_empty());
    assert_eq!(h.telemetry.metrics().gauge("system.cpu.percent", None), None);
}

#[tokio::test]
async fn critical_check_failure_makes_system_unhealthy() {
    let h = harness();
    let health = h.telemetry.health();
    health
        .register_fn("datastore", true, || async {
            Err(HealthError::failed("ConnectionRefused", "datastore unreachable"))
        })
        .unwrap();
    health
        .register_fn("weather_service", false, || async { Ok(ok_details()) })
        .unwrap();
    health
        .register_fn("external_services", false, || async { Ok(ok_details()) })
        .unwrap();

    assert_eq!(h.telemetry.dashboard().health_status, None);

    let summary = h.telemetry.health_summary(false).await;
    assert_eq!(summary.overall_status, OverallStatus::Unhealthy);
    assert_eq!(summary.failed_checks, 1);
    assert_eq!(summary.critical_failures, 1);

    let cached = h.telemetry.health_summary(false).await;
    assert_eq!(cached.timestamp, summary.timestamp);
    assert_eq!(
        h.telemetry.dashboard().health_status,
        Some(OverallStatus::Unhealthy)
    );

    let check = tags([("check", "datastore")]);
    assert_eq!(
        h.telemetry
            .metrics()
            .counter("health_check.errors", Some(&check)),
        1.0
    );
}

#[tokio::test]
async fn email_channel_receives_routed_alerts() {
    let h = harness();
    h.telemetry.configure_email(email_config());
    h.telemetry
        .alerts()
        .add_rule(
            ThresholdRule::new(
                "soil_moisture_low",
                "soil_moisture",
                15.0,
                Comparison::LessThan,
                Severity::Critical,
            )
            .with_channels([ChannelId::log(), ChannelId::email()]),
        )
        .unwrap();

    let raised = h
        .telemetry
        .observe("soil_moisture", 9.5, "%", None)
        .await;
    assert_eq!(raised.len(), 1);

    let sent = h.mail.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "[AgroWatch Alert - CRITICAL] soil_moisture_low");
}

#[tokio::test]
async fn request_path_does_not_wait_on_mail_delivery() {
    let mut config = TelemetryConfig::default();
    config.health.builtin_checks = false;
    config.email = email_config();

    let transport = Arc::new(StalledTransport::default());
    let telemetry = TelemetryContext::builder(config)
        .system_source(Arc::new(FixedSource {
            cpu: None,
            memory: None,
            disk: None,
        }))
        .mail_transport(transport.clone())
        .build()
        .unwrap();
    telemetry
        .alerts()
        .add_rule(
            ThresholdRule::new(
                "slow_request_email",
                "response_time",
                2.0,
                Comparison::GreaterThan,
                Severity::High,
            )
            .with_channels([ChannelId::email()]),
        )
        .unwrap();

    let stats = tokio::time::timeout(
        Duration::from_secs(5),
        telemetry.record_request(Duration::from_secs(3), 200),
    )
    .await
    .expect("record_request waited on mail delivery");
    assert_eq!(stats.total, 1);

    let mut rules: Vec<String> = telemetry
        .alerts()
        .get_active_alerts()
        .into_iter()
        .map(|a| a.rule_name)
        .collect();
    rules.sort();
    assert_eq!(rules, vec!["response_time", "slow_request_email"]);

    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.attempts.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn thresholds_can_be_retuned_at_runtime() {
    let h = harness();
    assert_eq!(h.telemetry.set_threshold("cpu_usage", 95.0).unwrap(), 1);

    assert!(h
        .telemetry
        .observe("cpu_usage", 90.0, "%", None)
        .await
        .is_empty());
    assert_eq!(
        h.telemetry
            .observe("cpu_usage", 96.0, "%", None)
            .await
            .len(),
        1
    );
    assert!(h.telemetry.set_threshold("cpu_usage", f64::INFINITY).is_err());
}

#[tokio::test]
async fn background_tasks_start_and_stop() {
    let h = harness();

    h.telemetry.start();
    h.telemetry.start();
    assert!(h.telemetry.is_running());

    h.telemetry.stop().await.unwrap();
    assert!(!h.telemetry.is_running());
    h.telemetry.stop().await.unwrap();
}
