use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use storefront_loadtest::metrics::{
    Aggregation, MetricKind, MetricsRegistry, HTTP_REQ_FAILED, ITERATIONS, VUS, VUS_MAX,
};
use storefront_loadtest::profile::Stage;
use storefront_loadtest::report::{EXIT_INTERRUPTED, EXIT_OK, EXIT_THRESHOLDS_FAILED};
use storefront_loadtest::runtime::{EndReason, LoadTest};
use storefront_loadtest::scenario::{Scenario, VuContext};
use storefront_loadtest::threshold::ThresholdSpec;
use storefront_loadtest::workload::{StorefrontScenario, ERRORS_METRIC};
use storefront_loadtest::LoadTestError;

use super::mock_storefront::{quick_config, MockStorefront};

/// Test: healthy service, short ramp
///
/// Ramps 0 -> 3 VUs and holds; every threshold passes and the summary
/// reflects the traffic the mock actually saw.
#[tokio::test]
async fn test_short_ramp_against_healthy_service() {
    let mock = MockStorefront::healthy().await;
    let cfg = quick_config(&mock);
    let test = LoadTest::new(cfg.clone(), Arc::new(StorefrontScenario::new(cfg.workload.clone())));

    let summary = test.run().await.unwrap();

    assert_eq!(summary.end_reason, EndReason::Completed);
    assert!(summary.passed(), "{}", summary.render_text());
    assert_eq!(summary.exit_code(), EXIT_OK);
    assert_eq!(summary.peak_vus, 3);
    assert_eq!(summary.vus_started, 3);
    assert!(summary.iterations > 0);

    // every completed iteration issued exactly six reads
    let health_reads = mock.count("GET", "/health").await as u64;
    assert!(health_reads >= summary.iterations);
    assert_eq!(mock.count("GET", "/orders/").await as u64, health_reads);

    let vus_max = summary.metrics.metric(VUS_MAX).unwrap();
    assert_eq!(vus_max.get("value"), Some(3.0));
    let vus = summary.metrics.metric(VUS).unwrap();
    assert_eq!(vus.get("max"), Some(3.0));
    assert_eq!(vus.get("value"), Some(0.0));

    let errors = summary.metrics.metric(ERRORS_METRIC).unwrap();
    assert_eq!(errors.get("rate"), Some(0.0));
}

/// Test: health endpoint always 500
///
/// The composite error signal is true on every iteration, so the
/// `errors rate<0.2` threshold fails and the run exits with 99.
#[tokio::test]
async fn test_failing_health_check_fails_errors_threshold() {
    let mock = MockStorefront::start(&[("/health", 500)]).await;
    let cfg = quick_config(&mock);
    let test = LoadTest::new(cfg.clone(), Arc::new(StorefrontScenario::new(cfg.workload.clone())));

    let summary = test.run().await.unwrap();

    assert_eq!(summary.end_reason, EndReason::Completed);
    assert!(!summary.passed());
    assert_eq!(summary.exit_code(), EXIT_THRESHOLDS_FAILED);

    let errors = summary
        .thresholds
        .iter()
        .find(|t| t.metric == ERRORS_METRIC)
        .unwrap();
    assert!(!errors.passed);
    assert_eq!(errors.observed, Some(1.0));

    // one in six reads fails, which stays under the http_req_failed bound
    let failed = summary
        .thresholds
        .iter()
        .find(|t| t.metric == HTTP_REQ_FAILED)
        .unwrap();
    assert!(failed.passed);
}

/// Test: abort_on_fail stops the ramp early
#[tokio::test]
async fn test_abort_on_fail_threshold_ends_run_early() {
    let mock = MockStorefront::start(&[("/health", 500)]).await;
    let mut cfg = quick_config(&mock);
    cfg.load.stages = vec![
        Stage::new(Duration::from_millis(100), 2),
        Stage::new(Duration::from_secs(30), 2),
    ];
    cfg.thresholds.insert(
        ERRORS_METRIC.to_string(),
        vec![ThresholdSpec::Detailed {
            threshold: "rate<0.2".to_string(),
            abort_on_fail: true,
        }],
    );
    let test = LoadTest::new(cfg.clone(), Arc::new(StorefrontScenario::new(cfg.workload.clone())));

    let started = Instant::now();
    let summary = test.run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        summary.end_reason,
        EndReason::ThresholdAborted {
            metric: ERRORS_METRIC.to_string(),
            expression: "rate<0.2".to_string(),
        }
    );
    assert_eq!(summary.exit_code(), EXIT_THRESHOLDS_FAILED);
}

/// Test: external interrupt
///
/// A shutdown signal mid-ramp ends the run promptly; the summary is still
/// produced and marked interrupted.
#[tokio::test]
async fn test_interrupt_produces_summary() {
    let mock = MockStorefront::healthy().await;
    let mut cfg = quick_config(&mock);
    cfg.load.stages = vec![
        Stage::new(Duration::from_millis(100), 4),
        Stage::new(Duration::from_secs(60), 4),
    ];
    cfg.workload.pacing_min = Duration::from_secs(1);
    cfg.workload.pacing_max = Duration::from_secs(2);
    let test = LoadTest::new(cfg.clone(), Arc::new(StorefrontScenario::new(cfg.workload.clone())));

    let started = Instant::now();
    let summary = test
        .run_until(tokio::time::sleep(Duration::from_millis(400)))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.end_reason, EndReason::Interrupted);
    assert_eq!(summary.exit_code(), EXIT_INTERRUPTED);
    assert!(mock.total_requests().await > 0);
}

/// Test: malformed thresholds are rejected before any traffic
#[tokio::test]
async fn test_bad_threshold_rejected_before_traffic() {
    let mock = MockStorefront::healthy().await;
    let mut cfg = quick_config(&mock);
    cfg.thresholds
        .insert("http_req_duration".to_string(), vec![ThresholdSpec::from("p95<1000")]);
    let test = LoadTest::new(cfg.clone(), Arc::new(StorefrontScenario::new(cfg.workload.clone())));

    let err = test.run().await.unwrap_err();
    assert!(matches!(err, LoadTestError::InvalidThreshold { .. }));
    assert_eq!(mock.total_requests().await, 0);
}

/// Test: thresholds on metrics nobody records are rejected
#[tokio::test]
async fn test_unknown_metric_threshold_rejected() {
    let mock = MockStorefront::healthy().await;
    let mut cfg = quick_config(&mock);
    cfg.thresholds
        .insert("checkout_latency".to_string(), vec![ThresholdSpec::from("avg<100")]);
    let test = LoadTest::new(cfg.clone(), Arc::new(StorefrontScenario::new(cfg.workload.clone())));

    let err = test.run().await.unwrap_err();
    assert!(matches!(err, LoadTestError::UnknownMetric(ref m) if m == "checkout_latency"));
    assert_eq!(mock.total_requests().await, 0);
}

/// Test: ramp up then down
///
/// 0 -> 6 over 1.5s, then 6 -> 0 over 1.5s. Users retire as the target
/// drops, and the gauge never exceeds the profile's peak.
#[tokio::test]
async fn test_ramp_up_and_down_tracks_profile() {
    let mock = MockStorefront::healthy().await;
    let mut cfg = quick_config(&mock);
    cfg.load.stages = vec![
        Stage::new(Duration::from_millis(1500), 6),
        Stage::new(Duration::from_millis(1500), 0),
    ];
    let test = LoadTest::new(cfg.clone(), Arc::new(StorefrontScenario::new(cfg.workload.clone())));

    let summary = test.run().await.unwrap();

    assert_eq!(summary.end_reason, EndReason::Completed);
    assert_eq!(summary.peak_vus, 6);
    assert_eq!(summary.vus_started, 6);
    assert_eq!(summary.vus_aborted, 0);
    let vus = summary.metrics.metric(VUS).unwrap();
    assert_eq!(vus.get("max"), Some(6.0));
    assert!(summary.passed(), "{}", summary.render_text());
}

/// Test: graceful stop expires
///
/// Pacing far longer than the stop window: every VU is still asleep when
/// the window closes, so all of them are aborted and none of their
/// iterations count.
#[tokio::test]
async fn test_graceful_stop_expiry_aborts_stragglers() {
    let mock = MockStorefront::healthy().await;
    let mut cfg = quick_config(&mock);
    cfg.load.stages = vec![Stage::new(Duration::from_millis(300), 3)];
    cfg.load.graceful_stop = Duration::from_millis(100);
    cfg.workload.pacing_min = Duration::from_secs(5);
    cfg.workload.pacing_max = Duration::from_secs(5);
    let test = LoadTest::new(cfg.clone(), Arc::new(StorefrontScenario::new(cfg.workload.clone())));

    let started = Instant::now();
    let summary = test.run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert_eq!(summary.end_reason, EndReason::Completed);
    assert_eq!(summary.peak_vus, 3);
    assert_eq!(summary.vus_aborted, summary.peak_vus as usize);
    assert_eq!(summary.iterations, 0);
    assert!(mock.total_requests().await > 0);
    assert_eq!(summary.metrics.metric(VUS).unwrap().get("value"), Some(0.0));
}

const VUS_SEEN: &str = "vus_seen";

/// Sleeps through one long iteration, then records the `vus` gauge it sees
struct SlowIteration {
    work: Duration,
}

#[async_trait]
impl Scenario for SlowIteration {
    fn name(&self) -> &str {
        "slow-iteration"
    }

    fn register_metrics(&self, metrics: &MetricsRegistry) -> storefront_loadtest::Result<()> {
        metrics.register(VUS_SEEN, MetricKind::Trend)
    }

    async fn iteration(&self, vu: &mut VuContext) {
        tokio::time::sleep(self.work).await;
        let seen = vu.metrics.aggregate(VUS, Aggregation::Value).unwrap_or_default();
        vu.metrics.add_trend(VUS_SEEN, seen);
    }
}

/// Test: retired users finish their iteration
///
/// The target drops to zero while both users are mid-iteration. They are
/// retired, not interrupted: each completes its iteration, and the `vus`
/// gauge keeps counting them until they do.
#[tokio::test]
async fn test_retired_vus_finish_iteration_and_stay_in_gauge() {
    let mock = MockStorefront::healthy().await;
    let mut cfg = quick_config(&mock);
    cfg.thresholds.clear();
    cfg.load.stages = vec![
        Stage::new(Duration::from_millis(40), 2),
        Stage::new(Duration::from_millis(100), 2),
        Stage::new(Duration::ZERO, 0),
        Stage::new(Duration::from_millis(600), 0),
    ];
    let scenario = SlowIteration {
        work: Duration::from_millis(400),
    };
    let test = LoadTest::new(cfg, Arc::new(scenario));

    let summary = test.run().await.unwrap();

    assert_eq!(summary.end_reason, EndReason::Completed);
    assert_eq!(summary.vus_started, 2);
    assert_eq!(summary.vus_aborted, 0);
    // retired between iterations: one full iteration each, never a second
    assert_eq!(
        summary.metrics.metric(ITERATIONS).unwrap().get("count"),
        Some(2.0)
    );
    let seen = summary.metrics.metric(VUS_SEEN).unwrap();
    assert_eq!(seen.get("count"), Some(2.0));
    assert_eq!(seen.get("max"), Some(2.0));
}
