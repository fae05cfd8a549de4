use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use storefront_loadtest::config::{Config, WorkloadConfig};
use storefront_loadtest::http::HttpClient;
use storefront_loadtest::metrics::{Aggregation, MetricsRegistry, CHECKS, HTTP_REQS, HTTP_REQ_FAILED};
use storefront_loadtest::scenario::{Scenario, VuContext};
use storefront_loadtest::workload::{
    StorefrontScenario, CREATE_CUSTOMER, CREATE_PRODUCT, ERRORS_METRIC, READ_ENDPOINTS,
};

use super::mock_storefront::MockStorefront;

fn workload(customer: f64, product: f64) -> WorkloadConfig {
    WorkloadConfig {
        customer_create_probability: customer,
        product_create_probability: product,
        ..Config::default().workload
    }
}

fn vu(mock: &MockStorefront, seed: u64) -> (VuContext, Arc<MetricsRegistry>) {
    let metrics = Arc::new(MetricsRegistry::new());
    let http = HttpClient::new(&mock.target(), Arc::clone(&metrics)).unwrap();
    let ctx = VuContext::new(
        1,
        StdRng::seed_from_u64(seed),
        http,
        Arc::clone(&metrics),
        CancellationToken::new(),
    );
    (ctx, metrics)
}

/// All endpoints 200 and no writes drawn: error rate 0, every check passes
#[tokio::test]
async fn test_healthy_service_without_writes() {
    let mock = MockStorefront::healthy().await;
    let scenario = StorefrontScenario::new(workload(0.0, 0.0));
    let (mut ctx, metrics) = vu(&mock, 1);
    scenario.register_metrics(&metrics).unwrap();

    for _ in 0..5 {
        let report = scenario.run_iteration(&mut ctx).await;
        assert!(!report.error);
        assert_eq!(report.customer_create, None);
        assert_eq!(report.product_create, None);
        assert!(report.reads.iter().all(|r| r.status == 200));
    }

    assert_eq!(metrics.aggregate(ERRORS_METRIC, Aggregation::Rate), Some(0.0));
    assert_eq!(metrics.aggregate(CHECKS, Aggregation::Rate), Some(1.0));
    assert_eq!(metrics.aggregate(HTTP_REQS, Aggregation::Count), Some(30.0));
    assert_eq!(mock.count("POST", "/customers/").await, 0);
    assert_eq!(mock.count("POST", "/products/").await, 0);

    let snapshot = metrics.snapshot();
    for endpoint in READ_ENDPOINTS {
        let tally = snapshot.check(endpoint.check).unwrap();
        assert_eq!((tally.passes, tally.fails), (5, 0));
    }
}

/// Failing reads never short-circuit the remaining calls
#[tokio::test]
async fn test_all_six_reads_attempted_when_everything_fails() {
    let overrides: Vec<(&str, u16)> = READ_ENDPOINTS.iter().map(|e| (e.path, 500)).collect();
    let mock = MockStorefront::start(&overrides).await;
    let scenario = StorefrontScenario::new(workload(0.0, 0.0));
    let (mut ctx, metrics) = vu(&mock, 2);

    let report = scenario.run_iteration(&mut ctx).await;

    assert_eq!(report.reads.len(), 6);
    assert!(report.error);
    for endpoint in READ_ENDPOINTS {
        assert_eq!(mock.count("GET", endpoint.path).await, 1, "{}", endpoint.path);
    }
    assert_eq!(metrics.aggregate(HTTP_REQ_FAILED, Aggregation::Rate), Some(1.0));
    assert_eq!(metrics.aggregate(CHECKS, Aggregation::Rate), Some(0.0));
}

/// A single non-200 read flips the composite error signal
#[tokio::test]
async fn test_health_500_sets_error_signal() {
    let mock = MockStorefront::start(&[("/health", 500)]).await;
    let scenario = StorefrontScenario::new(workload(0.0, 0.0));
    let (mut ctx, metrics) = vu(&mock, 3);

    for _ in 0..4 {
        let report = scenario.run_iteration(&mut ctx).await;
        assert!(report.error);
        assert_eq!(report.reads.iter().filter(|r| r.status != 200).count(), 1);
    }

    assert_eq!(metrics.aggregate(ERRORS_METRIC, Aggregation::Rate), Some(1.0));
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.check("health check status is 200").unwrap().fails, 4);
    assert_eq!(snapshot.check("root status is 200").unwrap().passes, 4);
}

/// Certain writes fire every iteration and get their own checks
#[tokio::test]
async fn test_writes_fire_at_certainty() {
    let mock = MockStorefront::healthy().await;
    let scenario = StorefrontScenario::new(workload(1.0, 1.0));
    let (mut ctx, metrics) = vu(&mock, 9);

    let report = scenario.run_iteration(&mut ctx).await;

    assert_eq!(report.customer_create, Some(200));
    assert_eq!(report.product_create, Some(200));
    assert!(!report.error);
    assert_eq!(mock.count("POST", CREATE_CUSTOMER.path).await, 1);
    assert_eq!(mock.count("POST", CREATE_PRODUCT.path).await, 1);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.check(CREATE_CUSTOMER.check).unwrap().passes, 1);
    assert_eq!(snapshot.check(CREATE_PRODUCT.check).unwrap().passes, 1);
    // writes are not part of the composite error signal
    assert_eq!(metrics.aggregate(ERRORS_METRIC, Aggregation::Rate), Some(0.0));
}

/// Writes carry JSON bodies with the expected shape
#[tokio::test]
async fn test_write_bodies_are_json() {
    let mock = MockStorefront::healthy().await;
    let scenario = StorefrontScenario::new(workload(1.0, 1.0));
    let (mut ctx, _) = vu(&mock, 4);

    scenario.run_iteration(&mut ctx).await;

    let requests = mock.server.received_requests().await.unwrap();
    let customer = requests
        .iter()
        .find(|r| r.method.as_str() == "POST" && r.url.path() == "/customers/")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&customer.body).unwrap();
    assert!(body["email"].as_str().unwrap().ends_with("@example.com"));
    assert!(body["phone"].is_string());
    assert_eq!(
        customer.headers.get("content-type").unwrap().to_str().unwrap(),
        "application/json"
    );

    let product = requests
        .iter()
        .find(|r| r.method.as_str() == "POST" && r.url.path() == "/products/")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&product.body).unwrap();
    let price = body["price"].as_u64().unwrap();
    assert!((10..=109).contains(&price));
    assert_eq!(body["description"], "Test product for load testing");
}

/// Transport errors surface as status 0 and count as failures, not panics
#[tokio::test]
async fn test_unreachable_service_is_recorded_not_raised() {
    let mock = MockStorefront::healthy().await;
    let mut target = mock.target();
    // nothing listens on the discard port
    target.base_url = "http://127.0.0.1:9".to_string();
    target.timeout = Duration::from_secs(2);

    let metrics = Arc::new(MetricsRegistry::new());
    let http = HttpClient::new(&target, Arc::clone(&metrics)).unwrap();
    let mut ctx = VuContext::new(5, StdRng::seed_from_u64(5), http, Arc::clone(&metrics), CancellationToken::new());
    let scenario = StorefrontScenario::new(workload(0.0, 0.0));

    let report = scenario.run_iteration(&mut ctx).await;

    assert_eq!(report.reads.len(), 6);
    assert!(report.reads.iter().all(|r| r.status == 0));
    assert!(report.error);
    assert_eq!(metrics.aggregate(HTTP_REQ_FAILED, Aggregation::Rate), Some(1.0));
}

/// Pacing drawn per iteration stays inside the configured window
#[tokio::test]
async fn test_pacing_within_configured_range() {
    let mock = MockStorefront::healthy().await;
    let scenario = StorefrontScenario::new(workload(0.0, 0.0));
    let (mut ctx, _) = vu(&mock, 6);

    for _ in 0..10 {
        let report = scenario.run_iteration(&mut ctx).await;
        assert!(report.pacing >= Duration::from_millis(500));
        assert!(report.pacing <= Duration::from_millis(2500));
    }
}
