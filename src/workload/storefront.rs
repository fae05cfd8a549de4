//! Storefront workload
//!
//! Every iteration reads six endpoints unconditionally, then creates a
//! customer and a product with independent probabilities. The custom
//! `errors` rate gets one sample per iteration: `true` when any of the six
//! reads did not answer 200.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::payload::{sample_customer, sample_product};
use super::sampling::{pacing_delay, should_fire};
use crate::config::WorkloadConfig;
use crate::error::Result;
use crate::metrics::{MetricKind, MetricsRegistry};
use crate::scenario::{RunInfo, Scenario, VuContext};

pub const ERRORS_METRIC: &str = "errors";

const EXPECTED_STATUS: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub check: &'static str,
}

/// Mandatory reads, in the order they are issued
pub const READ_ENDPOINTS: [Endpoint; 6] = [
    Endpoint { path: "/health", check: "health check status is 200" },
    Endpoint { path: "/", check: "root status is 200" },
    Endpoint { path: "/whoami", check: "whoami status is 200" },
    Endpoint { path: "/products/", check: "products list status is 200" },
    Endpoint { path: "/customers/", check: "customers list status is 200" },
    Endpoint { path: "/orders/", check: "orders list status is 200" },
];

pub const CREATE_CUSTOMER: Endpoint = Endpoint {
    path: "/customers/",
    check: "create customer status is 200",
};

pub const CREATE_PRODUCT: Endpoint = Endpoint {
    path: "/products/",
    check: "create product status is 200",
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub endpoint: Endpoint,
    pub status: u16,
}

/// What one iteration did, for callers that want more than the metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationReport {
    pub reads: Vec<ReadResult>,
    /// Status of the customer create, `None` when the draw skipped it
    pub customer_create: Option<u16>,
    pub product_create: Option<u16>,
    /// Composite error signal fed into the `errors` rate
    pub error: bool,
    pub pacing: Duration,
}

pub struct StorefrontScenario {
    config: WorkloadConfig,
}

impl StorefrontScenario {
    pub fn new(config: WorkloadConfig) -> Self {
        Self { config }
    }

    /// Issue the requests and record checks, without the pacing sleep
    pub async fn run_iteration(&self, vu: &mut VuContext) -> IterationReport {
        let mut reads = Vec::with_capacity(READ_ENDPOINTS.len());
        for endpoint in READ_ENDPOINTS {
            let outcome = vu.http.get(endpoint.path).await;
            vu.check(endpoint.check, outcome.is_status(EXPECTED_STATUS));
            reads.push(ReadResult {
                endpoint,
                status: outcome.status,
            });
        }

        let customer_create = if should_fire(self.config.customer_create_probability, &mut vu.rng) {
            let body = sample_customer(&mut vu.rng);
            let outcome = vu.http.post_json(CREATE_CUSTOMER.path, &body).await;
            vu.check(CREATE_CUSTOMER.check, outcome.is_status(EXPECTED_STATUS));
            Some(outcome.status)
        } else {
            None
        };

        let product_create = if should_fire(self.config.product_create_probability, &mut vu.rng) {
            let body = sample_product(&mut vu.rng);
            let outcome = vu.http.post_json(CREATE_PRODUCT.path, &body).await;
            vu.check(CREATE_PRODUCT.check, outcome.is_status(EXPECTED_STATUS));
            Some(outcome.status)
        } else {
            None
        };

        let error = reads.iter().any(|r| r.status != EXPECTED_STATUS);
        vu.metrics.add_rate(ERRORS_METRIC, error);

        let pacing = pacing_delay(self.config.pacing_min, self.config.pacing_max, &mut vu.rng);

        IterationReport {
            reads,
            customer_create,
            product_create,
            error,
            pacing,
        }
    }
}

#[async_trait]
impl Scenario for StorefrontScenario {
    fn name(&self) -> &str {
        "storefront"
    }

    fn register_metrics(&self, metrics: &MetricsRegistry) -> Result<()> {
        metrics.register(ERRORS_METRIC, MetricKind::Rate)
    }

    async fn setup(&self, info: &RunInfo) {
        let total = info.profile.total_duration();
        info!(
            run_id = %info.run_id,
            target = %info.base_url,
            duration = %humantime_serde::re::humantime::format_duration(total),
            max_vus = info.profile.max_vus(),
            "starting storefront load test"
        );
        for window in info.profile.windows() {
            info!(
                stage = window.index,
                from = %humantime_serde::re::humantime::format_duration(window.start),
                to = %humantime_serde::re::humantime::format_duration(window.end),
                "ramp {} -> {} VUs",
                window.from,
                window.to
            );
        }
        info!(
            customer_create = self.config.customer_create_probability,
            product_create = self.config.product_create_probability,
            "write mix"
        );
    }

    async fn iteration(&self, vu: &mut VuContext) {
        let report = self.run_iteration(vu).await;
        vu.pause(report.pacing).await;
    }

    async fn teardown(&self, info: &RunInfo) {
        info!(run_id = %info.run_id, target = %info.base_url, "storefront load test completed");
    }
}
