use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::executor::{EndReason, ExecutorConfig, RampingExecutor};
use crate::config::Config;
use crate::error::Result;
use crate::http::HttpClient;
use crate::metrics::{Aggregation, MetricsRegistry, ITERATIONS};
use crate::report::RunSummary;
use crate::scenario::{RunInfo, Scenario};

/// Entry point tying configuration, hooks and the executor together.
///
/// Everything that can be rejected without sending traffic (stages,
/// threshold syntax, thresholds on unknown metrics) is checked before the
/// setup hook runs.
pub struct LoadTest {
    config: Config,
    scenario: Arc<dyn Scenario>,
}

impl LoadTest {
    pub fn new(config: Config, scenario: Arc<dyn Scenario>) -> Self {
        Self { config, scenario }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run to completion, or until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()> + Send,
    {
        let profile = self.config.profile()?;
        let thresholds = self.config.threshold_set()?;
        let metrics = Arc::new(MetricsRegistry::new());
        self.scenario.register_metrics(&metrics)?;
        thresholds.validate(&metrics)?;
        let http = HttpClient::new(&self.config.target, Arc::clone(&metrics))?;

        let seed = self.config.load.seed.unwrap_or_else(rand::random);
        let info = RunInfo {
            run_id: Uuid::new_v4(),
            base_url: http.base_url().to_string(),
            profile: profile.clone(),
        };
        info!(run_id = %info.run_id, scenario = self.scenario.name(), seed, "load test configured");

        let started_at = Utc::now();
        self.scenario.setup(&info).await;

        let executor = RampingExecutor::new(
            profile,
            ExecutorConfig {
                tick_interval: self.config.load.tick_interval,
                graceful_stop: self.config.load.graceful_stop,
                seed,
            },
        );
        let outcome = executor
            .run(
                Arc::clone(&self.scenario),
                http,
                Arc::clone(&metrics),
                &thresholds,
                shutdown,
            )
            .await;

        self.scenario.teardown(&info).await;
        let finished_at = Utc::now();

        let threshold_outcomes = thresholds.evaluate(&metrics);
        for failed in threshold_outcomes.iter().filter(|o| !o.passed) {
            warn!(metric = %failed.metric, threshold = %failed.expression, observed = ?failed.observed, "threshold failed");
        }

        let summary = RunSummary {
            run_id: info.run_id,
            scenario: self.scenario.name().to_string(),
            base_url: info.base_url,
            seed,
            started_at,
            finished_at,
            end_reason: outcome.end,
            iterations: metrics
                .aggregate(ITERATIONS, Aggregation::Count)
                .unwrap_or_default() as u64,
            vus_started: outcome.vus_started,
            peak_vus: outcome.peak_vus,
            vus_aborted: outcome.vus_aborted,
            metrics: metrics.snapshot(),
            thresholds: threshold_outcomes,
        };

        if summary.end_reason == EndReason::Completed {
            info!(iterations = summary.iterations, passed = summary.passed(), "run finished");
        }
        Ok(summary)
    }
}
