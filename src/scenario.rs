//! Scenario seam between the ramping runtime and a concrete workload
//!
//! The runtime owns scheduling, cancellation and metric aggregation; a
//! [`Scenario`] only says what one virtual user does per iteration and what
//! to announce before and after the run.

use async_trait::async_trait;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::http::HttpClient;
use crate::metrics::MetricsRegistry;
use crate::profile::LoadProfile;

/// Run-level information handed to the lifecycle hooks
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub base_url: String,
    pub profile: LoadProfile,
}

/// Per-virtual-user state. Never shared between users.
pub struct VuContext {
    pub id: u64,
    /// Zero-based count of iterations this user has started
    pub iteration: u64,
    pub rng: StdRng,
    pub http: HttpClient,
    pub metrics: Arc<MetricsRegistry>,
    interrupt: CancellationToken,
}

impl VuContext {
    pub fn new(
        id: u64,
        rng: StdRng,
        http: HttpClient,
        metrics: Arc<MetricsRegistry>,
        interrupt: CancellationToken,
    ) -> Self {
        Self {
            id,
            iteration: 0,
            rng,
            http,
            metrics,
            interrupt,
        }
    }

    /// Record a named assertion; returns `passed` for chaining
    pub fn check(&self, name: &str, passed: bool) -> bool {
        self.metrics.record_check(name, passed)
    }

    /// Think-time sleep. Only a hard stop of the run cuts it short.
    pub async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.interrupt.cancelled() => {}
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }
}

#[async_trait]
pub trait Scenario: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Declare custom metrics so thresholds on them validate before traffic starts
    fn register_metrics(&self, _metrics: &MetricsRegistry) -> Result<()> {
        Ok(())
    }

    /// Runs once before the first virtual user starts
    async fn setup(&self, _info: &RunInfo) {}

    /// One pass of the workload for one virtual user
    async fn iteration(&self, vu: &mut VuContext);

    /// Runs once after every virtual user has stopped
    async fn teardown(&self, _info: &RunInfo) {}
}
