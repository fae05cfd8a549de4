use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::http::HttpClient;
use crate::metrics::{MetricsRegistry, ITERATIONS, ITERATION_DURATION, VUS, VUS_MAX};
use crate::profile::LoadProfile;
use crate::scenario::{Scenario, VuContext};
use crate::threshold::ThresholdSet;

/// Why the ramp stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    Interrupted,
    ThresholdAborted { metric: String, expression: String },
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub end: EndReason,
    pub vus_started: u64,
    pub peak_vus: u32,
    /// VUs still running when the graceful stop window expired
    pub vus_aborted: usize,
}

/// Tunables for [`RampingExecutor`]
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub tick_interval: Duration,
    pub graceful_stop: Duration,
    pub seed: u64,
}

struct ActiveVu {
    id: u64,
    stop: CancellationToken,
}

/// Starts and retires virtual users so the active count tracks the profile.
///
/// VUs are retired newest-first and only between iterations; the pacing
/// sleep is cut short only by the hard stop that follows an expired
/// graceful-stop window, an interrupt or a threshold abort.
pub struct RampingExecutor {
    profile: LoadProfile,
    config: ExecutorConfig,
}

impl RampingExecutor {
    pub fn new(profile: LoadProfile, config: ExecutorConfig) -> Self {
        Self { profile, config }
    }

    pub async fn run<F>(
        &self,
        scenario: Arc<dyn Scenario>,
        http: HttpClient,
        metrics: Arc<MetricsRegistry>,
        thresholds: &ThresholdSet,
        shutdown: F,
    ) -> ExecutionOutcome
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        let hard_stop = CancellationToken::new();
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut active: Vec<ActiveVu> = Vec::new();
        let mut next_id: u64 = 1;
        let mut peak_vus: u32 = 0;

        metrics.set_gauge(VUS_MAX, self.profile.max_vus() as f64);

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();
        let mut current_stage = None;

        let end = loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => {
                    warn!("run interrupted");
                    break EndReason::Interrupted;
                }
            }

            let elapsed = started.elapsed();
            if self.profile.is_finished(elapsed) {
                break EndReason::Completed;
            }

            let stage = self.profile.stage_index_at(elapsed);
            if stage != current_stage {
                if let Some(index) = stage {
                    let s = self.profile.stages()[index];
                    info!(stage = index, target = s.target, "entering stage {s}");
                }
                current_stage = stage;
            }

            let target = self.profile.target_at(elapsed) as usize;
            while active.len() < target {
                let vu = ActiveVu {
                    id: next_id,
                    stop: CancellationToken::new(),
                };
                next_id += 1;
                let ctx = VuContext::new(
                    vu.id,
                    StdRng::seed_from_u64(self.config.seed.wrapping_add(vu.id)),
                    http.clone(),
                    Arc::clone(&metrics),
                    hard_stop.clone(),
                );
                tasks.spawn(vu_loop(Arc::clone(&scenario), ctx, vu.stop.clone()));
                active.push(vu);
            }
            while active.len() > target {
                if let Some(vu) = active.pop() {
                    debug!(vu = vu.id, "retiring virtual user");
                    vu.stop.cancel();
                }
            }

            while let Some(result) = tasks.try_join_next() {
                collect(result);
            }

            peak_vus = peak_vus.max(active.len() as u32);
            // retired VUs still count until their last iteration ends
            metrics.set_gauge(VUS, tasks.len() as f64);

            if let Some(outcome) = thresholds.first_abort(&metrics) {
                error!(
                    metric = %outcome.metric,
                    threshold = %outcome.expression,
                    observed = ?outcome.observed,
                    "threshold crossed, aborting run"
                );
                break EndReason::ThresholdAborted {
                    metric: outcome.metric,
                    expression: outcome.expression,
                };
            }
        };

        for vu in active.drain(..) {
            vu.stop.cancel();
        }

        let grace = match end {
            EndReason::Completed => self.config.graceful_stop,
            _ => Duration::ZERO,
        };
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                collect(result);
            }
        })
        .await;

        let mut vus_aborted = 0;
        if drained.is_err() {
            vus_aborted = tasks.len();
            if vus_aborted > 0 && grace > Duration::ZERO {
                warn!(vus = vus_aborted, grace = ?grace, "graceful stop expired, interrupting remaining VUs");
            }
            hard_stop.cancel();
            tasks.shutdown().await;
        }

        metrics.set_gauge(VUS, 0.0);

        ExecutionOutcome {
            end,
            vus_started: next_id - 1,
            peak_vus,
            vus_aborted,
        }
    }
}

async fn vu_loop(scenario: Arc<dyn Scenario>, mut ctx: VuContext, stop: CancellationToken) {
    while !stop.is_cancelled() && !ctx.is_interrupted() {
        let started = Instant::now();
        scenario.iteration(&mut ctx).await;
        if ctx.is_interrupted() {
            // cut short by a hard stop: not a completed iteration
            break;
        }
        ctx.metrics.add_counter(ITERATIONS, 1.0);
        ctx.metrics
            .add_trend(ITERATION_DURATION, started.elapsed().as_secs_f64() * 1000.0);
        ctx.iteration += 1;
    }
    debug!(vu = ctx.id, iterations = ctx.iteration, "virtual user stopped");
}

fn collect(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "virtual user panicked");
        }
    }
}
