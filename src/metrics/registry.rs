use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::warn;

use super::{Aggregation, Metric, MetricKind, MetricSummary};
use crate::error::{LoadTestError, Result};

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const VUS: &str = "vus";
pub const VUS_MAX: &str = "vus_max";
pub const CHECKS: &str = "checks";

/// Metrics every run reports, whether or not the workload touches them
pub const BUILTIN_METRICS: &[(&str, MetricKind)] = &[
    (HTTP_REQS, MetricKind::Counter),
    (HTTP_REQ_DURATION, MetricKind::Trend),
    (HTTP_REQ_FAILED, MetricKind::Rate),
    (ITERATIONS, MetricKind::Counter),
    (ITERATION_DURATION, MetricKind::Trend),
    (VUS, MetricKind::Gauge),
    (VUS_MAX, MetricKind::Gauge),
    (CHECKS, MetricKind::Rate),
];

/// Pass/fail tally for one named check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTally {
    pub passes: u64,
    pub fails: u64,
}

impl CheckTally {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    pub fn pass_ratio(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.passes as f64 / self.total() as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSummary {
    pub name: String,
    #[serde(flatten)]
    pub tally: CheckTally,
}

/// Point-in-time view of the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub metrics: BTreeMap<String, MetricSummary>,
    pub checks: Vec<CheckSummary>,
}

impl MetricsSnapshot {
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    pub fn check(&self, name: &str) -> Option<&CheckTally> {
        self.checks.iter().find(|c| c.name == name).map(|c| &c.tally)
    }
}

#[derive(Debug, Default)]
struct Inner {
    metrics: HashMap<String, Metric>,
    // insertion order, so the summary lists checks the way the workload issued them
    checks: Vec<(String, CheckTally)>,
}

/// Run-wide metric store shared by every virtual user
#[derive(Debug)]
pub struct MetricsRegistry {
    inner: Mutex<Inner>,
    started: Instant,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut metrics = HashMap::new();
        for (name, kind) in BUILTIN_METRICS {
            metrics.insert(name.to_string(), Metric::new(*kind));
        }
        Self {
            inner: Mutex::new(Inner {
                metrics,
                checks: Vec::new(),
            }),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Declare a custom metric. Re-registering with the same kind is a no-op.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.metrics.get(name) {
            Some(existing) if existing.kind() != kind => Err(LoadTestError::Config(format!(
                "metric '{name}' already registered as {}",
                existing.kind()
            ))),
            Some(_) => Ok(()),
            None => {
                inner.metrics.insert(name.to_string(), Metric::new(kind));
                Ok(())
            }
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.inner.lock().metrics.get(name).map(Metric::kind)
    }

    pub fn add_counter(&self, name: &str, value: f64) {
        self.with_metric(name, MetricKind::Counter, |m| {
            if let Metric::Counter(c) = m {
                c.add(value)
            }
        });
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.with_metric(name, MetricKind::Gauge, |m| {
            if let Metric::Gauge(g) = m {
                g.set(value)
            }
        });
    }

    pub fn add_rate(&self, name: &str, hit: bool) {
        self.with_metric(name, MetricKind::Rate, |m| {
            if let Metric::Rate(r) = m {
                r.add(hit)
            }
        });
    }

    pub fn add_trend(&self, name: &str, value: f64) {
        self.with_metric(name, MetricKind::Trend, |m| {
            if let Metric::Trend(t) = m {
                t.add(value)
            }
        });
    }

    /// Record a named boolean assertion and fold it into the `checks` rate
    pub fn record_check(&self, name: &str, passed: bool) -> bool {
        let mut inner = self.inner.lock();
        let index = match inner.checks.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                inner.checks.push((name.to_string(), CheckTally::default()));
                inner.checks.len() - 1
            }
        };
        bump(&mut inner.checks[index].1, passed);
        if let Some(Metric::Rate(r)) = inner.metrics.get_mut(CHECKS) {
            r.add(passed);
        }
        passed
    }

    /// Evaluated on a copy taken under the lock; trend samples are sorted
    /// after it is released
    pub fn aggregate(&self, name: &str, aggregation: Aggregation) -> Option<f64> {
        let elapsed = self.elapsed();
        let metric = self.inner.lock().metrics.get(name).cloned()?;
        metric.aggregate(aggregation, elapsed)
    }

    pub fn has_samples(&self, name: &str) -> bool {
        self.inner
            .lock()
            .metrics
            .get(name)
            .is_some_and(Metric::has_samples)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let elapsed = self.elapsed();
        let (metrics, checks) = {
            let inner = self.inner.lock();
            (inner.metrics.clone(), inner.checks.clone())
        };
        MetricsSnapshot {
            elapsed,
            metrics: metrics
                .iter()
                .map(|(name, metric)| (name.clone(), metric.summary(elapsed)))
                .collect(),
            checks: checks
                .into_iter()
                .map(|(name, tally)| CheckSummary { name, tally })
                .collect(),
        }
    }

    fn with_metric(&self, name: &str, kind: MetricKind, f: impl FnOnce(&mut Metric)) {
        let mut inner = self.inner.lock();
        let metric = inner
            .metrics
            .entry(name.to_string())
            .or_insert_with(|| Metric::new(kind));
        if metric.kind() != kind {
            warn!(metric = name, expected = %kind, actual = %metric.kind(), "dropping sample of wrong kind");
            return;
        }
        f(metric);
    }
}

fn bump(tally: &mut CheckTally, passed: bool) {
    if passed {
        tally.passes += 1;
    } else {
        tally.fails += 1;
    }
}
