//! Metric sinks
//!
//! Each sink folds raw samples for one metric kind. Trends keep every sample
//! so arbitrary percentiles can be evaluated at the end of the run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{Aggregation, MetricKind};

#[derive(Debug, Clone, Default)]
pub struct Counter {
    total: f64,
}

impl Counter {
    pub fn add(&mut self, value: f64) {
        self.total += value;
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}

/// Last observed value plus the range seen over the run
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    value: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Gauge {
    pub fn set(&mut self, value: f64) {
        self.value = value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Ratio of non-zero samples
#[derive(Debug, Clone, Default)]
pub struct Rate {
    passes: u64,
    total: u64,
}

impl Rate {
    pub fn add(&mut self, hit: bool) {
        self.total += 1;
        if hit {
            self.passes += 1;
        }
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn fails(&self) -> u64 {
        self.total - self.passes
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.passes as f64 / self.total as f64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Trend {
    samples: Vec<f64>,
    sum: f64,
}

impl Trend {
    pub fn add(&mut self, value: f64) {
        self.samples.push(value);
        self.sum += value;
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn avg(&self) -> Option<f64> {
        (!self.samples.is_empty()).then(|| self.sum / self.samples.len() as f64)
    }

    pub fn min(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::max)
    }

    /// Percentile with linear interpolation between closest ranks
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let mut sorted = self.samples.clone();
        sorted.sort_by(f64::total_cmp);
        percentile_of_sorted(&sorted, p)
    }
}

fn percentile_of_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// A metric sink of any kind
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Counter),
    Gauge(Gauge),
    Rate(Rate),
    Trend(Trend),
}

impl Metric {
    pub fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Metric::Counter(Counter::default()),
            MetricKind::Gauge => Metric::Gauge(Gauge::default()),
            MetricKind::Rate => Metric::Rate(Rate::default()),
            MetricKind::Trend => Metric::Trend(Trend::default()),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::Rate(_) => MetricKind::Rate,
            Metric::Trend(_) => MetricKind::Trend,
        }
    }

    /// Whether any sample has been folded in yet
    pub fn has_samples(&self) -> bool {
        match self {
            Metric::Counter(c) => c.total != 0.0,
            Metric::Gauge(g) => g.min.is_some(),
            Metric::Rate(r) => r.total > 0,
            Metric::Trend(t) => !t.samples.is_empty(),
        }
    }

    /// Evaluate an aggregation; `elapsed` is used for per-second counter rates
    pub fn aggregate(&self, aggregation: Aggregation, elapsed: Duration) -> Option<f64> {
        match (self, aggregation) {
            (Metric::Counter(c), Aggregation::Count) => Some(c.total),
            (Metric::Counter(c), Aggregation::Rate) => {
                let secs = elapsed.as_secs_f64();
                (secs > 0.0).then(|| c.total / secs)
            }
            (Metric::Gauge(g), Aggregation::Value) => g.min.map(|_| g.value),
            (Metric::Gauge(g), Aggregation::Min) => g.min,
            (Metric::Gauge(g), Aggregation::Max) => g.max,
            (Metric::Rate(r), Aggregation::Rate) => r.rate(),
            (Metric::Trend(t), Aggregation::Avg) => t.avg(),
            (Metric::Trend(t), Aggregation::Min) => t.min(),
            (Metric::Trend(t), Aggregation::Max) => t.max(),
            (Metric::Trend(t), Aggregation::Med) => t.percentile(50.0),
            (Metric::Trend(t), Aggregation::Percentile(p)) => t.percentile(p),
            (Metric::Trend(t), Aggregation::Count) => Some(t.count() as f64),
            _ => None,
        }
    }

    pub fn summary(&self, elapsed: Duration) -> MetricSummary {
        let mut values = BTreeMap::new();
        match self {
            Metric::Counter(c) => {
                values.insert("count".to_string(), c.total);
                if let Some(rate) = self.aggregate(Aggregation::Rate, elapsed) {
                    values.insert("rate".to_string(), rate);
                }
            }
            Metric::Gauge(g) => {
                values.insert("value".to_string(), g.value);
                values.insert("min".to_string(), g.min.unwrap_or_default());
                values.insert("max".to_string(), g.max.unwrap_or_default());
            }
            Metric::Rate(r) => {
                values.insert("rate".to_string(), r.rate().unwrap_or_default());
                values.insert("passes".to_string(), r.passes as f64);
                values.insert("fails".to_string(), r.fails() as f64);
            }
            Metric::Trend(t) => {
                let mut sorted = t.samples.clone();
                sorted.sort_by(f64::total_cmp);
                let pct = |p| percentile_of_sorted(&sorted, p).unwrap_or_default();
                values.insert("avg".to_string(), t.avg().unwrap_or_default());
                values.insert("min".to_string(), sorted.first().copied().unwrap_or_default());
                values.insert("med".to_string(), pct(50.0));
                values.insert("max".to_string(), sorted.last().copied().unwrap_or_default());
                values.insert("p(90)".to_string(), pct(90.0));
                values.insert("p(95)".to_string(), pct(95.0));
                values.insert("count".to_string(), t.count() as f64);
            }
        }
        MetricSummary {
            kind: self.kind(),
            values,
        }
    }
}

/// Serializable end-of-run view of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub kind: MetricKind,
    pub values: BTreeMap<String, f64>,
}

impl MetricSummary {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}
