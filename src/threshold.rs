//! Pass/fail thresholds over aggregate metrics
//!
//! Expressions take the form `<aggregation> <op> <bound>`, e.g. `p(95)<1000`
//! or `rate<0.2`. They are parsed and checked against the registry's metric
//! kinds before any traffic is generated, then evaluated at the end of the
//! run (and continuously for thresholds marked `abort_on_fail`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{LoadTestError, Result};
use crate::metrics::{Aggregation, MetricsRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    // longest tokens first so "<=" is not read as "<"
    const TOKENS: [(&'static str, Comparison); 6] = [
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];

    pub fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }

    fn token(&self) -> &'static str {
        Self::TOKENS
            .iter()
            .find(|(_, c)| c == self)
            .map(|(t, _)| *t)
            .unwrap_or("?")
    }
}

/// Parsed `<aggregation> <op> <bound>` expression
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl ThresholdExpr {
    pub fn holds(&self, observed: f64) -> bool {
        self.comparison.holds(observed, self.bound)
    }
}

impl FromStr for ThresholdExpr {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (position, token, comparison) = Comparison::TOKENS
            .iter()
            .filter_map(|(token, comparison)| s.find(token).map(|pos| (pos, *token, *comparison)))
            .min_by_key(|(pos, token, _)| (*pos, std::cmp::Reverse(token.len())))
            .ok_or_else(|| format!("no comparison operator in '{s}'"))?;

        let aggregation: Aggregation = s[..position].parse()?;
        let bound_str = s[position + token.len()..].trim();
        let bound: f64 = bound_str
            .parse()
            .map_err(|_| format!("invalid bound '{bound_str}'"))?;
        if !bound.is_finite() {
            return Err(format!("invalid bound '{bound_str}'"));
        }

        Ok(Self {
            aggregation,
            comparison,
            bound,
        })
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.comparison.token(), self.bound)
    }
}

/// Threshold as written in configuration: a bare expression or a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdSpec {
    Expression(String),
    Detailed {
        threshold: String,
        #[serde(default)]
        abort_on_fail: bool,
    },
}

impl ThresholdSpec {
    pub fn expression(&self) -> &str {
        match self {
            ThresholdSpec::Expression(e) => e,
            ThresholdSpec::Detailed { threshold, .. } => threshold,
        }
    }

    pub fn abort_on_fail(&self) -> bool {
        matches!(self, ThresholdSpec::Detailed { abort_on_fail: true, .. })
    }
}

impl From<&str> for ThresholdSpec {
    fn from(expression: &str) -> Self {
        ThresholdSpec::Expression(expression.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub source: String,
    pub expr: ThresholdExpr,
    pub abort_on_fail: bool,
}

/// Result of evaluating one threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    /// `None` when the metric had no samples to aggregate
    pub observed: Option<f64>,
    pub passed: bool,
    pub abort_on_fail: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdSet {
    thresholds: Vec<Threshold>,
}

impl ThresholdSet {
    pub fn parse(specs: &BTreeMap<String, Vec<ThresholdSpec>>) -> Result<Self> {
        let mut thresholds = Vec::new();
        for (metric, entries) in specs {
            for spec in entries {
                let expr = spec
                    .expression()
                    .parse::<ThresholdExpr>()
                    .map_err(|reason| LoadTestError::invalid_threshold(metric, reason))?;
                thresholds.push(Threshold {
                    metric: metric.clone(),
                    source: spec.expression().trim().to_string(),
                    expr,
                    abort_on_fail: spec.abort_on_fail(),
                });
            }
        }
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn has_abort_on_fail(&self) -> bool {
        self.thresholds.iter().any(|t| t.abort_on_fail)
    }

    /// Reject thresholds on unknown metrics or with aggregations the metric kind lacks
    pub fn validate(&self, registry: &MetricsRegistry) -> Result<()> {
        for threshold in &self.thresholds {
            let kind = registry
                .kind_of(&threshold.metric)
                .ok_or_else(|| LoadTestError::UnknownMetric(threshold.metric.clone()))?;
            if !threshold.expr.aggregation.supported_by(kind) {
                return Err(LoadTestError::invalid_threshold(
                    &threshold.metric,
                    format!("'{}' is not available on a {kind} metric", threshold.expr.aggregation),
                ));
            }
        }
        Ok(())
    }

    pub fn evaluate(&self, registry: &MetricsRegistry) -> Vec<ThresholdOutcome> {
        self.thresholds
            .iter()
            .map(|t| evaluate_one(t, registry))
            .collect()
    }

    /// First failing `abort_on_fail` threshold, if any
    pub fn first_abort(&self, registry: &MetricsRegistry) -> Option<ThresholdOutcome> {
        self.thresholds
            .iter()
            .filter(|t| t.abort_on_fail && registry.has_samples(&t.metric))
            .map(|t| evaluate_one(t, registry))
            .find(|o| !o.passed)
    }
}

fn evaluate_one(threshold: &Threshold, registry: &MetricsRegistry) -> ThresholdOutcome {
    let observed = registry.aggregate(&threshold.metric, threshold.expr.aggregation);
    ThresholdOutcome {
        metric: threshold.metric.clone(),
        expression: threshold.source.clone(),
        observed,
        passed: observed.map_or(true, |v| threshold.expr.holds(v)),
        abort_on_fail: threshold.abort_on_fail,
    }
}
