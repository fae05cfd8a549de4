//! End-of-run summary
//!
//! [`RunSummary`] is what a run produces: metric aggregates, check tallies
//! and threshold outcomes. It renders as a human-readable block for the
//! console and serializes to JSON for export.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;
use crate::metrics::{MetricKind, MetricSummary, MetricsSnapshot};
use crate::runtime::EndReason;
use crate::threshold::ThresholdOutcome;

/// Process exit codes, following common load-tool conventions
pub const EXIT_OK: i32 = 0;
pub const EXIT_THRESHOLDS_FAILED: i32 = 99;
pub const EXIT_INVALID_CONFIG: i32 = 104;
pub const EXIT_INTERRUPTED: i32 = 105;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub scenario: String,
    pub base_url: String,
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub end_reason: EndReason,
    pub iterations: u64,
    pub vus_started: u64,
    pub peak_vus: u32,
    pub vus_aborted: usize,
    pub metrics: MetricsSnapshot,
    pub thresholds: Vec<ThresholdOutcome>,
}

impl RunSummary {
    /// All thresholds held and nothing aborted the run on their account
    pub fn passed(&self) -> bool {
        !matches!(self.end_reason, EndReason::ThresholdAborted { .. })
            && self.thresholds.iter().all(|t| t.passed)
    }

    pub fn exit_code(&self) -> i32 {
        if !self.passed() {
            EXIT_THRESHOLDS_FAILED
        } else if self.end_reason == EndReason::Interrupted {
            EXIT_INTERRUPTED
        } else {
            EXIT_OK
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub async fn export(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let wall = (self.finished_at - self.started_at).to_std().unwrap_or_default();

        let _ = writeln!(out, "scenario: {} ({})", self.scenario, self.base_url);
        let _ = writeln!(
            out,
            "run {} finished in {} - {} iterations, {} VUs started, peak {}",
            self.run_id,
            humantime_serde::re::humantime::format_duration(round_to_millis(wall)),
            self.iterations,
            self.vus_started,
            self.peak_vus
        );
        match &self.end_reason {
            EndReason::Completed => {}
            EndReason::Interrupted => {
                let _ = writeln!(out, "run was interrupted before the last stage ended");
            }
            EndReason::ThresholdAborted { metric, expression } => {
                let _ = writeln!(out, "run aborted: threshold {metric} {expression} crossed");
            }
        }
        out.push('\n');

        for check in &self.metrics.checks {
            let mark = if check.tally.fails == 0 { '✓' } else { '✗' };
            let _ = writeln!(
                out,
                "  {mark} {:<36} {:>6.2}%  ✓ {:<7} ✗ {}",
                check.name,
                check.tally.pass_ratio() * 100.0,
                check.tally.passes,
                check.tally.fails
            );
        }
        if !self.metrics.checks.is_empty() {
            out.push('\n');
        }

        for (name, summary) in &self.metrics.metrics {
            let mark = self.threshold_mark(name);
            let _ = writeln!(out, "  {mark}{name:.<30} {}", format_metric(summary));
        }

        if !self.thresholds.is_empty() {
            out.push('\n');
            for t in &self.thresholds {
                let observed = t
                    .observed
                    .map_or_else(|| "no samples".to_string(), |v| format!("{v:.4}"));
                let _ = writeln!(
                    out,
                    "  {} {} {} (observed {observed})",
                    if t.passed { '✓' } else { '✗' },
                    t.metric,
                    t.expression
                );
            }
        }
        out
    }

    fn threshold_mark(&self, metric: &str) -> &'static str {
        let mut relevant = self.thresholds.iter().filter(|t| t.metric == metric).peekable();
        if relevant.peek().is_none() {
            "  "
        } else if relevant.all(|t| t.passed) {
            "✓ "
        } else {
            "✗ "
        }
    }
}

fn round_to_millis(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}

fn format_metric(summary: &MetricSummary) -> String {
    match summary.kind {
        MetricKind::Trend => ["avg", "min", "med", "max", "p(90)", "p(95)"]
            .iter()
            .filter_map(|k| summary.get(k).map(|v| format!("{k}={v:.2}ms")))
            .join(" "),
        MetricKind::Rate => {
            let rate = summary.get("rate").unwrap_or_default();
            let passes = summary.get("passes").unwrap_or_default();
            let fails = summary.get("fails").unwrap_or_default();
            format!("{:.2}% ✓ {passes} ✗ {fails}", rate * 100.0)
        }
        MetricKind::Counter => {
            let count = summary.get("count").unwrap_or_default();
            match summary.get("rate") {
                Some(rate) => format!("{count} {rate:.2}/s"),
                None => format!("{count}"),
            }
        }
        MetricKind::Gauge => {
            let value = summary.get("value").unwrap_or_default();
            let min = summary.get("min").unwrap_or_default();
            let max = summary.get("max").unwrap_or_default();
            format!("{value} min={min} max={max}")
        }
    }
}
