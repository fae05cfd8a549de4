//! Piecewise-linear concurrency ramp
//!
//! A [`LoadProfile`] turns an ordered list of stages into a function from
//! elapsed run time to the number of virtual users that should be active.
//! Each stage moves linearly from the previous level to its own target over
//! its duration; the first stage starts from `start_vus`.

use std::time::Duration;

use super::Stage;
use crate::error::{LoadTestError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct LoadProfile {
    start_vus: u32,
    stages: Vec<Stage>,
}

/// Absolute time window covered by one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageWindow {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub from: u32,
    pub to: u32,
}

impl LoadProfile {
    pub fn new(start_vus: u32, stages: Vec<Stage>) -> Result<Self> {
        if stages.is_empty() {
            return Err(LoadTestError::InvalidStage(
                "load profile needs at least one stage".to_string(),
            ));
        }
        if stages.iter().all(|s| s.duration.is_zero()) {
            return Err(LoadTestError::InvalidStage(
                "load profile has zero total duration".to_string(),
            ));
        }
        Ok(Self { start_vus, stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn start_vus(&self) -> u32 {
        self.start_vus
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest concurrency the profile ever asks for
    pub fn max_vus(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, u32::max)
    }

    pub fn is_finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Target concurrency at `elapsed` since the start of the ramp.
    ///
    /// Past the end of the last stage the last target is held.
    pub fn target_at(&self, elapsed: Duration) -> u32 {
        let mut from = self.start_vus;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let level = from as f64 + (stage.target as f64 - from as f64) * progress;
                return level.round() as u32;
            }
            from = stage.target;
            stage_start = stage_end;
        }

        from
    }

    /// Index of the stage active at `elapsed`, `None` once the ramp is over
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        self.windows()
            .into_iter()
            .find(|w| elapsed >= w.start && elapsed < w.end)
            .map(|w| w.index)
    }

    pub fn windows(&self) -> Vec<StageWindow> {
        let mut from = self.start_vus;
        let mut start = Duration::ZERO;
        self.stages
            .iter()
            .enumerate()
            .map(|(index, stage)| {
                let window = StageWindow {
                    index,
                    start,
                    end: start + stage.duration,
                    from,
                    to: stage.target,
                };
                from = stage.target;
                start = window.end;
                window
            })
            .collect()
    }
}
