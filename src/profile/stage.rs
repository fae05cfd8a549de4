use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{LoadTestError, Result};

/// One segment of the ramp: move to `target` virtual users over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }

    /// Build a stage from a duration string such as `10s`, `1m` or `1m30s`
    pub fn parse(duration: &str, target: u32) -> Result<Self> {
        let duration = humantime_serde::re::humantime::parse_duration(duration.trim())
            .map_err(|e| LoadTestError::InvalidStage(format!("'{duration}': {e}")))?;
        Ok(Self::new(duration, target))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} VUs",
            humantime_serde::re::humantime::format_duration(self.duration),
            self.target
        )
    }
}
