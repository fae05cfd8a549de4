use thiserror::Error;

/// Errors raised before or around a load test run.
///
/// HTTP failures observed while generating traffic are not errors: they are
/// recorded as statuses, checks and rates instead.
#[derive(Debug, Error)]
pub enum LoadTestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    #[error("Invalid threshold for '{metric}': {reason}")]
    InvalidThreshold { metric: String, reason: String },

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoadTestError {
    pub fn invalid_threshold(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        LoadTestError::InvalidThreshold {
            metric: metric.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error was caught before any traffic was generated
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LoadTestError::Config(_)
                | LoadTestError::InvalidStage(_)
                | LoadTestError::InvalidThreshold { .. }
                | LoadTestError::UnknownMetric(_)
        )
    }
}

impl From<figment::Error> for LoadTestError {
    fn from(error: figment::Error) -> Self {
        LoadTestError::Config(error.to_string())
    }
}

impl From<validator::ValidationErrors> for LoadTestError {
    fn from(errors: validator::ValidationErrors) -> Self {
        LoadTestError::Config(errors.to_string())
    }
}

pub type Result<T, E = LoadTestError> = std::result::Result<T, E>;
