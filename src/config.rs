use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};
use validator::{Validate, ValidationError};

use crate::error::Result;
use crate::profile::{LoadProfile, Stage};
use crate::threshold::{ThresholdSet, ThresholdSpec};

pub const DEFAULT_CONFIG_PATH: &str = "loadtest.toml";
pub const CONFIG_PATH_ENV: &str = "LOADTEST_CONFIG";
pub const ENV_PREFIX: &str = "LOADTEST__";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub target: TargetConfig,
    #[validate(nested)]
    pub load: LoadConfig,
    pub thresholds: BTreeMap<String, Vec<ThresholdSpec>>,
    #[validate(nested)]
    pub workload: WorkloadConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TargetConfig {
    #[validate(url)]
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoadConfig {
    pub start_vus: u32,
    #[validate(length(min = 1, message = "at least one stage is required"))]
    pub stages: Vec<Stage>,
    /// How long virtual users may finish their iteration after the ramp ends
    #[serde(with = "humantime_serde")]
    pub graceful_stop: Duration,
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Base seed for per-VU random sources; random when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_pacing"))]
pub struct WorkloadConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    pub customer_create_probability: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub product_create_probability: f64,
    #[serde(with = "humantime_serde")]
    pub pacing_min: Duration,
    #[serde(with = "humantime_serde")]
    pub pacing_max: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub log_format: LogFormat,
    /// Write the end-of-run summary as JSON to this path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_export: Option<PathBuf>,
}

fn validate_pacing(workload: &WorkloadConfig) -> std::result::Result<(), ValidationError> {
    if workload.pacing_min > workload.pacing_max {
        return Err(ValidationError::new("pacing_min must not exceed pacing_max"));
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(
            "http_req_duration".to_string(),
            vec![ThresholdSpec::from("p(95)<1000")],
        );
        thresholds.insert(
            "http_req_failed".to_string(),
            vec![ThresholdSpec::from("rate<0.2")],
        );
        thresholds.insert("errors".to_string(), vec![ThresholdSpec::from("rate<0.2")]);

        Self {
            target: TargetConfig {
                base_url: "http://localhost:8080".to_string(),
                timeout: Duration::from_secs(60),
                user_agent: concat!("storefront-loadtest/", env!("CARGO_PKG_VERSION")).to_string(),
            },
            load: LoadConfig {
                start_vus: 0,
                stages: vec![
                    Stage::new(Duration::from_secs(10), 60),
                    Stage::new(Duration::from_secs(60), 100),
                    Stage::new(Duration::from_secs(30), 120),
                    Stage::new(Duration::from_secs(20), 0),
                ],
                graceful_stop: Duration::from_secs(30),
                tick_interval: Duration::from_millis(100),
                seed: None,
            },
            thresholds,
            workload: WorkloadConfig {
                customer_create_probability: 0.3,
                product_create_probability: 0.2,
                pacing_min: Duration::from_millis(500),
                pacing_max: Duration::from_millis(2500),
            },
            output: OutputConfig {
                log_format: LogFormat::Json,
                summary_export: None,
            },
        }
    }
}

impl Config {
    /// Defaults, then `$LOADTEST_CONFIG` (or `loadtest.toml`), then `LOADTEST__*` env vars
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Self::base()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Defaults overlaid with an inline TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::extract(Self::base().merge(Toml::string(toml)))
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn profile(&self) -> Result<LoadProfile> {
        LoadProfile::new(self.load.start_vus, self.load.stages.clone())
    }

    pub fn threshold_set(&self) -> Result<ThresholdSet> {
        ThresholdSet::parse(&self.thresholds)
    }
}
