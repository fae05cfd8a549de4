//! Storefront load test
//!
//! Ramping virtual users drive a fixed read/write mix against an HTTP shop
//! API; checks and thresholds decide whether the run passed.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod profile;
pub mod report;
pub mod runtime;
pub mod scenario;
pub mod telemetry;
pub mod threshold;
pub mod workload;

pub use error::{LoadTestError, Result};
