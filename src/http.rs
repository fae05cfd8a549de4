use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::TargetConfig;
use crate::error::{LoadTestError, Result};
use crate::metrics::{MetricsRegistry, HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED};

/// Status reported when no response was received at all
pub const TRANSPORT_ERROR_STATUS: u16 = 0;

/// What a single request produced. Transport errors are folded into
/// status 0 so callers handle them exactly like a bad status.
#[derive(Debug, Clone)]
pub struct HttpOutcome {
    pub method: Method,
    pub path: String,
    pub status: u16,
    pub duration: Duration,
    pub error: Option<String>,
}

impl HttpOutcome {
    pub fn is_status(&self, status: u16) -> bool {
        self.status == status
    }

    /// 2xx and 3xx count as expected, everything else feeds `http_req_failed`
    pub fn is_expected(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Shared request client bound to the target's base URL.
///
/// Cloning is cheap; every virtual user holds its own clone.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    metrics: Arc<MetricsRegistry>,
}

impl HttpClient {
    pub fn new(target: &TargetConfig, metrics: Arc<MetricsRegistry>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&target.user_agent)
                .map_err(|e| LoadTestError::Config(format!("invalid user agent: {e}")))?,
        );
        let client = reqwest::Client::builder()
            .timeout(target.timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: target.base_url.trim_end_matches('/').to_string(),
            metrics,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> HttpOutcome {
        let builder = self.client.get(self.url(path));
        self.send(Method::GET, path, builder).await
    }

    /// POST `body` as JSON; reqwest sets `Content-Type: application/json`
    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> HttpOutcome {
        let builder = self.client.post(self.url(path)).json(body);
        self.send(Method::POST, path, builder).await
    }

    async fn send(&self, method: Method, path: &str, builder: RequestBuilder) -> HttpOutcome {
        let started = Instant::now();
        let (status, error) = match builder.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                // duration covers the full body, not just the headers
                match resp.bytes().await {
                    Ok(_) => (status, None),
                    Err(e) => (status, Some(format!("body read failed: {e}"))),
                }
            }
            Err(e) => (TRANSPORT_ERROR_STATUS, Some(e.to_string())),
        };
        let duration = started.elapsed();

        let outcome = HttpOutcome {
            method,
            path: path.to_string(),
            status,
            duration,
            error,
        };
        self.record(&outcome);
        outcome
    }

    fn record(&self, outcome: &HttpOutcome) {
        self.metrics.add_counter(HTTP_REQS, 1.0);
        self.metrics
            .add_trend(HTTP_REQ_DURATION, outcome.duration.as_secs_f64() * 1000.0);
        self.metrics.add_rate(HTTP_REQ_FAILED, !outcome.is_expected());

        if let Some(error) = &outcome.error {
            debug!(method = %outcome.method, path = %outcome.path, status = outcome.status, %error, "request failed");
        }
    }
}
