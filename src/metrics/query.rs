use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::MetricSample;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("metrics backend returned HTTP {0}")]
    Status(u16),
    #[error("could not decode query response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    result: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ResultItem {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (serde_json::Value, String),
}

/// One series returned by an instant query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl QuerySample {
    pub fn into_metric_sample(self, alert_type: &str, queried_at: DateTime<Utc>) -> MetricSample {
        MetricSample {
            labels: self.labels,
            value: self.value,
            queried_at,
            alert_type: alert_type.to_string(),
        }
    }
}

/// Client for the Prometheus instant query API.
pub struct PrometheusClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl PrometheusClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn query_url(&self) -> String {
        format!("{}/api/v1/query", self.base_url)
    }

    /// Run `expr` and return every parseable series.
    ///
    /// Transport failures, non-2xx responses and undecodable bodies are
    /// errors. A well-formed envelope whose status isn't `success` yields an
    /// empty result.
    pub async fn query(&self, expr: &str) -> Result<Vec<QuerySample>, QueryError> {
        let url = self.query_url();
        info!("Fetching data for query: {}", expr);
        let res = self.client
            .get(&url)
            .query(&[("query", expr)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| QueryError::Transport { url: url.clone(), source })?;

        if !res.status().is_success() {
            return Err(QueryError::Status(res.status().as_u16()));
        }

        let body = res.text().await.map_err(|source| QueryError::Transport { url, source })?;
        parse_query_response(&body, expr)
    }
}

/// Decode a `/api/v1/query` body.
pub fn parse_query_response(body: &str, expr: &str) -> Result<Vec<QuerySample>, QueryError> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|e| QueryError::Decode(e.to_string()))?;
    if envelope.status != "success" {
        warn!("query '{}' returned non-success status: {}", expr, envelope.status);
        return Ok(Vec::new());
    }

    let items = envelope.data.unwrap_or_default().result;
    if items.is_empty() {
        info!("No data returned for query: {}", expr);
        return Ok(Vec::new());
    }

    let mut samples = Vec::with_capacity(items.len());
    for raw in items {
        match parse_item(&raw) {
            Ok(sample) => samples.push(sample),
            Err(e) => warn!("could not parse item for query '{}': {} ({})", expr, raw, e),
        }
    }
    info!("Found {} series for query '{}'", samples.len(), expr);
    Ok(samples)
}

fn parse_item(raw: &serde_json::Value) -> Result<QuerySample, String> {
    let item = ResultItem::deserialize(raw).map_err(|e| e.to_string())?;
    let value: f64 = item.value.1.trim().parse().map_err(|e: std::num::ParseFloatError| e.to_string())?;
    Ok(QuerySample {
        labels: item.metric,
        value,
    })
}
