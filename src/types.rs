use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Placeholder used when client or environment can't be determined.
pub const NOT_AVAILABLE: &str = "N/A";

/// Status code every probed URL is expected to return.
pub const EXPECTED_STATUS: &str = "200";

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub sender: String,
    /// Raw comma-separated recipient list, split at dispatch time.
    pub recipients: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct UrlCheckConfig {
    pub base_path: PathBuf,
    pub batch_dir_prefix: String,
    pub source_suffix: String,
    pub config_variable: String,
    pub db_path: PathBuf,
    pub probe_timeout: Duration,
    pub subject: String,
    pub mail: MailConfig,
}

#[derive(Debug, Clone)]
pub struct SessionUsageConfig {
    pub prometheus_url: String,
    pub query: String,
    pub threshold: f64,
    pub query_timeout: Duration,
    pub mail: MailConfig,
}

/// One named query of the connector job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuerySpec {
    pub alert_type: String,
    pub query: String,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct ConnectorAlertsConfig {
    pub prometheus_url: String,
    pub queries: Vec<QuerySpec>,
    pub desired_labels: Vec<String>,
    pub output_dir: PathBuf,
    pub query_timeout: Duration,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    DeclaredInConfig,
    DerivedFromUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub url: String,
    pub client: String,
    pub env: String,
    pub source: TargetSource,
}

/// Outcome of a single health probe.
///
/// The textual form is what gets stored in the status table: `"404"`,
/// `"Timeout"`, `"Connection Error"`, `"Request Error: <kind>"` and
/// `"Unknown Error: <kind>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLabel {
    Numeric(String),
    Timeout,
    ConnectionError,
    RequestError(String),
    UnknownError(String),
}

impl StatusLabel {
    pub fn is_expected(&self) -> bool {
        matches!(self, StatusLabel::Numeric(code) if code == EXPECTED_STATUS)
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLabel::Numeric(code) => write!(f, "{}", code),
            StatusLabel::Timeout => write!(f, "Timeout"),
            StatusLabel::ConnectionError => write!(f, "Connection Error"),
            StatusLabel::RequestError(kind) => write!(f, "Request Error: {}", kind),
            StatusLabel::UnknownError(kind) => write!(f, "Unknown Error: {}", kind),
        }
    }
}

impl From<&str> for StatusLabel {
    /// Text that matches no known form is kept as an unknown error.
    fn from(s: &str) -> Self {
        match s {
            "Timeout" => StatusLabel::Timeout,
            "Connection Error" => StatusLabel::ConnectionError,
            _ => {
                if let Some(kind) = s.strip_prefix("Request Error: ") {
                    StatusLabel::RequestError(kind.to_string())
                } else if let Some(kind) = s.strip_prefix("Unknown Error: ") {
                    StatusLabel::UnknownError(kind.to_string())
                } else if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                    StatusLabel::Numeric(s.to_string())
                } else {
                    StatusLabel::UnknownError(s.to_string())
                }
            }
        }
    }
}

impl FromStr for StatusLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(StatusLabel::from(s))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub target: ProbeTarget,
    pub status: StatusLabel,
    pub observed_at: DateTime<Utc>,
}

/// A row of the persistent status table.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub id: i64,
    pub client: String,
    pub env: String,
    pub url: String,
    pub status: StatusLabel,
    pub check_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub queried_at: DateTime<Utc>,
    pub alert_type: String,
}

impl MetricSample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(|s| s.as_str())
    }

    pub fn label_or_na(&self, name: &str) -> String {
        self.label(name).unwrap_or(NOT_AVAILABLE).to_string()
    }
}

/// Threshold crossing derived from a metric sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub category: String,
    pub client: String,
    pub env: String,
    pub value: f64,
}

impl Alert {
    /// `category_label` names the label holding the category, e.g. `database`.
    pub fn from_sample(sample: &MetricSample, category_label: &str) -> Self {
        Self {
            category: sample.label_or_na(category_label),
            client: sample.label_or_na("client"),
            env: sample.label_or_na("env"),
            value: sample.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
}
