use chrono::Utc;
use std::error::Error as _;
use std::time::Duration;
use tracing::debug;

use crate::parsing::extract_info_from_url;
use crate::types::{ProbeResult, ProbeTarget, StatusLabel, TargetSource, NOT_AVAILABLE};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Issues one GET per URL and reduces the outcome to a [`StatusLabel`].
pub struct HealthProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Probe with the prober's default timeout.
    pub async fn check(&self, url: &str) -> StatusLabel {
        self.check_with_timeout(url, None).await
    }

    /// Never retries and never fails: every outcome is a label.
    pub async fn check_with_timeout(&self, url: &str, timeout: Option<Duration>) -> StatusLabel {
        let timeout = timeout.unwrap_or(self.timeout);
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => StatusLabel::Numeric(response.status().as_u16().to_string()),
            Err(e) => {
                debug!(url, "probe failed: {}", e);
                classify_error(&e)
            }
        }
    }

    pub async fn probe(&self, target: ProbeTarget) -> ProbeResult {
        let status = self.check(&target.url).await;
        ProbeResult {
            target,
            status,
            observed_at: Utc::now(),
        }
    }
}

impl Default for HealthProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

fn classify_error(e: &reqwest::Error) -> StatusLabel {
    if e.is_timeout() {
        StatusLabel::Timeout
    } else if e.is_connect() {
        StatusLabel::ConnectionError
    } else if e.is_builder() {
        StatusLabel::RequestError("InvalidUrl".to_string())
    } else if e.is_redirect() {
        StatusLabel::RequestError("TooManyRedirects".to_string())
    } else if e.is_body() || e.is_decode() {
        StatusLabel::RequestError("ContentDecodingError".to_string())
    } else if e.is_request() {
        StatusLabel::RequestError(request_error_kind(e))
    } else {
        StatusLabel::UnknownError(request_error_kind(e))
    }
}

/// Name the innermost io error kind when there is one, e.g. `ConnectionReset`.
fn request_error_kind(e: &reqwest::Error) -> String {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return format!("{:?}", io.kind());
        }
        source = err.source();
    }
    "RequestException".to_string()
}

/// Build the target for a URL discovered in a batch file.
///
/// Client and env come from the URL path; when the URL doesn't have the
/// expected shape the tags declared next to it are used instead.
pub fn target_for_url(url: &str, declared_client: &str, declared_env: &str) -> ProbeTarget {
    let (client, env) = extract_info_from_url(url);
    if client == NOT_AVAILABLE && env == NOT_AVAILABLE {
        ProbeTarget {
            url: url.to_string(),
            client: declared_client.to_string(),
            env: declared_env.to_string(),
            source: TargetSource::DeclaredInConfig,
        }
    } else {
        ProbeTarget {
            url: url.to_string(),
            client,
            env,
            source: TargetSource::DerivedFromUrl,
        }
    }
}
