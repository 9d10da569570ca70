use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use crate::types::{ConnectorAlertsConfig, MailConfig, QuerySpec, SessionUsageConfig, UrlCheckConfig};

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Split a comma-separated value, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn required<E: EnvironmentProvider>(env: &E, key: &str) -> Result<String> {
    env.get_var(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("{} env var must be set", key))
}

fn seconds_or<E: EnvironmentProvider>(env: &E, key: &str, default: u64) -> Duration {
    let secs = env.get_var(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

pub fn load_mail_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<MailConfig> {
    let smtp_host = required(env, "SMTP_HOST")?;
    let smtp_port: u16 = env.get_var("SMTP_PORT")
        .unwrap_or_else(|| "25".to_string())
        .trim()
        .parse()
        .context("Invalid SMTP_PORT")?;
    let sender = required(env, "SENDER_EMAIL")?;

    // An empty recipient list is not a setup failure; dispatch logs and skips it.
    let recipients = env.get_var("RECEIVER_EMAILS").unwrap_or_default();

    Ok(MailConfig {
        sender,
        recipients,
        smtp_host,
        smtp_port,
        smtp_timeout: seconds_or(env, "SMTP_TIMEOUT_SECS", 30),
    })
}

pub fn load_url_check_config() -> Result<UrlCheckConfig> {
    load_url_check_config_with_env(&SystemEnvironment)
}

pub fn load_url_check_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<UrlCheckConfig> {
    let base_path = PathBuf::from(required(env, "BASE_PATH")?);
    let mail = load_mail_config_with_env(env)?;

    Ok(UrlCheckConfig {
        base_path,
        batch_dir_prefix: env.get_var("BATCH_DIR_PREFIX").unwrap_or_else(|| "prd_apm_batch".to_string()),
        source_suffix: env.get_var("SOURCE_SUFFIX").unwrap_or_else(|| ".py".to_string()),
        config_variable: env.get_var("CONFIG_VARIABLE").unwrap_or_else(|| "grok".to_string()),
        db_path: PathBuf::from(env.get_var("DB_PATH").unwrap_or_else(|| "healthmon.db".to_string())),
        probe_timeout: seconds_or(env, "PROBE_TIMEOUT_SECS", 10),
        subject: env.get_var("URL_CHECK_SUBJECT")
            .unwrap_or_else(|| "ALERT: URL Health Check Failure Detected".to_string()),
        mail,
    })
}

pub fn load_session_usage_config() -> Result<SessionUsageConfig> {
    load_session_usage_config_with_env(&SystemEnvironment)
}

pub fn load_session_usage_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<SessionUsageConfig> {
    let prometheus_url = required(env, "PROMETHEUS_URL")?;
    let query = required(env, "SESSION_QUERY")?;
    let threshold: f64 = env.get_var("SESSION_THRESHOLD")
        .unwrap_or_else(|| "80".to_string())
        .trim()
        .parse()
        .context("Invalid SESSION_THRESHOLD")?;
    let mail = load_mail_config_with_env(env)?;

    Ok(SessionUsageConfig {
        prometheus_url,
        query,
        threshold,
        query_timeout: seconds_or(env, "QUERY_TIMEOUT_SECS", 15),
        mail,
    })
}

pub fn load_connector_alerts_config() -> Result<ConnectorAlertsConfig> {
    load_connector_alerts_config_with_env(&SystemEnvironment)
}

pub fn load_connector_alerts_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<ConnectorAlertsConfig> {
    let prometheus_url = required(env, "PROMETHEUS_URL")?;
    let queries: Vec<QuerySpec> = serde_json::from_str(&required(env, "METRIC_QUERIES")?)
        .context("Invalid METRIC_QUERIES (expected a JSON array of {alert_type, query, filename})")?;
    if queries.is_empty() {
        return Err(anyhow!("METRIC_QUERIES must name at least one query"));
    }

    let desired_labels = split_list(
        &env.get_var("DESIRED_LABELS").unwrap_or_else(|| "cluster,connector,env,server".to_string()),
    );
    let mail = load_mail_config_with_env(env)?;

    Ok(ConnectorAlertsConfig {
        prometheus_url,
        queries,
        desired_labels,
        output_dir: PathBuf::from(env.get_var("OUTPUT_DIR").unwrap_or_else(|| ".".to_string())),
        query_timeout: seconds_or(env, "QUERY_TIMEOUT_SECS", 15),
        mail,
    })
}
