use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::mail::{dispatch_report, DispatchOutcome, Mailer};
use crate::metrics::{partition_by_env, samples_at_or_above, Partition, PrometheusClient};
use crate::report::{build_report, AlertDocument, ReportSection};
use crate::types::{Alert, SessionUsageConfig};

const ALERT_TYPE: &str = "session_usage";
const HEADING: &str = "High Session Usage Alert";
const SIGN_OFF: &str = "Oapm Team";

pub const PRODUCTION_TITLE: &str = "Production Environments (PRD)";
pub const NON_PRODUCTION_TITLE: &str = "Non-Production Environments (NPD)";

#[derive(Debug)]
pub struct SessionUsageRun {
    pub alerts: Partition<Alert>,
    pub dispatch: Option<DispatchOutcome>,
}

impl SessionUsageRun {
    fn empty() -> Self {
        Self {
            alerts: Partition { production: Vec::new(), non_production: Vec::new() },
            dispatch: None,
        }
    }
}

pub fn subject(threshold: f64) -> String {
    format!("ALERT: High Session Usage Detected in Oracle DB (Threshold > {}%)", threshold)
}

/// Run the session query and email every database at or above the threshold,
/// split into production and non-production tables.
///
/// A failed query is logged and ends the run without an email.
pub async fn run<M: Mailer + ?Sized>(cfg: &SessionUsageConfig, mailer: &M) -> Result<SessionUsageRun> {
    info!("Starting session usage check...");
    let client = PrometheusClient::new(&cfg.prometheus_url, cfg.query_timeout);
    let queried_at = Utc::now();
    let samples: Vec<_> = match client.query(&cfg.query).await {
        Ok(samples) => samples
            .into_iter()
            .map(|s| s.into_metric_sample(ALERT_TYPE, queried_at))
            .collect(),
        Err(e) => {
            error!(url = %client.query_url(), "Failed to query session usage: {}", e);
            return Ok(SessionUsageRun::empty());
        }
    };

    let alerts: Vec<Alert> = samples_at_or_above(&samples, cfg.threshold)
        .into_iter()
        .map(|s| Alert::from_sample(s, "database"))
        .collect();
    if alerts.is_empty() {
        info!("No session counts found at or above the threshold of {}.", cfg.threshold);
        return Ok(SessionUsageRun::empty());
    }

    warn!("Found {} instances exceeding the threshold. Preparing alert email.", alerts.len());
    let alerts = partition_by_env(alerts, |a| a.env.as_str());
    let doc = document(cfg.threshold, &alerts);
    let dispatch = match build_report(&subject(cfg.threshold), &doc, Vec::new())? {
        Some(report) => Some(dispatch_report(mailer, &cfg.mail, report).await),
        None => None,
    };
    Ok(SessionUsageRun { alerts, dispatch })
}

pub fn document(threshold: f64, alerts: &Partition<Alert>) -> AlertDocument {
    let intro = format!(
        "The following databases have reported session usage reaching or exceeding the threshold of <b>{}%</b>.",
        threshold
    );
    AlertDocument::new(HEADING, &intro, SIGN_OFF)
        .with_section(alert_section(PRODUCTION_TITLE, &alerts.production))
        .with_section(alert_section(NON_PRODUCTION_TITLE, &alerts.non_production))
}

fn alert_section(title: &str, alerts: &[Alert]) -> ReportSection {
    ReportSection::new(
        title,
        &["Database", "Client", "Environment", "Session Count %"],
        alerts,
        |a| {
            vec![
                a.category.clone(),
                a.client.clone(),
                a.env.clone(),
                format!("{}%", a.value.trunc() as i64),
            ]
        },
    )
}
