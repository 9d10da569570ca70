use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::mail::{dispatch_report, DispatchOutcome, Mailer};
use crate::metrics::PrometheusClient;
use crate::report::{build_report, csv, AlertDocument, ReportSection};
use crate::types::{Attachment, ConnectorAlertsConfig, MetricSample, QuerySpec};

const HEADING: &str = "Debezium Monitoring Alert";
const SIGN_OFF: &str = "OAPM Monitoring Script";

/// Alerts returned by one configured query.
#[derive(Debug, Clone)]
pub struct CategoryAlerts {
    pub spec: QuerySpec,
    pub samples: Vec<MetricSample>,
    /// Where the CSV was written, if writing succeeded.
    pub csv_path: Option<PathBuf>,
}

impl CategoryAlerts {
    /// Category name shown in the email: the output filename without extension.
    pub fn name(&self) -> String {
        Path::new(&self.spec.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.spec.filename.clone())
    }
}

#[derive(Debug)]
pub struct ConnectorAlertsRun {
    /// Categories that returned at least one alert, in query order.
    pub categories: Vec<CategoryAlerts>,
    pub dispatch: Option<DispatchOutcome>,
}

impl ConnectorAlertsRun {
    pub fn total_alerts(&self) -> usize {
        self.categories.iter().map(|c| c.samples.len()).sum()
    }
}

pub fn subject(total: usize, categories: usize) -> String {
    format!(
        "Debezium Monitoring Alert - {} issue(s) found across {} categories",
        total, categories
    )
}

/// Keep only the labels named in `desired`.
pub fn project_labels(mut sample: MetricSample, desired: &[String]) -> MetricSample {
    sample.labels.retain(|k, _| desired.iter().any(|d| d == k));
    sample
}

/// Run every configured query, write one CSV per query that returned
/// alerts, and send a single email with those files attached.
///
/// A query that fails is logged and skipped.
pub async fn run<M: Mailer + ?Sized>(cfg: &ConnectorAlertsConfig, mailer: &M) -> Result<ConnectorAlertsRun> {
    let client = PrometheusClient::new(&cfg.prometheus_url, cfg.query_timeout);
    let mut categories = Vec::new();

    for spec in &cfg.queries {
        let samples = match client.query(&spec.query).await {
            Ok(samples) => samples,
            Err(e) => {
                error!("Request to Prometheus failed for query '{}': {}", spec.query, e);
                continue;
            }
        };
        if samples.is_empty() {
            continue;
        }

        let queried_at = Utc::now();
        let samples: Vec<MetricSample> = samples
            .into_iter()
            .map(|s| project_labels(s.into_metric_sample(&spec.alert_type, queried_at), &cfg.desired_labels))
            .collect();

        let path = cfg.output_dir.join(&spec.filename);
        let csv_path = match csv::write_samples(&path, &cfg.desired_labels, &samples) {
            Ok(_) => Some(path),
            Err(e) => {
                error!("Could not write to CSV file {}: {}", path.display(), e);
                None
            }
        };
        categories.push(CategoryAlerts {
            spec: spec.clone(),
            samples,
            csv_path,
        });
    }

    let mut outcome = ConnectorAlertsRun { categories, dispatch: None };
    let total = outcome.total_alerts();
    if total == 0 {
        info!("No alerts found. Skipping email notification.");
        return Ok(outcome);
    }

    let doc = document(&outcome.categories, &cfg.desired_labels, total);
    let attachments = load_attachments(&outcome.categories);
    if let Some(report) = build_report(&subject(total, outcome.categories.len()), &doc, attachments)? {
        outcome.dispatch = Some(dispatch_report(mailer, &cfg.mail, report).await);
    }
    Ok(outcome)
}

pub fn document(categories: &[CategoryAlerts], labels: &[String], total: usize) -> AlertDocument {
    let intro = format!(
        "The Debezium monitoring script detected issues at {}. \
         A total of <b>{}</b> alert(s) were found. Please see the attached CSV files for details.",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        total
    );
    let header = csv::header(labels);
    let header: Vec<&str> = header.iter().map(String::as_str).collect();

    let mut doc = AlertDocument::new(HEADING, &intro, SIGN_OFF);
    for category in categories {
        let name = category.name();
        doc = doc
            .with_summary_item(&name, &category.spec.filename)
            .with_section(ReportSection::new(&name, &header, &category.samples, |s| csv::record(s, labels)));
    }
    doc
}

/// Read every written CSV back in. Files that can't be read are logged and
/// left off the email.
fn load_attachments(categories: &[CategoryAlerts]) -> Vec<Attachment> {
    let mut attachments = Vec::new();
    for path in categories.iter().filter_map(|c| c.csv_path.as_deref()) {
        match Attachment::from_path(path) {
            Ok(attachment) => {
                info!("Attached {} to the email.", path.display());
                attachments.push(attachment);
            }
            Err(e) => error!("Could not attach file {}: {}", path.display(), e),
        }
    }
    attachments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::RecordingMailer;
    use crate::types::MailConfig;
    use mockito::Matcher;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn spec(alert_type: &str, query: &str, filename: &str) -> QuerySpec {
        QuerySpec {
            alert_type: alert_type.to_string(),
            query: query.to_string(),
            filename: filename.to_string(),
        }
    }

    fn config(url: &str, output_dir: PathBuf) -> ConnectorAlertsConfig {
        ConnectorAlertsConfig {
            prometheus_url: url.to_string(),
            queries: vec![
                spec("queue_capacity_low", "Q1", "Event Queue Back pressure.csv"),
                spec("logged_errors_increase", "Q2", "Debezium worker task errors.csv"),
                spec("offset_commit_failure", "Q3", "Debezium offset commit failures.csv"),
            ],
            desired_labels: ["cluster", "connector", "env", "server"].iter().map(|s| s.to_string()).collect(),
            output_dir,
            query_timeout: Duration::from_secs(5),
            mail: MailConfig {
                sender: "monitor@example.com".to_string(),
                recipients: "a@example.com, b@example.com".to_string(),
                smtp_host: "127.0.0.1".to_string(),
                smtp_port: 25,
                smtp_timeout: Duration::from_secs(5),
            },
        }
    }

    async fn mock_query(server: &mut mockito::ServerGuard, query: &str, status: usize, body: &str) -> mockito::Mock {
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::UrlEncoded("query".into(), query.into()))
            .with_status(status)
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_one_csv_per_alerting_query() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _q1 = mock_query(
            &mut server,
            "Q1",
            200,
            r#"{"status":"success","data":{"result":[
                {"metric":{"cluster":"c1","connector":"orders","env":"prd","server":"s1","instance":"10.0.0.1"},"value":[0,"0.05"]},
                {"metric":{"cluster":"c2","env":"uat"},"value":[0,"0.1"]}
            ]}}"#,
        )
        .await;
        let _q2 = mock_query(&mut server, "Q2", 200, r#"{"status":"success","data":{"result":[]}}"#).await;
        let _q3 = mock_query(&mut server, "Q3", 500, "").await;

        let mailer = RecordingMailer::new();
        let outcome = run(&config(&server.url(), dir.path().to_path_buf()), &mailer).await.unwrap();

        assert_eq!(outcome.categories.len(), 1);
        assert_eq!(outcome.total_alerts(), 2);
        let written = dir.path().join("Event Queue Back pressure.csv");
        assert!(written.exists());
        assert!(!dir.path().join("Debezium worker task errors.csv").exists());
        assert!(!dir.path().join("Debezium offset commit failures.csv").exists());

        let read = csv::read_samples(&written).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].alert_type, "queue_capacity_low");
        assert_eq!(read[0].label("connector"), Some("orders"));
        assert_eq!(read[0].label("instance"), None);
        assert_eq!(read[1].label("server"), None);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["a@example.com", "b@example.com"]);
        assert_eq!(sent[0].subject, "Debezium Monitoring Alert - 2 issue(s) found across 1 categories");
        assert_eq!(sent[0].attachments.len(), 1);
        assert_eq!(sent[0].attachments[0].filename, "Event Queue Back pressure.csv");
        assert!(sent[0].html_body.contains("<b>Event Queue Back pressure:</b>"));
        assert!(sent[0].html_body.contains("A total of <b>2</b> alert(s)"));
        assert!(sent[0].html_body.contains("<div>OAPM Monitoring Script</div>"));
    }

    #[tokio::test]
    async fn test_no_alerts_no_email_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for q in ["Q1", "Q2", "Q3"] {
            mocks.push(mock_query(&mut server, q, 200, r#"{"status":"success","data":{"result":[]}}"#).await);
        }

        let mailer = RecordingMailer::new();
        let outcome = run(&config(&server.url(), dir.path().to_path_buf()), &mailer).await.unwrap();
        assert!(outcome.categories.is_empty());
        assert!(outcome.dispatch.is_none());
        assert!(mailer.sent().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_csv_still_alerts_without_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _q1 = mock_query(&mut server, "Q1", 200, r#"{"status":"success","data":{"result":[{"metric":{"env":"prd"},"value":[0,"1"]}]}}"#).await;
        let _q2 = mock_query(&mut server, "Q2", 200, r#"{"status":"error","error":"bad"}"#).await;
        let _q3 = mock_query(&mut server, "Q3", 200, r#"{"status":"success","data":{"result":[]}}"#).await;

        let mailer = RecordingMailer::new();
        let cfg = config(&server.url(), dir.path().join("missing-dir"));
        let outcome = run(&cfg, &mailer).await.unwrap();

        assert_eq!(outcome.categories.len(), 1);
        assert!(outcome.categories[0].csv_path.is_none());
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].attachments.is_empty());
    }

    #[test]
    fn test_project_labels() {
        let mut labels = BTreeMap::new();
        labels.insert("env".to_string(), "prd".to_string());
        labels.insert("instance".to_string(), "10.0.0.1".to_string());
        let sample = MetricSample {
            labels,
            value: 1.0,
            queried_at: Utc::now(),
            alert_type: "queue_capacity_low".to_string(),
        };
        let projected = project_labels(sample, &["env".to_string(), "server".to_string()]);
        assert_eq!(projected.labels.len(), 1);
        assert_eq!(projected.label("env"), Some("prd"));
    }

    #[test]
    fn test_category_name_strips_extension() {
        let category = CategoryAlerts {
            spec: spec("offset_commit_failure", "Q3", "Debezium offset commit failures.csv"),
            samples: Vec::new(),
            csv_path: None,
        };
        assert_eq!(category.name(), "Debezium offset commit failures");
    }
}
