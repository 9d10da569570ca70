use anyhow::{bail, Context, Result};
use comfy_table::Table;
use std::collections::HashSet;
use tracing::{error, info, warn};

use crate::mail::{dispatch_report, DispatchOutcome, Mailer};
use crate::metrics::unexpected_records;
use crate::probe::{target_for_url, HealthProber};
use crate::report::{build_report, AlertDocument, ReportSection};
use crate::scan::discover_configs;
use crate::store::StatusStore;
use crate::types::{ProbeResult, StatusRecord, UrlCheckConfig};

const HEADING: &str = "URL Health Check Failure Alert";
const INTRO_HTML: &str =
    "The following URLs have reported a status other than <b>200 OK</b> on the most recent check.";
const SIGN_OFF: &str = "Oapm Team";

/// Outcome of one url-check run.
#[derive(Debug)]
pub struct UrlCheckRun {
    /// Every probe made this run, in probe order.
    pub results: Vec<ProbeResult>,
    /// Latest failing row per URL at the end of the run.
    pub failures: Vec<StatusRecord>,
    pub dispatch: Option<DispatchOutcome>,
}

/// Probe every URL declared under the base path, record the results, and
/// email the URLs whose latest status isn't `200`.
///
/// A missing base path or an unopenable database fails the run. The
/// database is closed on every path out of here.
pub async fn run<M: Mailer + ?Sized>(cfg: &UrlCheckConfig, mailer: &M) -> Result<UrlCheckRun> {
    info!("Starting URL status check in batch directories under: {}", cfg.base_path.display());
    if !cfg.base_path.is_dir() {
        bail!(
            "Base path '{}' does not exist or is not a directory",
            cfg.base_path.display()
        );
    }

    let store = StatusStore::open(&cfg.db_path)
        .with_context(|| format!("opening status database {}", cfg.db_path.display()))?;
    let outcome = run_with_store(cfg, &store, mailer).await;
    if let Err(e) = store.close() {
        error!("Failed to close database connection: {}", e);
    }
    outcome
}

pub async fn run_with_store<M: Mailer + ?Sized>(
    cfg: &UrlCheckConfig,
    store: &StatusStore,
    mailer: &M,
) -> Result<UrlCheckRun> {
    let prober = HealthProber::new(cfg.probe_timeout);
    let mut results = Vec::new();

    let discovered = discover_configs(
        &cfg.base_path,
        &cfg.batch_dir_prefix,
        &cfg.source_suffix,
        &cfg.config_variable,
    );
    // first declaration of a URL decides its tags
    let mut seen = HashSet::new();
    for found in &discovered {
        for url in &found.config.urls {
            if !seen.insert(url.as_str()) {
                warn!(url = %url, path = %found.path.display(), "URL already checked this run, skipping duplicate");
                continue;
            }
            let target = target_for_url(url, &found.config.client, &found.config.env);
            let result = prober.probe(target).await;
            if let Err(e) = store.record(&result) {
                error!(url = %url, "Error inserting probe result: {}", e);
            }
            results.push(result);
        }
    }

    info!("Checking for URL failures to report...");
    let failures = match store.latest_failures() {
        Ok(rows) => rows,
        Err(e) => {
            error!("Could not fetch failed URLs from database: {}", e);
            return Ok(UrlCheckRun { results, failures: Vec::new(), dispatch: None });
        }
    };

    let dispatch = report_failures(cfg, &failures, mailer).await?;
    Ok(UrlCheckRun { results, failures, dispatch })
}

/// Email `failures` as a single table. Nothing is sent when there are none.
pub async fn report_failures<M: Mailer + ?Sized>(
    cfg: &UrlCheckConfig,
    failures: &[StatusRecord],
    mailer: &M,
) -> Result<Option<DispatchOutcome>> {
    // the query already filters, this only guards callers passing raw rows
    let failures: Vec<StatusRecord> = unexpected_records(failures).into_iter().cloned().collect();
    let doc = AlertDocument::new(HEADING, INTRO_HTML, SIGN_OFF).with_section(failure_section(&failures));

    let Some(report) = build_report(&cfg.subject, &doc, Vec::new())? else {
        info!("No new URL failures found. No alert will be sent.");
        return Ok(None);
    };

    warn!("Found {} URL(s) with a non-200 status. Preparing alert email.", failures.len());
    Ok(Some(dispatch_report(mailer, &cfg.mail, report).await))
}

pub fn failure_section(failures: &[StatusRecord]) -> ReportSection {
    ReportSection::new(
        "Failed URL Checks",
        &["Client", "Environment", "URL", "Status"],
        failures,
        |r| vec![r.client.clone(), r.env.clone(), r.url.clone(), r.status.to_string()],
    )
}

/// Grid table of this run's probe results for the console.
pub fn results_table(results: &[ProbeResult]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Client", "Env", "URL", "Status"]);
    for r in results {
        table.add_row(vec![
            r.target.client.clone(),
            r.target.env.clone(),
            r.target.url.clone(),
            r.status.to_string(),
        ]);
    }
    table
}
