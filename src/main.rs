use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use healthmon::config::{load_connector_alerts_config, load_session_usage_config, load_url_check_config};
use healthmon::jobs::{connector_alerts, session_usage, url_check};
use healthmon::mail::SmtpMailer;

/// Threshold alerting for batch metrics endpoints, database sessions and
/// connector health. Settings are read from the environment.
#[derive(Debug, clap::Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Command {
    /// Probe every metrics URL declared in the batch sources and email the failing ones.
    UrlCheck,
    /// Email databases whose session usage reached the threshold.
    SessionUsage,
    /// Run the connector queries, write one CSV per alerting query and email them.
    ConnectorAlerts,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Command::UrlCheck => {
            let cfg = load_url_check_config()?;
            let mailer = SmtpMailer::new(&cfg.mail);
            let run = url_check::run(&cfg, &mailer).await?;
            if run.results.is_empty() {
                info!("No URLs found or processed.");
            } else {
                println!("{}", url_check::results_table(&run.results));
            }
        }
        Command::SessionUsage => {
            let cfg = load_session_usage_config()?;
            let mailer = SmtpMailer::new(&cfg.mail);
            let run = session_usage::run(&cfg, &mailer).await?;
            info!("Session usage check finished: {} alert(s)", run.alerts.len());
        }
        Command::ConnectorAlerts => {
            let cfg = load_connector_alerts_config()?;
            let mailer = SmtpMailer::new(&cfg.mail);
            let run = connector_alerts::run(&cfg, &mailer).await?;
            info!(
                "Connector check finished: {} alert(s) across {} categories",
                run.total_alerts(),
                run.categories.len()
            );
        }
    }

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .try_init();
}
