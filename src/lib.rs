// Public modules
pub mod types;
pub mod config;
pub mod parsing;
pub mod scan;
pub mod probe;
pub mod metrics;
pub mod store;
pub mod report;
pub mod mail;
pub mod jobs;

// Re-export commonly used items
pub use types::*;
pub use config::{
    load_connector_alerts_config, load_connector_alerts_config_with_env, load_session_usage_config,
    load_session_usage_config_with_env, load_url_check_config, load_url_check_config_with_env, split_list,
    EnvironmentProvider, MockEnvironment, SystemEnvironment,
};
pub use parsing::{extract_info_from_url, parse_embedded_config, EmbeddedConfig, SkipReason};
pub use scan::{discover_configs, find_source_files, is_backup_file, DiscoveredConfig};
pub use probe::{target_for_url, HealthProber};
pub use metrics::*;
pub use store::{StatusStore, StoreError};
pub use report::{build_report, AlertDocument, ReportSection};
pub use mail::{dispatch_report, DispatchOutcome, Mailer, OutgoingMail, RecordingMailer, SmtpMailer};
