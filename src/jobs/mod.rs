//! The three alerting jobs. Each one loads its inputs, decides what crossed
//! its threshold, and hands at most one report to a [`Mailer`](crate::mail::Mailer).

pub mod connector_alerts;
pub mod session_usage;
pub mod url_check;
