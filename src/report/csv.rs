use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::types::MetricSample;

/// Leading columns of every alert CSV; label columns follow.
pub const FIXED_FIELDS: [&str; 3] = ["timestamp", "value", "alert_type"];

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("header must start with timestamp,value,alert_type")]
    Header,
    #[error("row {row}: invalid {field} '{value}'")]
    Field {
        row: usize,
        field: &'static str,
        value: String,
    },
}

pub fn header(labels: &[String]) -> Vec<String> {
    FIXED_FIELDS
        .iter()
        .map(|f| f.to_string())
        .chain(labels.iter().cloned())
        .collect()
}

/// Fields of one alert row, in header order. Missing labels are empty.
pub fn record(sample: &MetricSample, labels: &[String]) -> Vec<String> {
    let mut fields = vec![
        sample.queried_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        sample.value.to_string(),
        sample.alert_type.clone(),
    ];
    fields.extend(labels.iter().map(|l| sample.label(l).unwrap_or_default().to_string()));
    fields
}

/// Write `samples` to `path`, replacing any existing file.
///
/// Returns `false` without touching the filesystem when there is nothing to
/// write.
pub fn write_samples(path: &Path, labels: &[String], samples: &[MetricSample]) -> Result<bool, CsvError> {
    if samples.is_empty() {
        info!("No data to write for {}.", path.display());
        return Ok(false);
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header(labels))?;
    for sample in samples {
        writer.write_record(record(sample, labels))?;
    }
    writer.flush().map_err(csv::Error::from)?;
    info!("Alerts successfully written to {}", path.display());
    Ok(true)
}

/// Read back a file produced by [`write_samples`]. Empty label cells are
/// treated as absent labels.
pub fn read_samples(path: &Path) -> Result<Vec<MetricSample>, CsvError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.len() < FIXED_FIELDS.len() || headers.iter().take(3).ne(FIXED_FIELDS.iter().copied()) {
        return Err(CsvError::Header);
    }
    let label_names: Vec<String> = headers.iter().skip(3).map(String::from).collect();

    let mut samples = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row?;
        let field = |idx: usize| row.get(idx).unwrap_or_default();

        let queried_at = DateTime::parse_from_rfc3339(field(0))
            .map_err(|_| CsvError::Field { row: i + 1, field: "timestamp", value: field(0).to_string() })?
            .with_timezone(&Utc);
        let value: f64 = field(1)
            .parse()
            .map_err(|_| CsvError::Field { row: i + 1, field: "value", value: field(1).to_string() })?;

        let labels: BTreeMap<String, String> = label_names
            .iter()
            .enumerate()
            .filter_map(|(j, name)| {
                let v = field(j + 3);
                (!v.is_empty()).then(|| (name.clone(), v.to_string()))
            })
            .collect();

        samples.push(MetricSample {
            labels,
            value,
            queried_at,
            alert_type: field(2).to_string(),
        });
    }
    Ok(samples)
}
