use crate::types::{MetricSample, ProbeResult, StatusRecord};

/// Env substring that marks a production environment.
pub const PRODUCTION_MARKER: &str = "prd";

/// Items split into production and non-production buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<T> {
    pub production: Vec<T>,
    pub non_production: Vec<T>,
}

impl<T> Partition<T> {
    pub fn is_empty(&self) -> bool {
        self.production.is_empty() && self.non_production.is_empty()
    }

    pub fn len(&self) -> usize {
        self.production.len() + self.non_production.len()
    }
}

pub fn is_production_env(env: &str) -> bool {
    env.to_lowercase().contains(PRODUCTION_MARKER)
}

/// Samples whose value reaches `threshold`.
pub fn samples_at_or_above<'a>(samples: &'a [MetricSample], threshold: f64) -> Vec<&'a MetricSample> {
    samples.iter().filter(|s| s.value >= threshold).collect()
}

/// Probe results that did not come back with the expected status.
pub fn unexpected_results(results: &[ProbeResult]) -> Vec<&ProbeResult> {
    results.iter().filter(|r| !r.status.is_expected()).collect()
}

/// Stored rows that did not come back with the expected status.
pub fn unexpected_records(records: &[StatusRecord]) -> Vec<&StatusRecord> {
    records.iter().filter(|r| !r.status.is_expected()).collect()
}

/// Split `items` by whether `env_of` names a production environment.
/// Each item lands in exactly one bucket; relative order is kept.
pub fn partition_by_env<T, F>(items: Vec<T>, env_of: F) -> Partition<T>
where
    F: Fn(&T) -> &str,
{
    let (production, non_production) = items.into_iter().partition(|item| is_production_env(env_of(item)));
    Partition {
        production,
        non_production,
    }
}
