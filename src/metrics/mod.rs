// Metrics backend access and threshold evaluation
pub mod query;
pub mod threshold;

// Re-export commonly used items
pub use query::{parse_query_response, PrometheusClient, QueryError, QuerySample, DEFAULT_QUERY_TIMEOUT};
pub use threshold::{
    is_production_env, partition_by_env, samples_at_or_above, unexpected_records,
    unexpected_results, Partition,
};
