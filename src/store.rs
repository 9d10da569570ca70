//! SQLite-backed log of URL probe results.

use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::types::{ProbeResult, StatusLabel, StatusRecord, EXPECTED_STATUS};

pub const STATUS_TABLE: &str = "apm_url_response_status";

/// Timestamps sort lexically in this form. Matches the column default,
/// SQLite's `%Y-%m-%d %H:%M:%f` (millisecond precision).
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("could not create table {table}: {source}")]
    Schema {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

/// Append-only status table. One connection for the lifetime of a run.
pub struct StatusStore {
    conn: Connection,
}

impl StatusStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS apm_url_response_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client TEXT NOT NULL,
                env TEXT NOT NULL,
                url TEXT NOT NULL,
                status TEXT NOT NULL,
                check_timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );",
        )
        .map_err(|source| StoreError::Schema { table: STATUS_TABLE, source })?;
        info!("Table '{}' ensured to exist.", STATUS_TABLE);
        Ok(Self { conn })
    }

    /// Insert one result in its own transaction and return the row id.
    ///
    /// A failed insert is rolled back when the transaction drops.
    pub fn record(&self, result: &ProbeResult) -> Result<i64, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO apm_url_response_status (client, env, url, status, check_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                result.target.client,
                result.target.env,
                result.target.url,
                result.status.to_string(),
                result.observed_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// Latest row per URL, limited to URLs whose latest status isn't `200`.
    ///
    /// An unchanged failure is returned again on every call; nothing records
    /// that it was already reported.
    pub fn latest_failures(&self) -> Result<Vec<StatusRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "WITH latest_status AS (
                SELECT id, client, env, url, status, check_timestamp,
                       ROW_NUMBER() OVER (PARTITION BY url ORDER BY check_timestamp DESC, id DESC) AS rn
                FROM apm_url_response_status
            )
            SELECT id, client, env, url, status, check_timestamp
            FROM latest_status
            WHERE rn = 1 AND status <> ?1
            ORDER BY id",
        )?;

        let records = stmt
            .query_map(params![EXPECTED_STATUS], |row| {
                let status: String = row.get(4)?;
                Ok(StatusRecord {
                    id: row.get(0)?,
                    client: row.get(1)?,
                    env: row.get(2)?,
                    url: row.get(3)?,
                    status: StatusLabel::from(status.as_str()),
                    check_timestamp: row.get(5)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(records)
    }

    pub fn row_count(&self) -> Result<i64, StoreError> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM apm_url_response_status", [], |row| row.get(0))?)
    }

    /// Close the connection, reporting any error SQLite raises while doing so.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        info!("Database connection closed.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProbeTarget, TargetSource};
    use chrono::{Duration, TimeZone, Utc};

    fn result(url: &str, status: StatusLabel, minute: u32) -> ProbeResult {
        ProbeResult {
            target: ProbeTarget {
                url: url.to_string(),
                client: "C".to_string(),
                env: "PRD".to_string(),
                source: TargetSource::DerivedFromUrl,
            },
            status,
            observed_at: Utc.with_ymd_and_hms(2025, 6, 23, 10, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.db");
        let store = StatusStore::open(&path).unwrap();
        store.record(&result("https://a/metrics", StatusLabel::Timeout, 0)).unwrap();
        store.close().unwrap();

        let store = StatusStore::open(&path).unwrap();
        assert_eq!(store.row_count().unwrap(), 1);
    }

    #[test]
    fn test_rows_accumulate_per_url() {
        let store = StatusStore::open_in_memory().unwrap();
        let first = store.record(&result("https://a/metrics", StatusLabel::Timeout, 0)).unwrap();
        let second = store.record(&result("https://a/metrics", StatusLabel::Timeout, 1)).unwrap();
        assert!(second > first);
        assert_eq!(store.row_count().unwrap(), 2);
    }

    #[test]
    fn test_latest_failures_uses_most_recent_row() {
        let store = StatusStore::open_in_memory().unwrap();
        // recovered
        store.record(&result("https://a/metrics", StatusLabel::Numeric("500".into()), 0)).unwrap();
        store.record(&result("https://a/metrics", StatusLabel::Numeric("200".into()), 5)).unwrap();
        // newly broken
        store.record(&result("https://b/metrics", StatusLabel::Numeric("200".into()), 0)).unwrap();
        store.record(&result("https://b/metrics", StatusLabel::ConnectionError, 5)).unwrap();
        // always failing
        store.record(&result("https://c/metrics", StatusLabel::Numeric("404".into()), 1)).unwrap();

        let failures = store.latest_failures().unwrap();
        let summary: Vec<(String, StatusLabel)> =
            failures.into_iter().map(|r| (r.url, r.status)).collect();
        assert_eq!(
            summary,
            vec![
                ("https://b/metrics".to_string(), StatusLabel::ConnectionError),
                ("https://c/metrics".to_string(), StatusLabel::Numeric("404".into())),
            ]
        );
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        let store = StatusStore::open_in_memory().unwrap();
        store.record(&result("https://a/metrics", StatusLabel::Timeout, 3)).unwrap();
        store.record(&result("https://a/metrics", StatusLabel::Numeric("503".into()), 3)).unwrap();

        let failures = store.latest_failures().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].status, StatusLabel::Numeric("503".into()));
    }

    #[test]
    fn test_unchanged_failure_is_reported_again() {
        let store = StatusStore::open_in_memory().unwrap();
        let mut r = result("https://a/metrics", StatusLabel::Timeout, 0);
        store.record(&r).unwrap();
        assert_eq!(store.latest_failures().unwrap().len(), 1);

        r.observed_at = r.observed_at + Duration::minutes(10);
        store.record(&r).unwrap();
        assert_eq!(store.latest_failures().unwrap().len(), 1);
    }

    #[test]
    fn test_default_timestamp_matches_recorded_format() {
        let store = StatusStore::open_in_memory().unwrap();
        store.record(&result("https://a/metrics", StatusLabel::Timeout, 7)).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO apm_url_response_status (client, env, url, status) VALUES ('C', 'PRD', 'https://b/metrics', '500')",
                [],
            )
            .unwrap();

        let stamps: Vec<String> = store
            .conn
            .prepare("SELECT check_timestamp FROM apm_url_response_status ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<SqlResult<_>>()
            .unwrap();
        assert_eq!(stamps.len(), 2);
        assert_eq!(stamps[0].len(), stamps[1].len());
        assert_eq!(stamps[1].as_bytes()[19], b'.');
        assert_eq!(stamps[1].len(), "2025-06-23 10:07:00.000".len());
    }

    #[test]
    fn test_timestamp_text() {
        let store = StatusStore::open_in_memory().unwrap();
        store.record(&result("https://a/metrics", StatusLabel::Timeout, 7)).unwrap();
        let failures = store.latest_failures().unwrap();
        assert_eq!(failures[0].check_timestamp, "2025-06-23 10:07:00.000");
    }
}
