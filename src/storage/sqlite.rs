use super::{ReportLogStore, ReportQuery, ReportStore, StoreError, REPORT_EXISTS};
use crate::canonical::{body_hash, canonical_json};
use crate::domain::{NewReport, NewReportLog, Report, ReportLog, ReportType};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA foreign_keys=ON;
    CREATE TABLE IF NOT EXISTS reports (
        id          TEXT PRIMARY KEY,
        type        TEXT NOT NULL,
        body        TEXT NOT NULL,
        body_hash   TEXT NOT NULL,
        created_at  INTEGER NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS reports_type_body ON reports (type, body_hash);
    CREATE INDEX IF NOT EXISTS reports_body_hash ON reports (body_hash);
    CREATE TABLE IF NOT EXISTS report_logs (
        id          TEXT PRIMARY KEY,
        report_id   TEXT NOT NULL REFERENCES reports (id),
        url         TEXT NOT NULL,
        user_agent  TEXT NOT NULL,
        triggered   INTEGER NOT NULL,
        reported    INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS report_logs_report_id ON report_logs (report_id);
"#;

/// SQLite-backed report and report log store.
///
/// Uniqueness of (type, body) is enforced by the `reports_type_body` index; the
/// losing insert of two racing requests gets `report_exists` instead of
/// writing a duplicate row.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn from_timestamp(secs: i64) -> std::result::Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::new("db_query_error", format!("Invalid stored timestamp {}.", secs)))
}

// Stored timestamps have whole-second granularity
fn now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::<Utc>::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

fn query_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::new("db_query_error", format!("Could not read from the database: {}", err))
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::result::Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::new("store_unavailable", "Database connection lock is poisoned."))
    }

    pub fn report_count(&self) -> std::result::Result<usize, StoreError> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))
            .map_err(query_error)?;
        Ok(n as usize)
    }

    pub fn logs_for_report(&self, report_id: Uuid) -> std::result::Result<Vec<ReportLog>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, report_id, url, user_agent, triggered, reported
                 FROM report_logs WHERE report_id = ?1 ORDER BY rowid",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![report_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .map_err(query_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(query_error)?;

        rows.into_iter()
            .map(|(id, report_id, url, user_agent, triggered, reported)| -> std::result::Result<ReportLog, StoreError> {
                Ok(ReportLog {
                    id: Uuid::parse_str(&id).map_err(query_error)?,
                    report_id: Uuid::parse_str(&report_id).map_err(query_error)?,
                    url,
                    user_agent,
                    triggered: from_timestamp(triggered)?,
                    reported: from_timestamp(reported)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ReportStore for SqliteStorage {
    async fn query(&self, query: &ReportQuery) -> std::result::Result<Vec<Report>, StoreError> {
        if query.bodies.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }

        let hashes: Vec<String> = query.bodies.iter().map(|b| body_hash(b)).collect();
        let placeholders = (1..=hashes.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id, type, body, created_at FROM reports
             WHERE body_hash IN ({}) ORDER BY rowid LIMIT {}",
            placeholders, query.limit
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(query_error)?;
        let rows = stmt
            .query_map(params_from_iter(hashes.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(query_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(query_error)?;

        rows.into_iter()
            .map(|(id, report_type, body, created_at)| -> std::result::Result<Report, StoreError> {
                Ok(Report {
                    id: Uuid::parse_str(&id).map_err(query_error)?,
                    report_type: report_type.parse::<ReportType>().map_err(query_error)?,
                    body: serde_json::from_str(&body).map_err(query_error)?,
                    created_at: from_timestamp(created_at)?,
                })
            })
            .collect()
    }

    async fn insert(&self, report: NewReport) -> std::result::Result<Report, StoreError> {
        let canonical_body = canonical_json(&report.body);
        let stored = Report {
            id: Uuid::new_v4(),
            report_type: report.report_type,
            body: report.body,
            created_at: now_seconds(),
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO reports (id, type, body, body_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                stored.id.to_string(),
                stored.report_type.as_str(),
                canonical_body,
                body_hash(&canonical_body),
                stored.created_at.timestamp(),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::new(
                    REPORT_EXISTS,
                    "A report with the same type and body already exists.",
                )
            } else {
                StoreError::new("db_insert_error", format!("Could not insert report into the database: {}", e))
            }
        })?;

        debug!("Created report: {} with id {}", stored.report_type, stored.id);
        Ok(stored)
    }
}

#[async_trait]
impl ReportLogStore for SqliteStorage {
    async fn insert(&self, log: NewReportLog) -> std::result::Result<ReportLog, StoreError> {
        let stored = ReportLog {
            id: Uuid::new_v4(),
            report_id: log.report_id,
            url: log.url,
            user_agent: log.user_agent,
            triggered: log.triggered,
            reported: log.reported,
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO report_logs (id, report_id, url, user_agent, triggered, reported)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                stored.id.to_string(),
                stored.report_id.to_string(),
                stored.url,
                stored.user_agent,
                stored.triggered.timestamp(),
                stored.reported.timestamp(),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::new("invalid_report_id", "Report log references an unknown report.")
                    .with_data(serde_json::json!({ "report_id": stored.report_id }))
            } else {
                StoreError::new(
                    "db_insert_error",
                    format!("Could not insert report log into the database: {}", e),
                )
            }
        })?;

        debug!("Created report log {} for report {}", stored.id, stored.report_id);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn query_finds_reports_by_body_regardless_of_key_order() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let created = ReportStore::insert(
            &store,
            NewReport {
                report_type: ReportType::Csp,
                body: json!({"blocked-uri": "eval", "disposition": "enforce"}),
            },
        )
        .await
        .unwrap();

        let found = store
            .query(&ReportQuery {
                bodies: vec![canonical_json(&json!({"disposition": "enforce", "blocked-uri": "eval"}))],
                limit: 100,
            })
            .await
            .unwrap();
        assert_eq!(found, vec![created]);
    }

    #[tokio::test]
    async fn empty_query_short_circuits() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let found = store.query(&ReportQuery::default()).await.unwrap();
        assert!(found.is_empty());
    }
}
