use super::{ReportLogStore, ReportQuery, ReportStore, StoreError, REPORT_EXISTS};
use crate::canonical::canonical_json;
use crate::domain::{NewReport, NewReportLog, Report, ReportLog};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

struct StoredReport {
    report: Report,
    canonical_body: String,
}

/// In-memory storage implementation for development/testing
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    reports: Arc<Mutex<Vec<StoredReport>>>,
    report_logs: Arc<Mutex<Vec<ReportLog>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::new("store_unavailable", "In-memory store lock is poisoned."))
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored reports, in insertion order
    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .map(|r| r.iter().map(|s| s.report.clone()).collect())
            .unwrap_or_default()
    }

    /// Snapshot of all stored report logs, in insertion order
    pub fn report_logs(&self) -> Vec<ReportLog> {
        self.report_logs
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    pub fn logs_for_report(&self, report_id: Uuid) -> Vec<ReportLog> {
        self.report_logs()
            .into_iter()
            .filter(|l| l.report_id == report_id)
            .collect()
    }
}

#[async_trait]
impl ReportStore for InMemoryStorage {
    async fn query(&self, query: &ReportQuery) -> Result<Vec<Report>, StoreError> {
        let wanted: HashSet<&str> = query.bodies.iter().map(String::as_str).collect();
        let reports = lock(&self.reports)?;
        Ok(reports
            .iter()
            .filter(|s| wanted.contains(s.canonical_body.as_str()))
            .take(query.limit)
            .map(|s| s.report.clone())
            .collect())
    }

    async fn insert(&self, report: NewReport) -> Result<Report, StoreError> {
        let canonical_body = canonical_json(&report.body);
        let mut reports = lock(&self.reports)?;
        if reports
            .iter()
            .any(|s| s.report.report_type == report.report_type && s.canonical_body == canonical_body)
        {
            return Err(StoreError::new(
                REPORT_EXISTS,
                "A report with the same type and body already exists.",
            ));
        }

        let stored = Report {
            id: Uuid::new_v4(),
            report_type: report.report_type,
            body: report.body,
            created_at: Utc::now(),
        };
        debug!("Created report: {} with id {}", stored.report_type, stored.id);
        reports.push(StoredReport {
            report: stored.clone(),
            canonical_body,
        });
        Ok(stored)
    }
}

#[async_trait]
impl ReportLogStore for InMemoryStorage {
    async fn insert(&self, log: NewReportLog) -> Result<ReportLog, StoreError> {
        let known_report = lock(&self.reports)?
            .iter()
            .any(|s| s.report.id == log.report_id);
        if !known_report {
            return Err(StoreError::new(
                "invalid_report_id",
                "Report log references an unknown report.",
            )
            .with_data(serde_json::json!({ "report_id": log.report_id })));
        }

        let stored = ReportLog {
            id: Uuid::new_v4(),
            report_id: log.report_id,
            url: log.url,
            user_agent: log.user_agent,
            triggered: log.triggered,
            reported: log.reported,
        };
        debug!("Created report log {} for report {}", stored.id, stored.report_id);
        lock(&self.report_logs)?.push(stored.clone());
        Ok(stored)
    }
}
