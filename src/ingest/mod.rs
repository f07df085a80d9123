pub mod dedup;
pub mod outcome;

pub use dedup::{candidate_bodies, is_empty_body, DedupIndex, DedupKey};
pub use outcome::{BatchResult, EntryError, EntryOutcome, ErrorItem, ErrorSet};

use crate::canonical::canonical_json;
use crate::constants::DEFAULT_DEDUP_QUERY_LIMIT;
use crate::domain::{NewReport, NewReportLog, Report, ReportEntry, ReportType};
use crate::metrics::IngestMetrics;
use crate::storage::{ReportLogStore, ReportQuery, ReportStore, StoreError, REPORT_EXISTS};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Turns validated report batches into stored reports and report logs
pub struct ReportIngester {
    reports: Arc<dyn ReportStore>,
    report_logs: Arc<dyn ReportLogStore>,
    dedup_query_limit: usize,
}

impl ReportIngester {
    pub fn new(reports: Arc<dyn ReportStore>, report_logs: Arc<dyn ReportLogStore>) -> Self {
        Self {
            reports,
            report_logs,
            dedup_query_limit: DEFAULT_DEDUP_QUERY_LIMIT,
        }
    }

    pub fn with_dedup_query_limit(mut self, limit: usize) -> Self {
        self.dedup_query_limit = limit;
        self
    }

    /// Log every entry of `batch`, stamped with the current server time.
    ///
    /// Returns the created log ids in submission order, or the aggregated
    /// errors if any entry failed. Entries stored before a failure stay stored.
    pub async fn log_reports(&self, batch: &[ReportEntry]) -> Result<Vec<Uuid>, ErrorSet> {
        self.log_reports_at(batch, Utc::now()).await
    }

    /// Same as [`log_reports`](Self::log_reports) with an explicit receipt time
    pub async fn log_reports_at(
        &self,
        batch: &[ReportEntry],
        received_at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, ErrorSet> {
        let span = tracing::info_span!("log_reports", entries = batch.len());
        self.process_batch(batch, received_at).instrument(span).await
    }

    async fn process_batch(
        &self,
        batch: &[ReportEntry],
        received_at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, ErrorSet> {
        let t0 = Instant::now();
        let now = truncate_to_seconds(received_at);
        IngestMetrics::record_batch_received(batch.len());

        let mut index = self.build_dedup_index(batch).await;
        debug!("Dedup index seeded with {} existing reports", index.len());

        let mut result = BatchResult::with_capacity(batch.len());
        for (position, entry) in batch.iter().enumerate() {
            let outcome = match self.log_entry(entry, &mut index, now).await {
                Ok(log_id) => EntryOutcome::Logged(log_id),
                Err(err) => {
                    warn!(position, code = err.code(), "Report entry rejected: {}", err);
                    IngestMetrics::record_entry_error(err.code());
                    EntryOutcome::Failed(err)
                }
            };
            result.push(outcome);
        }

        IngestMetrics::record_batch_duration(t0.elapsed().as_secs_f64());
        info!(
            logged = result.logged_count(),
            failed = result.error_count(),
            "Report batch processed"
        );
        result.into_response()
    }

    /// Fetch existing reports sharing a body with any entry of the batch
    async fn build_dedup_index(&self, batch: &[ReportEntry]) -> DedupIndex {
        let bodies = candidate_bodies(batch);
        if bodies.is_empty() {
            return DedupIndex::default();
        }

        let query = ReportQuery {
            bodies,
            limit: self.dedup_query_limit,
        };
        match self.reports.query(&query).await {
            Ok(existing) => DedupIndex::from_reports(existing),
            Err(err) => {
                warn!(
                    code = %err.code,
                    "Existing report lookup failed, continuing without dedup index: {}", err
                );
                DedupIndex::default()
            }
        }
    }

    async fn log_entry(
        &self,
        entry: &ReportEntry,
        index: &mut DedupIndex,
        now: DateTime<Utc>,
    ) -> Result<Uuid, EntryError> {
        if is_empty_body(&entry.body) {
            return Err(EntryError::EmptyReportBody);
        }
        let triggered =
            triggered_at(now, entry.age).ok_or(EntryError::AgeOutOfRange { age: entry.age })?;

        let key = DedupKey::new(entry.report_type, &entry.body);
        let report_id = match index.get(&key) {
            Some(report) => {
                IngestMetrics::record_report_reused();
                report.id
            }
            None => {
                let new_report = NewReport {
                    report_type: entry.report_type,
                    body: entry.body.clone(),
                };
                let report = match self.reports.insert(new_report).await {
                    Ok(report) => {
                        IngestMetrics::record_report_created();
                        report
                    }
                    Err(err) if err.code == REPORT_EXISTS => {
                        let report = self.resolve_existing(&key, entry, err).await?;
                        IngestMetrics::record_report_reused();
                        report
                    }
                    Err(err) => return Err(err.into()),
                };
                let id = report.id;
                index.insert(report);
                id
            }
        };

        let log = self
            .report_logs
            .insert(NewReportLog {
                report_id,
                url: entry.url.clone(),
                user_agent: entry.user_agent.clone(),
                triggered,
                reported: now,
            })
            .await?;
        IngestMetrics::record_log_created();
        Ok(log.id)
    }

    /// Look up the stored report an insert collided with.
    ///
    /// The seeded index is capped at `dedup_query_limit` rows, so a batch can
    /// reach reports it never saw. Falls back to the insert error when the
    /// report cannot be found.
    async fn resolve_existing(
        &self,
        key: &DedupKey,
        entry: &ReportEntry,
        conflict: StoreError,
    ) -> Result<Report, StoreError> {
        let query = ReportQuery {
            bodies: vec![canonical_json(&entry.body)],
            limit: ReportType::ALL.len(),
        };
        let found = match self.reports.query(&query).await {
            Ok(found) => found,
            Err(err) => {
                warn!(code = %err.code, "Lookup after report conflict failed: {}", err);
                return Err(conflict);
            }
        };
        debug!("Resolved report conflict for {}", entry.report_type);
        found
            .into_iter()
            .find(|r| DedupKey::new(r.report_type, &r.body) == *key)
            .ok_or(conflict)
    }
}

/// When the reported event happened: `reported` minus `age_ms`, truncated to whole seconds.
///
/// `None` when the result falls outside the representable date range.
pub fn triggered_at(reported: DateTime<Utc>, age_ms: i64) -> Option<DateTime<Utc>> {
    let secs = (reported.timestamp() as f64 - age_ms as f64 / 1000.0) as i64;
    DateTime::<Utc>::from_timestamp(secs, 0)
}

fn truncate_to_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(t.timestamp(), 0).unwrap_or(t)
}
