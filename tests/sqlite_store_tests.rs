use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use reporting_api::canonical::canonical_json;
use reporting_api::domain::{NewReport, NewReportLog, ReportEntry, ReportType};
use reporting_api::ingest::ReportIngester;
use reporting_api::storage::{ReportLogStore, ReportQuery, ReportStore, SqliteStorage};
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn new_report(report_type: ReportType, body: serde_json::Value) -> NewReport {
    NewReport { report_type, body }
}

#[tokio::test]
async fn reports_survive_reopening_the_database() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("nested").join("reports.db");

    let created = {
        let store = SqliteStorage::open(&path)?;
        ReportStore::insert(&store, new_report(ReportType::Csp, json!({"a": 1}))).await?
    };

    let store = SqliteStorage::open(&path)?;
    let found = store
        .query(&ReportQuery {
            bodies: vec![canonical_json(&json!({"a": 1}))],
            limit: 100,
        })
        .await?;
    assert_eq!(found, vec![created]);
    Ok(())
}

#[tokio::test]
async fn duplicate_type_and_body_is_rejected() -> Result<()> {
    let store = SqliteStorage::open_in_memory()?;
    ReportStore::insert(&store, new_report(ReportType::Csp, json!({"a": 1, "b": 2}))).await?;

    let err = ReportStore::insert(&store, new_report(ReportType::Csp, json!({"b": 2, "a": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.code, "report_exists");

    // Same body under another type is a separate report
    ReportStore::insert(&store, new_report(ReportType::Crash, json!({"a": 1, "b": 2}))).await?;
    assert_eq!(store.report_count()?, 2);
    Ok(())
}

#[tokio::test]
async fn query_honours_the_limit() -> Result<()> {
    let store = SqliteStorage::open_in_memory()?;
    let body = json!({"shared": true});
    for report_type in [ReportType::Csp, ReportType::Deprecation, ReportType::Crash] {
        ReportStore::insert(&store, new_report(report_type, body.clone())).await?;
    }
    ReportStore::insert(&store, new_report(ReportType::Csp, json!({"other": 1}))).await?;

    let all = store
        .query(&ReportQuery {
            bodies: vec![canonical_json(&body)],
            limit: 100,
        })
        .await?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].report_type, ReportType::Csp);

    let limited = store
        .query(&ReportQuery {
            bodies: vec![canonical_json(&body)],
            limit: 2,
        })
        .await?;
    assert_eq!(limited.len(), 2);
    Ok(())
}

#[tokio::test]
async fn empty_query_matches_nothing() -> Result<()> {
    let store = SqliteStorage::open_in_memory()?;
    ReportStore::insert(&store, new_report(ReportType::Csp, json!({"a": 1}))).await?;

    let found = store.query(&ReportQuery::default()).await?;
    assert!(found.is_empty());
    Ok(())
}

#[tokio::test]
async fn log_must_reference_a_stored_report() -> Result<()> {
    let store = SqliteStorage::open_in_memory()?;
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let err = ReportLogStore::insert(
        &store,
        NewReportLog {
            report_id: uuid::Uuid::new_v4(),
            url: "https://example.com/".into(),
            user_agent: "ua".into(),
            triggered: now,
            reported: now,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, "invalid_report_id");
    Ok(())
}

#[tokio::test]
async fn ingester_writes_through_to_sqlite() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(SqliteStorage::open(dir.path().join("reports.db"))?);
    let ingester = ReportIngester::new(store.clone(), store.clone());
    let batch: Vec<ReportEntry> =
        serde_json::from_str(include_str!("resources/reports_batch.json"))?;
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();

    let first = ingester.log_reports_at(&batch, now).await.unwrap();
    let second = ingester.log_reports_at(&batch, now).await.unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);
    // Both submissions share the two canonical reports
    assert_eq!(store.report_count()?, 2);

    let csp = store
        .query(&ReportQuery {
            bodies: vec![canonical_json(&batch[0].body)],
            limit: 100,
        })
        .await?;
    let logs = store.logs_for_report(csp[0].id)?;
    assert_eq!(logs.len(), 4);
    assert_eq!(logs[0].id, first[0]);
    assert_eq!(logs[0].reported, now);
    assert_eq!(logs[0].triggered, now - Duration::seconds(5));
    Ok(())
}
