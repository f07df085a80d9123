pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

use crate::domain::{NewReport, NewReportLog, Report, ReportLog};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Code of the error a store returns when (type, body) is already stored
pub const REPORT_EXISTS: &str = "report_exists";

/// Error returned by a store; code, message and data are surfaced to clients as-is
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct StoreError {
    pub code: String,
    pub message: String,
    pub data: Option<Value>,
}

impl StoreError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Lookup of existing reports by canonical body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportQuery {
    /// Canonical JSON serializations of the bodies to match
    pub bodies: Vec<String>,
    pub limit: usize,
}

/// Canonical report records, deduplicated by (type, body)
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn query(&self, query: &ReportQuery) -> Result<Vec<Report>, StoreError>;
    async fn insert(&self, report: NewReport) -> Result<Report, StoreError>;
}

/// Per-occurrence log rows
#[async_trait]
pub trait ReportLogStore: Send + Sync {
    async fn insert(&self, log: NewReportLog) -> Result<ReportLog, StoreError>;
}
