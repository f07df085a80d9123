use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kinds of reports a user agent may deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Csp,
    Deprecation,
    Intervention,
    Crash,
}

impl ReportType {
    pub const ALL: [ReportType; 4] = [
        ReportType::Csp,
        ReportType::Deprecation,
        ReportType::Intervention,
        ReportType::Crash,
    ];

    /// Wire names of [`ReportType::ALL`], in the same order
    pub const NAMES: [&'static str; 4] = ["csp", "deprecation", "intervention", "crash"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Csp => "csp",
            ReportType::Deprecation => "deprecation",
            ReportType::Intervention => "intervention",
            ReportType::Crash => "crash",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown report type '{}'", s))
    }
}

/// Canonical report record, shared by every occurrence with the same type and body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub body: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A report that has not been stored yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub report_type: ReportType,
    pub body: serde_json::Value,
}

/// One occurrence of a report as seen by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportLog {
    pub id: Uuid,
    pub report_id: Uuid,
    pub url: String,
    pub user_agent: String,
    pub triggered: DateTime<Utc>,
    pub reported: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReportLog {
    pub report_id: Uuid,
    pub url: String,
    pub user_agent: String,
    pub triggered: DateTime<Utc>,
    pub reported: DateTime<Utc>,
}

/// A single element of a submitted batch, after schema validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Milliseconds between the event and delivery of the report
    pub age: i64,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub url: String,
    pub user_agent: String,
    pub body: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_type_round_trips_through_lowercase_names() {
        for t in ReportType::ALL {
            assert_eq!(t.as_str().parse::<ReportType>().unwrap(), t);
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
        assert!("network-error".parse::<ReportType>().is_err());
        let names: Vec<&str> = ReportType::ALL.iter().map(ReportType::as_str).collect();
        assert_eq!(names, ReportType::NAMES);
    }

    #[test]
    fn entry_deserializes_wire_field_names() {
        let entry: ReportEntry = serde_json::from_value(json!({
            "age": 12,
            "type": "deprecation",
            "url": "https://example.com/",
            "user_agent": "Mozilla/5.0",
            "body": {"id": "websql"}
        }))
        .unwrap();
        assert_eq!(entry.report_type, ReportType::Deprecation);
        assert_eq!(entry.body["id"], "websql");
    }
}
