use crate::canonical::canonical_json;
use crate::domain::{Report, ReportEntry, ReportType};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Composite identity of a report: `type:canonical-body`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(report_type: ReportType, body: &Value) -> Self {
        DedupKey(format!("{}:{}", report_type, canonical_json(body)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reports known to the current batch call, keyed by [`DedupKey`].
///
/// Seeded from the store before the batch runs and extended with every report
/// the batch creates, so repeated entries inside one batch share a report.
#[derive(Debug, Default)]
pub struct DedupIndex {
    reports: HashMap<DedupKey, Report>,
}

impl DedupIndex {
    pub fn from_reports(reports: impl IntoIterator<Item = Report>) -> Self {
        let mut index = Self::default();
        for report in reports {
            index.insert(report);
        }
        index
    }

    pub fn get(&self, key: &DedupKey) -> Option<&Report> {
        self.reports.get(key)
    }

    pub fn insert(&mut self, report: Report) {
        let key = DedupKey::new(report.report_type, &report.body);
        self.reports.insert(key, report);
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

/// Whether a body carries nothing worth storing.
///
/// `null`, `false`, `0`, `""`, `"0"`, `[]` and `{}` all count as empty.
pub fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Distinct canonical bodies of the batch's non-empty entries, in first-seen order
pub fn candidate_bodies(batch: &[ReportEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    batch
        .iter()
        .filter(|e| !is_empty_body(&e.body))
        .map(|e| canonical_json(&e.body))
        .filter(|b| seen.insert(b.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn entry(report_type: ReportType, body: Value) -> ReportEntry {
        ReportEntry {
            age: 0,
            report_type,
            url: "https://example.com/".into(),
            user_agent: "ua".into(),
            body,
        }
    }

    #[test]
    fn key_includes_type() {
        let body = json!({"id": "x"});
        assert_ne!(
            DedupKey::new(ReportType::Csp, &body),
            DedupKey::new(ReportType::Deprecation, &body)
        );
        assert_eq!(DedupKey::new(ReportType::Csp, &body).as_str(), r#"csp:{"id":"x"}"#);
    }

    #[test]
    fn index_resolves_reports_by_key() {
        let report = Report {
            id: Uuid::new_v4(),
            report_type: ReportType::Intervention,
            body: json!({"b": 2, "a": 1}),
            created_at: Utc::now(),
        };
        let index = DedupIndex::from_reports(vec![report.clone()]);
        let key = DedupKey::new(ReportType::Intervention, &json!({"a": 1, "b": 2}));
        assert_eq!(index.get(&key).map(|r| r.id), Some(report.id));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn falsy_bodies_are_empty() {
        for body in [json!(null), json!({}), json!([]), json!(""), json!(false), json!(0)] {
            assert!(is_empty_body(&body), "{} should be empty", body);
        }
        assert!(!is_empty_body(&json!({"k": null})));
    }

    #[test]
    fn candidate_bodies_skip_empty_and_repeated_bodies() {
        let batch = vec![
            entry(ReportType::Csp, json!({"a": 1})),
            entry(ReportType::Crash, json!({})),
            entry(ReportType::Deprecation, json!({"a": 1})),
            entry(ReportType::Csp, json!({"b": 1})),
        ];
        assert_eq!(candidate_bodies(&batch), vec![r#"{"a":1}"#, r#"{"b":1}"#]);
    }
}
