use crate::storage::StoreError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// Why a single batch entry produced no log
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntryError {
    #[error("Empty report body.")]
    EmptyReportBody,

    #[error("Report age is out of range.")]
    AgeOutOfRange { age: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EntryError {
    pub fn code(&self) -> &str {
        match self {
            EntryError::EmptyReportBody => "empty_report_body",
            EntryError::AgeOutOfRange { .. } => "invalid_report_age",
            EntryError::Store(e) => e.code.as_str(),
        }
    }

    pub fn data(&self) -> Option<Value> {
        match self {
            EntryError::EmptyReportBody => None,
            EntryError::AgeOutOfRange { age } => Some(json!({ "status": 400, "age": age })),
            EntryError::Store(e) => e.data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Logged(Uuid),
    Failed(EntryError),
}

/// Ordered per-entry outcomes of one batch call
#[derive(Debug, Default)]
pub struct BatchResult {
    outcomes: Vec<EntryOutcome>,
}

impl BatchResult {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, outcome: EntryOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[EntryOutcome] {
        &self.outcomes
    }

    pub fn logged_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, EntryOutcome::Logged(_)))
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.outcomes.len() - self.logged_count()
    }

    /// Collapses the outcomes into the response shape.
    ///
    /// Any failure turns the whole batch into an error set; ids of entries
    /// that were stored successfully are dropped from the response.
    pub fn into_response(self) -> Result<Vec<Uuid>, ErrorSet> {
        let mut ids = Vec::with_capacity(self.outcomes.len());
        let mut errors = ErrorSet::default();
        for outcome in self.outcomes {
            match outcome {
                EntryOutcome::Logged(id) => ids.push(id),
                EntryOutcome::Failed(err) => errors.push(err.into()),
            }
        }
        if errors.is_empty() {
            Ok(ids)
        } else {
            Err(errors)
        }
    }
}

/// A single error in the aggregated response
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ErrorItem {
    pub code: String,
    pub message: String,
    pub data: Option<Value>,
}

impl ErrorItem {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        match self.data {
            Some(Value::Object(ref mut map)) => {
                map.insert("status".to_string(), json!(status));
            }
            _ => self.data = Some(json!({ "status": status })),
        }
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn status(&self) -> Option<u16> {
        self.data
            .as_ref()
            .and_then(|d| d.get("status"))
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
    }
}

impl From<EntryError> for ErrorItem {
    fn from(err: EntryError) -> Self {
        ErrorItem {
            code: err.code().to_string(),
            message: err.to_string(),
            data: err.data(),
        }
    }
}

/// Aggregated errors of a rejected request.
///
/// Serializes as the first error's `code`/`message`/`data`, with every other
/// error listed under `additional_errors`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorSet {
    errors: Vec<ErrorItem>,
}

impl ErrorSet {
    pub const DEFAULT_STATUS: u16 = 500;

    pub fn single(item: ErrorItem) -> Self {
        Self { errors: vec![item] }
    }

    pub fn push(&mut self, item: ErrorItem) {
        self.errors.push(item);
    }

    pub fn errors(&self) -> &[ErrorItem] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn codes(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.code.as_str()).collect()
    }

    /// HTTP status of the first error, 500 when it carries none
    pub fn status(&self) -> u16 {
        self.errors
            .first()
            .and_then(ErrorItem::status)
            .unwrap_or(Self::DEFAULT_STATUS)
    }
}

impl Serialize for ErrorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Some((first, rest)) = self.errors.split_first() else {
            return serializer.serialize_map(Some(0))?.end();
        };
        let len = if rest.is_empty() { 3 } else { 4 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("code", &first.code)?;
        map.serialize_entry("message", &first.message)?;
        map.serialize_entry("data", &first.data)?;
        if !rest.is_empty() {
            map.serialize_entry("additional_errors", rest)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_logged_yields_ids_in_order() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut result = BatchResult::default();
        for id in &ids {
            result.push(EntryOutcome::Logged(*id));
        }
        assert_eq!(result.into_response().unwrap(), ids);
    }

    #[test]
    fn any_failure_discards_ids() {
        let mut result = BatchResult::default();
        result.push(EntryOutcome::Logged(Uuid::new_v4()));
        result.push(EntryOutcome::Failed(EntryError::EmptyReportBody));
        result.push(EntryOutcome::Logged(Uuid::new_v4()));
        assert_eq!(result.logged_count(), 2);
        assert_eq!(result.error_count(), 1);

        let errors = result.into_response().unwrap_err();
        assert_eq!(errors.codes(), vec!["empty_report_body"]);
        assert_eq!(errors.status(), 500);
    }

    #[test]
    fn store_errors_keep_code_message_and_data() {
        let err = EntryError::from(
            StoreError::new("db_insert_error", "Could not insert.").with_data(json!({"status": 503})),
        );
        let item = ErrorItem::from(err);
        assert_eq!(item.code, "db_insert_error");
        assert_eq!(item.message, "Could not insert.");
        assert_eq!(item.status(), Some(503));
    }

    #[test]
    fn out_of_range_age_is_a_client_error() {
        let item = ErrorItem::from(EntryError::AgeOutOfRange { age: i64::MAX });
        assert_eq!(item.code, "invalid_report_age");
        assert_eq!(item.status(), Some(400));
        assert_eq!(item.data.unwrap()["age"], json!(i64::MAX));
    }

    #[test]
    fn serializes_first_error_with_additional_errors() {
        let mut set = ErrorSet::single(ErrorItem::new("empty_report_body", "Empty report body."));
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            json!({"code": "empty_report_body", "message": "Empty report body.", "data": null})
        );

        set.push(ErrorItem::new("report_exists", "Exists.").with_status(409));
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            json!({
                "code": "empty_report_body",
                "message": "Empty report body.",
                "data": null,
                "additional_errors": [
                    {"code": "report_exists", "message": "Exists.", "data": {"status": 409}}
                ]
            })
        );
    }

    #[test]
    fn with_status_merges_into_existing_data() {
        let item = ErrorItem::new("rest_invalid_param", "Invalid parameter(s): data")
            .with_data(json!({"params": {"data": "bad"}}))
            .with_status(400);
        assert_eq!(
            item.data,
            Some(json!({"params": {"data": "bad"}, "status": 400}))
        );
    }
}
