//! Request schema for report batches.
//!
//! The entry shape is declared once as typed field descriptors, compiled into
//! a draft-7 JSON Schema and checked with `jsonschema` before a batch reaches
//! the ingester.

use crate::constants::BATCH_PARAM;
use crate::domain::{ReportEntry, ReportType};
use jsonschema::{Draft, JSONSchema};
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    String,
    Object,
}

impl FieldKind {
    fn json_type(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::String => "string",
            FieldKind::Object => "object",
        }
    }
}

/// Declares one property of a report entry
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub format: Option<&'static str>,
    pub allowed: Option<&'static [&'static str]>,
    pub required: bool,
}

impl FieldDescriptor {
    fn to_schema(self) -> Value {
        let mut prop = Map::new();
        prop.insert("description".into(), json!(self.description));
        prop.insert("type".into(), json!(self.kind.json_type()));
        if let Some(format) = self.format {
            prop.insert("format".into(), json!(format));
        }
        if let Some(allowed) = self.allowed {
            prop.insert("enum".into(), json!(allowed));
        }
        Value::Object(prop)
    }
}

pub const ENTRY_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "age",
        kind: FieldKind::Integer,
        description: "The number of milliseconds between report timestamp and the current time.",
        format: None,
        allowed: None,
        required: true,
    },
    FieldDescriptor {
        name: "type",
        kind: FieldKind::String,
        description: "The report type.",
        format: None,
        allowed: Some(&ReportType::NAMES),
        required: true,
    },
    FieldDescriptor {
        name: "url",
        kind: FieldKind::String,
        description: "The report URL.",
        format: Some("uri"),
        allowed: None,
        required: true,
    },
    FieldDescriptor {
        name: "user_agent",
        kind: FieldKind::String,
        description: "The report user agent.",
        format: None,
        allowed: None,
        required: true,
    },
    FieldDescriptor {
        name: "body",
        kind: FieldKind::Object,
        description: "The report body.",
        format: None,
        allowed: None,
        required: true,
    },
];

/// JSON Schema of the `data` parameter: an array of report entries
pub fn batch_schema() -> Value {
    let properties: Map<String, Value> = ENTRY_FIELDS
        .iter()
        .map(|f| (f.name.to_string(), f.to_schema()))
        .collect();
    let required: Vec<&str> = ENTRY_FIELDS
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name)
        .collect();

    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "Reporting API batch",
        "description": "List of reports.",
        "type": "array",
        "items": {
            "description": "A single report.",
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

static SCHEMA: Lazy<Value> = Lazy::new(batch_schema);

static COMPILED: Lazy<Result<JSONSchema, String>> = Lazy::new(|| {
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&SCHEMA)
        .map_err(|e| e.to_string())
});

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Missing parameter(s): {0}")]
    MissingParam(&'static str),

    #[error("Invalid parameter(s): {param}")]
    InvalidParam {
        param: &'static str,
        reasons: Vec<String>,
    },
}

impl SchemaError {
    fn invalid(reasons: Vec<String>) -> Self {
        SchemaError::InvalidParam {
            param: BATCH_PARAM,
            reasons,
        }
    }
}

/// Coerce integer fields sent as numeric strings (`"5000"`) into numbers
pub fn sanitize_batch(data: &mut Value) {
    let Some(items) = data.as_array_mut() else {
        return;
    };
    for item in items.iter_mut().filter_map(Value::as_object_mut) {
        for field in ENTRY_FIELDS.iter().filter(|f| f.kind == FieldKind::Integer) {
            let coerced = item
                .get(field.name)
                .and_then(Value::as_str)
                .and_then(|s| s.trim().parse::<i64>().ok());
            if let Some(n) = coerced {
                item.insert(field.name.to_string(), json!(n));
            }
        }
    }
}

/// Check the `data` array against the batch schema
pub fn validate_batch(data: &Value) -> Result<(), SchemaError> {
    let compiled = COMPILED
        .as_ref()
        .map_err(|e| SchemaError::invalid(vec![format!("schema failed to compile: {}", e)]))?;

    compiled.validate(data).map_err(|errors| {
        SchemaError::invalid(
            errors
                .map(|e| format!("{}{} {}", BATCH_PARAM, bracket_path(&e.instance_path.to_string()), e))
                .collect(),
        )
    })
}

/// Extract, sanitize and validate the batch of a parsed request payload
pub fn parse_payload(payload: Value) -> Result<Vec<ReportEntry>, SchemaError> {
    let mut data = match payload {
        Value::Object(mut map) => map
            .remove(BATCH_PARAM)
            .ok_or(SchemaError::MissingParam(BATCH_PARAM))?,
        _ => return Err(SchemaError::MissingParam(BATCH_PARAM)),
    };

    sanitize_batch(&mut data);
    validate_batch(&data)?;
    serde_json::from_value(data).map_err(|e| SchemaError::invalid(vec![e.to_string()]))
}

// "/0/url" -> "[0][url]"
fn bracket_path(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| format!("[{}]", s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_entry() -> Value {
        json!({
            "age": 10,
            "type": "csp",
            "url": "https://example.com/page",
            "user_agent": "Mozilla/5.0",
            "body": {"blocked-uri": "inline"}
        })
    }

    #[test]
    fn schema_lists_every_descriptor() {
        let schema = batch_schema();
        let props = schema["items"]["properties"].as_object().unwrap();
        assert_eq!(props.len(), ENTRY_FIELDS.len());
        assert_eq!(schema["items"]["properties"]["type"]["enum"], json!(ReportType::NAMES));
        assert_eq!(schema["items"]["properties"]["url"]["format"], "uri");
        assert_eq!(schema["items"]["required"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn valid_batch_passes() {
        assert!(validate_batch(&json!([valid_entry()])).is_ok());
        assert!(validate_batch(&json!([])).is_ok());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut entry = valid_entry();
        entry["type"] = json!("network-error");
        let err = validate_batch(&json!([entry])).unwrap_err();
        match err {
            SchemaError::InvalidParam { param, reasons } => {
                assert_eq!(param, "data");
                assert!(reasons[0].starts_with("data[0][type]"), "{:?}", reasons);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn relative_url_is_rejected() {
        let mut entry = valid_entry();
        entry["url"] = json!("not a url");
        assert!(validate_batch(&json!([entry])).is_err());
    }

    #[test]
    fn missing_field_is_rejected() {
        let mut entry = valid_entry();
        entry.as_object_mut().unwrap().remove("user_agent");
        assert!(validate_batch(&json!([entry])).is_err());
    }

    #[test]
    fn numeric_string_age_is_coerced() {
        let mut entry = valid_entry();
        entry["age"] = json!("5000");
        let entries = parse_payload(json!({"data": [entry]})).unwrap();
        assert_eq!(entries[0].age, 5000);
    }

    #[test]
    fn payload_without_data_is_missing_param() {
        assert_eq!(
            parse_payload(json!({"reports": []})).unwrap_err(),
            SchemaError::MissingParam("data")
        );
        assert_eq!(
            parse_payload(json!([valid_entry()])).unwrap_err(),
            SchemaError::MissingParam("data")
        );
    }

    #[test]
    fn bracket_path_formats_pointer() {
        assert_eq!(bracket_path("/0/url"), "[0][url]");
        assert_eq!(bracket_path(""), "");
    }
}
