use crate::ingest::{ErrorItem, ErrorSet};
use crate::schema::SchemaError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// Reasons a report submission is rejected
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid content type.")]
    InvalidContentType,

    #[error("Invalid JSON body passed.")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Request body could not be read: {0}")]
    BodyRead(String),

    #[error("Request body exceeds {limit} bytes.")]
    PayloadTooLarge { limit: usize },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("{} report(s) could not be logged.", .0.len())]
    Ingest(ErrorSet),
}

impl ApiError {
    pub fn code(&self) -> &str {
        match self {
            ApiError::InvalidContentType => "invalid_content_type",
            ApiError::InvalidJson(_) => "rest_invalid_json",
            ApiError::BodyRead(_) => "rest_invalid_body",
            ApiError::PayloadTooLarge { .. } => "rest_request_too_large",
            ApiError::Schema(SchemaError::MissingParam(_)) => "rest_missing_callback_param",
            ApiError::Schema(SchemaError::InvalidParam { .. }) => "rest_invalid_param",
            ApiError::Ingest(set) => set.errors().first().map(|e| e.code.as_str()).unwrap_or("ingest_failed"),
        }
    }

    /// The error in its aggregated response form
    pub fn to_error_set(&self) -> ErrorSet {
        let item = match self {
            ApiError::Ingest(set) => return set.clone(),
            ApiError::InvalidContentType | ApiError::BodyRead(_) => {
                ErrorItem::new(self.code(), self.to_string()).with_status(400)
            }
            ApiError::InvalidJson(e) => ErrorItem::new(self.code(), self.to_string()).with_data(json!({
                "status": 400,
                "json_error_message": e.to_string(),
            })),
            ApiError::PayloadTooLarge { .. } => {
                ErrorItem::new(self.code(), self.to_string()).with_status(413)
            }
            ApiError::Schema(SchemaError::MissingParam(param)) => ErrorItem::new(self.code(), self.to_string())
                .with_data(json!({ "status": 400, "params": [param] })),
            ApiError::Schema(SchemaError::InvalidParam { param, reasons }) => {
                let mut params = serde_json::Map::new();
                params.insert(param.to_string(), json!(reasons.join("; ")));
                ErrorItem::new(self.code(), self.to_string()).with_data(json!({
                    "status": 400,
                    "params": params,
                    "details": reasons,
                }))
            }
        };
        ErrorSet::single(item)
    }

    pub fn status(&self) -> StatusCode {
        status_code(&self.to_error_set())
    }
}

fn status_code(set: &ErrorSet) -> StatusCode {
    StatusCode::from_u16(set.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for ErrorSet {
    fn into_response(self) -> Response {
        (status_code(&self), Json(self)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.to_error_set().into_response()
    }
}
