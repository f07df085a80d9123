//! Request normalization for `application/reports+json` submissions.
//!
//! Browsers deliver report batches with the reports media type and a bare
//! JSON array as body. The rest of the request pipeline only speaks
//! `application/json` with a keyed object, so the request is rewritten once,
//! before it reaches a handler.

use crate::constants::{BATCH_PARAM, JSON_MEDIA_TYPE, REPORTS_MEDIA_TYPE};
use axum::body::Bytes;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use serde_json::{Map, Value};

/// Records that a request originally declared the reports media type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportsMarker;

impl ReportsMarker {
    pub fn original_content_type(&self) -> &'static str {
        REPORTS_MEDIA_TYPE
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
    pub marker: Option<ReportsMarker>,
}

/// Media type of a `Content-Type` value, lowercased and without parameters
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Declared media type of a request, if any
pub fn declared_media_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(media_type)
}

pub fn is_reports_media_type(headers: &HeaderMap) -> bool {
    declared_media_type(headers).as_deref() == Some(REPORTS_MEDIA_TYPE)
}

/// Rewrite a reports submission into a plain JSON request.
///
/// Requests with any other content type come back untouched and without a
/// marker, so normalizing an already normalized request is a no-op.
pub fn normalize_request(headers: HeaderMap, body: Bytes) -> NormalizedRequest {
    if !is_reports_media_type(&headers) {
        return NormalizedRequest {
            headers,
            body,
            marker: None,
        };
    }

    let mut headers = headers;
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MEDIA_TYPE));

    let body = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Array(items)) => {
            let mut wrapped = Map::new();
            wrapped.insert(BATCH_PARAM.to_string(), Value::Array(items));
            let bytes = Bytes::from(Value::Object(wrapped).to_string());
            headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            bytes
        }
        _ => body,
    };

    NormalizedRequest {
        headers,
        body,
        marker: Some(ReportsMarker),
    }
}
