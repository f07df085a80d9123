use crate::constants::{REPORTING_ROUTE, REPORTS_MEDIA_TYPE};
use crate::error::Result;
use crate::ingest::ReportIngester;
use crate::metrics;
use crate::normalize::{declared_media_type, normalize_request, ReportsMarker};
use crate::response::ApiError;
use crate::schema;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::body::HttpBody;
use hyper::Server;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub ingester: Arc<ReportIngester>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(ingester: Arc<ReportIngester>, max_body_bytes: usize) -> Self {
        Self {
            ingester,
            max_body_bytes,
        }
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "reporting-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_handler() -> Response {
    match metrics::render() {
        Some(body) => body.into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Buffer the body and rewrite reports submissions before the handler runs
async fn normalize_reports(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next<Body>,
) -> Response {
    let (mut parts, body) = req.into_parts();
    let bytes = match read_body(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("Rejecting report request: {}", err);
            return err.into_response();
        }
    };

    let normalized = normalize_request(std::mem::take(&mut parts.headers), bytes);
    parts.headers = normalized.headers;
    if let Some(marker) = normalized.marker {
        debug!(
            original = marker.original_content_type(),
            "Normalized reports submission"
        );
        parts.extensions.insert(marker);
    }

    next.run(Request::from_parts(parts, Body::from(normalized.body)))
        .await
}

async fn read_body(mut body: Body, limit: usize) -> std::result::Result<Bytes, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|e| ApiError::BodyRead(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

async fn log_reports(
    State(state): State<AppState>,
    marker: Option<Extension<ReportsMarker>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let marker = marker.map(|Extension(m)| m);
    match accept_batch(&state.ingester, &headers, marker, &body).await {
        Ok(ids) => Json(ids).into_response(),
        Err(err) => {
            info!(code = err.code(), status = %err.status(), "Report batch rejected");
            err.into_response()
        }
    }
}

/// Gate, parse, validate and ingest one submission.
///
/// `headers` and `body` are expected post-normalization; plain JSON is only
/// accepted together with a marker.
pub async fn accept_batch(
    ingester: &ReportIngester,
    headers: &HeaderMap,
    marker: Option<ReportsMarker>,
    body: &[u8],
) -> std::result::Result<Vec<Uuid>, ApiError> {
    let declared = declared_media_type(headers);
    if marker.is_none() && declared.as_deref() != Some(REPORTS_MEDIA_TYPE) {
        return Err(ApiError::InvalidContentType);
    }

    let payload: Value = serde_json::from_slice(body).map_err(ApiError::InvalidJson)?;
    let batch = schema::parse_payload(payload)?;
    ingester.log_reports(&batch).await.map_err(ApiError::Ingest)
}

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        // The middleware enforces max_body_bytes on the raw body; the rewrapped
        // body handed to the extractor may be slightly larger
        .route(
            REPORTING_ROUTE,
            post(log_reports).layer(DefaultBodyLimit::disable()),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            normalize_reports,
        ))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the router on `addr` until ctrl-c
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = create_router(state);

    info!("HTTP server listening on http://{}", addr);
    info!("Reports endpoint: http://{}{}", addr, REPORTING_ROUTE);
    info!("Health check:     http://{}/health", addr);

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
