//! HTTP API: the remote side of the store, plus health checks and metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use tuning_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::StructuredLogger,
    store::{EntryHandle, InMemoryStore, RemoteStore},
    StoreError, WireValue,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub store: Arc<InMemoryStore>,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        store: Arc<InMemoryStore>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            health_registry,
            store,
            logger,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub prefix: Option<String>,
}

/// Body of a remote write
#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub value: WireValue,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Wildcard captures drop the leading separator
fn entry_key(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// List entries, optionally under a key prefix
async fn list_entries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    Json(state.store.entries(query.prefix.as_deref()))
}

async fn get_entry(State(state): State<Arc<AppState>>, Path(path): Path<String>) -> Response {
    let key = entry_key(&path);
    match state.store.snapshot(&key) {
        Some(entry) => Json(entry).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("No entry {}", key)),
    }
}

/// Remote write: listeners run on this request's thread and only queue the value
async fn put_entry(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Json(request): Json<WriteRequest>,
) -> Response {
    let key = entry_key(&path);
    let value = request.value.to_string();

    match state.store.set_value(&EntryHandle::new(&key), request.value) {
        Ok(()) => {
            state.logger.log_remote_write(&key, &value, true);
            match state.store.snapshot(&key) {
                Some(entry) => Json(entry).into_response(),
                None => error_response(StatusCode::NOT_FOUND, format!("No entry {}", key)),
            }
        }
        Err(e) => {
            state.logger.log_remote_write(&key, &value, false);
            let status = match e {
                StoreError::TypeMismatch { .. } => StatusCode::CONFLICT,
                StoreError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            };
            error_response(status, e.to_string())
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/entries", get(list_entries))
        .route("/api/v1/entries/*key", get(get_entry).put(put_entry))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
