//! REST surface over the ingest and query engines.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tessera_engine::{EngineError, Engines, IngestBatchRequest, Record, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub engines: Arc<Engines>,
    /// Boundary timeout; expiry cancels the engine future.
    pub request_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/ingest/:tenant", post(ingest_row))
        .route("/api/ingest/batch", post(ingest_batch))
        .route("/api/query/:tenant", post(query))
        .route("/api/query/:tenant/:periodicity", post(query_with_periodicity))
        .with_state(state)
}

async fn ingest_row(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(record): Json<Record>,
) -> Response {
    let outcome = bounded(
        state.request_timeout,
        state.engines.ingest.ingest_row(&tenant, record),
    )
    .await;
    match outcome {
        Ok(()) => Json(json!({"status": "success", "tenant": tenant})).into_response(),
        Err(err) => error_response(err),
    }
}

async fn ingest_batch(
    State(state): State<AppState>,
    Json(request): Json<IngestBatchRequest>,
) -> Response {
    let tenant = request.tenant_id.clone();
    let rows = request.data.len();
    let outcome = bounded(
        state.request_timeout,
        state.engines.ingest.ingest_batch(request),
    )
    .await;
    match outcome {
        Ok(()) => Json(json!({
            "status": "success",
            "tenant": tenant,
            "rows": rows,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

async fn query(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(criteria): Json<Record>,
) -> Response {
    let outcome = bounded(
        state.request_timeout,
        state.engines.query.retrieve(&tenant, criteria),
    )
    .await;
    match outcome {
        Ok(results) => Json(results).into_response(),
        Err(err) => error_response(err),
    }
}

async fn query_with_periodicity(
    State(state): State<AppState>,
    Path((tenant, periodicity)): Path<(String, String)>,
    Json(criteria): Json<Record>,
) -> Response {
    let outcome = bounded(
        state.request_timeout,
        state.engines.query.retrieve_with(&tenant, &periodicity, criteria),
    )
    .await;
    match outcome {
        Ok(results) => Json(results).into_response(),
        Err(err) => error_response(err),
    }
}

/// Runs an engine future under the boundary timeout. Expiry drops the
/// future, cancelling outstanding fan-out work; whatever the store already
/// committed stays committed.
async fn bounded<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Store(StoreError::new(format!(
            "request timed out after {}ms",
            timeout.as_millis()
        )))),
    }
}

fn error_response(err: EngineError) -> Response {
    let status = if err.is_client_error() {
        tracing::warn!(error = %err, "rejected request");
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!(error = %err, "request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({"status": "error", "message": err.to_string()}))).into_response()
}
