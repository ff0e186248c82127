//! HTTP query API.
//!
//! Thin axum surface over the query router: one endpoint that accepts a
//! tenant-scoped statement and answers with materialized rows, plus
//! catalog introspection and a health probe. Query execution is
//! blocking by design, so handlers hop onto the blocking pool.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use strata_cluster::QueryRouter;
use strata_query::QueryError;
use strata_store::{RecordStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<QueryRouter>,
    pub store: Arc<dyn RecordStore>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/query", post(execute_query))
        .route("/api/v1/tenants/{tenant_id}/tables", get(list_tables))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct QueryRequest {
    tenant_id: i32,
    query: String,
}

async fn execute_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Response {
    debug!(tenant_id = req.tenant_id, "query received");
    let router = state.router.clone();
    let outcome =
        tokio::task::spawn_blocking(move || router.execute_query(req.tenant_id, &req.query)).await;
    match outcome {
        Ok(Ok(result)) => Json(json!({ "result": result })).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn list_tables(
    State(state): State<AppState>,
    Path(tenant_id): Path<i32>,
) -> Response {
    let store = state.store.clone();
    let outcome = tokio::task::spawn_blocking(move || store.list_tables(tenant_id)).await;
    match outcome {
        Ok(Ok(tables)) => Json(json!({ "tables": tables })).into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

fn error_response(e: QueryError) -> Response {
    let status = match &e {
        QueryError::EngineUnavailable | QueryError::Coordination(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        QueryError::InvalidDefineTable | QueryError::Engine(_) => StatusCode::BAD_REQUEST,
        QueryError::Store(StoreError::TableNotFound { .. })
        | QueryError::Store(StoreError::KeysNotFound { .. }) => StatusCode::NOT_FOUND,
        QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
