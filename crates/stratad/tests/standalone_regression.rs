//! Standalone regression tests.
//!
//! Drives the HTTP API over an in-memory store: define tables, insert,
//! select, catalog introspection, and error mapping.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use strata_cluster::{
    ClusterConfig, ClusterCoordinator, CoordinatorSpec, DisabledMembership, ProcessLauncher,
    QueryRouter, ScanEngineConnector, WorkerSpec, new_shared_engine,
};
use strata_query::{QueryTranslator, UpsertRecordGenerator};
use strata_store::{RecordStore, RedbRecordStore, TableKeyStore};

use stratad::api::{AppState, build_router};

struct NoopLauncher;
impl ProcessLauncher for NoopLauncher {
    fn start_coordinator(&self, _: &CoordinatorSpec) -> Result<(), strata_cluster::ClusterError> {
        Ok(())
    }
    fn start_worker(&self, _: &WorkerSpec) -> Result<(), strata_cluster::ClusterError> {
        Ok(())
    }
}

struct TestEnv {
    app: Router,
    store: Arc<dyn RecordStore>,
    // Dropping the coordinator disarms the engine; keep it alive.
    _coordinator: ClusterCoordinator,
}

fn test_env() -> TestEnv {
    let store: Arc<dyn RecordStore> = Arc::new(RedbRecordStore::open_in_memory().unwrap());
    let keys = TableKeyStore::new(store.clone());
    let engine = new_shared_engine();
    let worker_count = Arc::new(AtomicUsize::new(1));

    let router = Arc::new(QueryRouter::new(
        Arc::new(DisabledMembership),
        engine.clone(),
        store.clone(),
        QueryTranslator::new(store.clone(), keys.clone()),
        UpsertRecordGenerator::new(keys),
        worker_count.clone(),
    ));
    let coordinator = ClusterCoordinator::new(
        ClusterConfig::default(),
        Arc::new(DisabledMembership),
        Arc::new(NoopLauncher),
        Arc::new(ScanEngineConnector),
        engine,
        worker_count,
        router.clone(),
    )
    .unwrap();

    TestEnv {
        app: build_router(AppState {
            router,
            store: store.clone(),
        }),
        store,
        _coordinator: coordinator,
    }
}

fn query_request(tenant_id: i32, query: &str) -> Request<Body> {
    let body = serde_json::to_vec(&json!({ "tenant_id": tenant_id, "query": query })).unwrap();
    Request::builder()
        .method("POST")
        .uri("/api/v1/query")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_ok() {
    let env = test_env();

    let req = Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();

    let resp = env.app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn define_insert_select_round_trip() {
    let env = test_env();

    let resp = env
        .app
        .clone()
        .oneshot(query_request(
            5,
            "DEFINE TABLE orders (id INT, amount INT, PRIMARY KEY (id))",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Seed through the store, then read back over HTTP.
    env.store
        .put(vec![strata_store::Record::new(5, "orders", {
            let mut v = std::collections::HashMap::new();
            v.insert("id".to_string(), json!(1));
            v.insert("amount".to_string(), json!(250));
            v
        })])
        .unwrap();

    let resp = env
        .app
        .oneshot(query_request(5, "SELECT * FROM orders"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["result"]["columns"], json!(["id", "amount"]));
    assert_eq!(body["result"]["rows"], json!([[1, 250]]));
}

#[tokio::test]
async fn statement_without_rows_answers_null_result() {
    let env = test_env();

    let resp = env
        .app
        .oneshot(query_request(5, "DEFINE TABLE orders (id INT)"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert!(body["result"].is_null());
}

#[tokio::test]
async fn malformed_define_is_bad_request() {
    let env = test_env();

    let resp = env
        .app
        .oneshot(query_request(5, "DEFINE TABLE orders missing-parens"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_view_is_bad_request() {
    let env = test_env();

    let resp = env
        .app
        .oneshot(query_request(5, "SELECT * FROM nowhere"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unregistered_insert_target_is_not_found() {
    let env = test_env();

    env.app
        .clone()
        .oneshot(query_request(5, "DEFINE TABLE src (id INT)"))
        .await
        .unwrap();

    let resp = env
        .app
        .oneshot(query_request(5, "INSERT INTO ghost SELECT * FROM src"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_tables_reflects_defines() {
    let env = test_env();

    env.app
        .clone()
        .oneshot(query_request(5, "DEFINE TABLE orders (id INT)"))
        .await
        .unwrap();
    env.app
        .clone()
        .oneshot(query_request(7, "DEFINE TABLE other (id INT)"))
        .await
        .unwrap();

    let req = Request::builder()
        .uri("/api/v1/tenants/5/tables")
        .body(Body::empty())
        .unwrap();
    let resp = env.app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["tables"], json!(["orders"]));
}
