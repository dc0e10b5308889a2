use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use batchd::admission::AdmissionController;
use batchd::api::router;
use batchd::api::state::AppState;
use batchd::config::{
    Config, ModelConfig, RetentionConfig, SchedulerConfig, ServerConfig, StorageConfig,
    WebhookConfig,
};
use batchd::gpu::StubGpuProbe;
use batchd::handlers::HandlerRegistry;
use batchd::ledger::Store;
use batchd::model_registry::ModelRegistry;
use batchd::observability::Metrics;
use batchd::storage::StorageClient;
use batchd::webhook::Dispatcher;

fn build_test_app() -> (Router, TempDir) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let store = Arc::new(Store::open(temp_dir.path().join("store")).expect("failed to open store"));
    let storage = StorageClient::in_memory();

    let model_registry = ModelRegistry::new(store.clone());
    model_registry
        .bootstrap(&[ModelConfig {
            name: "gemma-3-4b".to_string(),
            endpoint_url: "http://localhost:11434/v1/chat/completions".to_string(),
            ..Default::default()
        }])
        .unwrap();

    let registry = Arc::new(HandlerRegistry::with_defaults());
    let gpu_probe = Arc::new(StubGpuProbe::healthy());
    let metrics = Arc::new(Metrics::new());
    let config = Config {
        server: ServerConfig::default(),
        storage: StorageConfig::default(),
        scheduler: SchedulerConfig::default(),
        webhook: WebhookConfig::default(),
        retention: RetentionConfig::default(),
        models: Vec::new(),
    };

    let admission = Arc::new(AdmissionController::new(
        store.clone(),
        storage.clone(),
        model_registry.clone(),
        registry.clone(),
        gpu_probe.clone(),
        config.scheduler.clone(),
    ));

    let webhook_store = store.clone();
    let dispatcher = Arc::new(Dispatcher::new(
        webhook_store,
        config.webhook.clone(),
        metrics.clone(),
    ));

    let state = AppState::new(
        config,
        (*registry).clone(),
        store,
        storage,
        model_registry,
        admission,
        dispatcher,
        metrics,
        gpu_probe,
        "worker-test",
    );

    (router(state), temp_dir)
}

fn multipart_body(boundary: &str, contents: &str, purpose: &str) -> Body {
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"input.jsonl\"\r\n\
         Content-Type: application/jsonl\r\n\r\n\
         {contents}\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"purpose\"\r\n\r\n\
         {purpose}\r\n\
         --{boundary}--\r\n"
    );
    Body::from(body)
}

fn upload_request(contents: &str, purpose: &str) -> Request<Body> {
    let boundary = "batchdtestboundary";
    Request::builder()
        .uri("/v1/files")
        .method("POST")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(multipart_body(boundary, contents, purpose))
        .unwrap()
}

fn sample_jsonl() -> String {
    let line = json!({
        "custom_id": "req-1",
        "method": "POST",
        "url": "/v1/chat/completions",
        "body": {
            "model": "gemma-3-4b",
            "messages": [{"role": "user", "content": "hello"}]
        }
    });
    format!("{line}\n")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn upload_file_then_create_batch() {
    let (app, _dir) = build_test_app();

    let upload = upload_request(&sample_jsonl(), "input");
    let upload_response = app.clone().oneshot(upload).await.unwrap();
    assert_eq!(upload_response.status(), StatusCode::OK);
    let file = body_json(upload_response).await;
    let file_id = file["id"].as_str().unwrap().to_string();
    assert_eq!(file["purpose"], "input");

    let batch_body = json!({
        "input_file_id": file_id,
        "endpoint": "/v1/chat/completions",
        "model": "gemma-3-4b",
    });
    let create_request = Request::builder()
        .uri("/v1/batches")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&batch_body).unwrap()))
        .unwrap();

    let create_response = app.clone().oneshot(create_request).await.unwrap();
    assert_eq!(create_response.status(), StatusCode::OK);
    let batch = body_json(create_response).await;
    assert_eq!(batch["status"], "validating");
    assert_eq!(batch["request_counts"]["total"], 1);
    let batch_id = batch["id"].as_str().unwrap().to_string();

    let get_request = Request::builder()
        .uri(format!("/v1/batches/{batch_id}"))
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let get_response = app.oneshot(get_request).await.unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);
    let fetched = body_json(get_response).await;
    assert_eq!(fetched["id"], batch_id);
}

#[tokio::test]
async fn create_batch_rejects_unknown_model() {
    let (app, _dir) = build_test_app();

    let upload = upload_request(&sample_jsonl(), "input");
    let upload_response = app.clone().oneshot(upload).await.unwrap();
    let file = body_json(upload_response).await;
    let file_id = file["id"].as_str().unwrap().to_string();

    let batch_body = json!({
        "input_file_id": file_id,
        "endpoint": "/v1/chat/completions",
        "model": "does-not-exist",
    });
    let create_request = Request::builder()
        .uri("/v1/batches")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&batch_body).unwrap()))
        .unwrap();

    let response = app.oneshot(create_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_batch_not_found() {
    let (app, _dir) = build_test_app();

    let request = Request::builder()
        .uri("/v1/batches/batch_nonexistent")
        .method("GET")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_validating_batch_succeeds_immediately() {
    let (app, _dir) = build_test_app();

    let upload = upload_request(&sample_jsonl(), "input");
    let upload_response = app.clone().oneshot(upload).await.unwrap();
    let file = body_json(upload_response).await;
    let file_id = file["id"].as_str().unwrap().to_string();

    let batch_body = json!({
        "input_file_id": file_id,
        "endpoint": "/v1/chat/completions",
        "model": "gemma-3-4b",
    });
    let create_request = Request::builder()
        .uri("/v1/batches")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&batch_body).unwrap()))
        .unwrap();
    let create_response = app.clone().oneshot(create_request).await.unwrap();
    let batch = body_json(create_response).await;
    let batch_id = batch["id"].as_str().unwrap().to_string();

    let cancel_request = Request::builder()
        .uri(format!("/v1/batches/{batch_id}"))
        .method("DELETE")
        .body(Body::empty())
        .unwrap();
    let cancel_response = app.clone().oneshot(cancel_request).await.unwrap();
    assert_eq!(cancel_response.status(), StatusCode::OK);
    let cancelled = body_json(cancel_response).await;
    assert_eq!(cancelled["status"], "cancelled");

    let second_cancel = Request::builder()
        .uri(format!("/v1/batches/{batch_id}"))
        .method("DELETE")
        .body(Body::empty())
        .unwrap();
    let second_response = app.oneshot(second_cancel).await.unwrap();
    assert_eq!(second_response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn list_models_returns_bootstrapped_model() {
    let (app, _dir) = build_test_app();

    let request = Request::builder()
        .uri("/v1/models")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["id"], "gemma-3-4b");
}

#[tokio::test]
async fn health_endpoint_reports_queue_and_gpu() {
    let (app, _dir) = build_test_app();

    let request = Request::builder()
        .uri("/health")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let body = body_json(response).await;

    assert!(body.get("gpu").is_some());
    assert!(body.get("worker").is_some());
    assert!(body.get("queue").is_some());
    assert_eq!(body["gpu"]["temperature_c"], 45.0);
}

#[tokio::test]
async fn get_file_content_round_trips_uploaded_bytes() {
    let (app, _dir) = build_test_app();

    let contents = sample_jsonl();
    let upload = upload_request(&contents, "input");
    let upload_response = app.clone().oneshot(upload).await.unwrap();
    let file = body_json(upload_response).await;
    let file_id = file["id"].as_str().unwrap().to_string();

    let get_request = Request::builder()
        .uri(format!("/v1/files/{file_id}/content"))
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(get_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes, contents.as_bytes());
}
