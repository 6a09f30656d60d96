//! `OllamaExtractor` against a mock `/api/generate`: timeouts, retries, and
//! how a slow model shows up in a batch run.

mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use project_ingest::config::ModelConfig;
use project_ingest::db;
use project_ingest::llm::{ExtractionError, Extractor, OllamaExtractor};
use project_ingest::migrate;
use project_ingest::models::UpdatePolicy;
use project_ingest::pipeline::{Pipeline, Stage};

use common::write_docx;

#[derive(Clone, Copy)]
enum Behavior {
    /// Documents mentioning "tortoise" take longer than the client timeout.
    SlowTortoise,
    /// 503 on the first call, a normal answer afterwards.
    UnavailableOnce,
    Unavailable,
    NotFound,
}

#[derive(Clone)]
struct MockModel {
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

async fn generate(
    State(model): State<MockModel>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let call = model.calls.fetch_add(1, Ordering::SeqCst);
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();

    let status = match model.behavior {
        Behavior::SlowTortoise => {
            if prompt.contains("tortoise") {
                tokio::time::sleep(Duration::from_secs(4)).await;
            }
            StatusCode::OK
        }
        Behavior::UnavailableOnce if call == 0 => StatusCode::SERVICE_UNAVAILABLE,
        Behavior::UnavailableOnce => StatusCode::OK,
        Behavior::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Behavior::NotFound => StatusCode::NOT_FOUND,
    };
    if !status.is_success() {
        return (status, Json(json!({"error": "model unavailable"})));
    }

    let answer = json!({"project_id": "P-1", "sponsor_name": "Acme"});
    (
        StatusCode::OK,
        Json(json!({"response": answer.to_string(), "done": true})),
    )
}

async fn start_mock_model(behavior: Behavior) -> (SocketAddr, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/api/generate", post(generate))
        .with_state(MockModel {
            behavior,
            calls: calls.clone(),
        });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, calls)
}

fn model_config(addr: SocketAddr, timeout_secs: u64, max_retries: u32) -> ModelConfig {
    ModelConfig {
        url: format!("http://{}", addr),
        timeout_secs,
        max_retries,
        ..ModelConfig::default()
    }
}

#[tokio::test]
async fn timed_out_call_is_a_request_error() {
    let (addr, _) = start_mock_model(Behavior::SlowTortoise).await;
    let extractor = OllamaExtractor::new(&model_config(addr, 1, 0)).unwrap();

    let started = Instant::now();
    let err = extractor.extract("the tortoise protocol").await.unwrap_err();

    assert!(matches!(err, ExtractionError::Request { .. }), "{:?}", err);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn slow_model_fails_one_document_and_the_batch_continues() {
    let (addr, _) = start_mock_model(Behavior::SlowTortoise).await;
    let extractor = OllamaExtractor::new(&model_config(addr, 1, 0)).unwrap();

    let pool = db::connect_memory().await.unwrap();
    migrate::apply(&pool).await.unwrap();
    let dir = TempDir::new().unwrap();
    write_docx(dir.path(), "1-tortoise.docx", "tortoise");
    write_docx(dir.path(), "2-hare.docx", "hare");

    let summary = Pipeline::new(pool, extractor, UpdatePolicy::SkipExisting)
        .run(dir.path())
        .await
        .unwrap();

    assert_eq!(summary.created, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].file, "1-tortoise.docx");
    assert_eq!(summary.failures[0].stage, Stage::Extract);
    assert!(
        summary.failures[0].cause.contains("model request failed"),
        "{}",
        summary.failures[0].cause
    );
}

#[tokio::test]
async fn server_error_is_retried_until_success() {
    let (addr, calls) = start_mock_model(Behavior::UnavailableOnce).await;
    let extractor = OllamaExtractor::new(&model_config(addr, 10, 1)).unwrap();

    let raw = extractor.extract("anything").await.unwrap();

    assert_eq!(raw["project_id"], "P-1");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retries_stop_at_the_configured_limit() {
    let (addr, calls) = start_mock_model(Behavior::Unavailable).await;
    let extractor = OllamaExtractor::new(&model_config(addr, 10, 1)).unwrap();

    let err = extractor.extract("anything").await.unwrap_err();

    assert!(
        matches!(err, ExtractionError::Status { status: 503, .. }),
        "{:?}",
        err
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let (addr, calls) = start_mock_model(Behavior::NotFound).await;
    let extractor = OllamaExtractor::new(&model_config(addr, 10, 3)).unwrap();

    let err = extractor.extract("anything").await.unwrap_err();

    assert!(
        matches!(err, ExtractionError::Status { status: 404, .. }),
        "{:?}",
        err
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn default_config_makes_a_single_attempt() {
    let (addr, calls) = start_mock_model(Behavior::Unavailable).await;
    let config = ModelConfig {
        url: format!("http://{}", addr),
        ..ModelConfig::default()
    };
    let extractor = OllamaExtractor::new(&config).unwrap();

    assert!(extractor.extract("anything").await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
