//! HTTP transport and discovery against a local mock service.

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use roundtrip_core::{
    discover_agent, CallError, DiscoveryError, GenerationBackend, HttpGenerationBackend,
    LoadHarness, RoundTripClient, Target, TargetKind, Verdict,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

async fn generate(Json(body): Json<Value>) -> Json<Value> {
    // Echo the request so tests can check what was sent
    Json(json!({
        "response": format!(
            "{} answered '{}' (stream={})",
            body["model"].as_str().unwrap_or_default(),
            body["prompt"].as_str().unwrap_or_default(),
            body["stream"]
        ),
        "done": true
    }))
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded")
}

async fn garbage() -> &'static str {
    "<html>not json</html>"
}

async fn empty() -> Json<Value> {
    Json(json!({ "response": "" }))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({ "response": "too late" }))
}

async fn agent_send(Json(body): Json<Value>) -> String {
    format!("coder says: {}", body["prompt"].as_str().unwrap_or_default())
}

async fn agent_listing() -> Json<Value> {
    Json(json!([
        { "name": "Reviewer", "id": "r-1" },
        { "name": "Coder", "id": "c-42" }
    ]))
}

async fn reviewer_only_listing() -> Json<Value> {
    Json(json!({ "agents": [{ "name": "Reviewer", "id": "r-1" }] }))
}

async fn spawn_mock_service() -> SocketAddr {
    let app = Router::new()
        .route("/api/generate", post(generate))
        .route("/broken", post(broken))
        .route("/garbage", post(garbage))
        .route("/empty", post(empty))
        .route("/slow", post(slow))
        .route("/agents/", get(agent_listing))
        .route("/agents/c-42/send", post(agent_send))
        .route("/reviewers/", get(reviewer_only_listing));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn backend(timeout: Duration) -> HttpGenerationBackend {
    HttpGenerationBackend::new(timeout).unwrap()
}

#[tokio::test]
async fn test_generate_success() {
    let addr = spawn_mock_service().await;
    let target = Target::generate(format!("http://{}/api/generate", addr), "qwen2.5-coder:7b");

    let payload = backend(Duration::from_secs(5))
        .generate(&target, "Write hello world in Python")
        .await
        .unwrap();

    assert_eq!(
        payload,
        "qwen2.5-coder:7b answered 'Write hello world in Python' (stream=false)"
    );
}

#[tokio::test]
async fn test_error_status() {
    let addr = spawn_mock_service().await;
    let target = Target::generate(format!("http://{}/broken", addr), "m");

    let err = backend(Duration::from_secs(5))
        .generate(&target, "p")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CallError::Status {
            status: 500,
            body: "model not loaded".to_string()
        }
    );
}

#[tokio::test]
async fn test_undecodable_body() {
    let addr = spawn_mock_service().await;
    let target = Target::generate(format!("http://{}/garbage", addr), "m");

    let err = backend(Duration::from_secs(5))
        .generate(&target, "p")
        .await
        .unwrap_err();

    assert!(matches!(err, CallError::Decode(_)));
}

#[tokio::test]
async fn test_empty_output_is_failure() {
    let addr = spawn_mock_service().await;
    let target = Target::generate(format!("http://{}/empty", addr), "m");

    let err = backend(Duration::from_secs(5))
        .generate(&target, "p")
        .await
        .unwrap_err();

    assert_eq!(err, CallError::EmptyResponse);
}

#[tokio::test]
async fn test_call_timeout() {
    let addr = spawn_mock_service().await;
    let target = Target::generate(format!("http://{}/slow", addr), "m");
    let timeout = Duration::from_millis(200);

    let err = backend(timeout).generate(&target, "p").await.unwrap_err();

    assert_eq!(err, CallError::Timeout { after: timeout });
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_connection_refused() {
    // Reserve a port, then free it so nothing is listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let target = Target::generate(format!("http://{}/api/generate", addr), "m");
    let err = backend(Duration::from_secs(5))
        .generate(&target, "p")
        .await
        .unwrap_err();

    assert!(matches!(err, CallError::Transport(_)));
}

#[tokio::test]
async fn test_discover_and_send_to_agent() {
    let addr = spawn_mock_service().await;
    let http = reqwest::Client::new();

    let target = discover_agent(&http, &format!("http://{}/agents", addr), "Coder")
        .await
        .unwrap();

    assert_eq!(target.endpoint, format!("http://{}/agents/c-42/send", addr));
    assert_eq!(target.kind, TargetKind::AgentSend);

    let payload = backend(Duration::from_secs(5))
        .generate(&target, "time.now()")
        .await
        .unwrap();
    assert_eq!(payload, "coder says: time.now()");
}

#[tokio::test]
async fn test_discover_trailing_slash() {
    let addr = spawn_mock_service().await;
    let http = reqwest::Client::new();

    let target = discover_agent(&http, &format!("http://{}/agents/", addr), "Coder")
        .await
        .unwrap();

    assert_eq!(target.endpoint, format!("http://{}/agents/c-42/send", addr));
}

#[tokio::test]
async fn test_discover_missing_role() {
    let addr = spawn_mock_service().await;
    let http = reqwest::Client::new();

    let err = discover_agent(&http, &format!("http://{}/reviewers", addr), "Coder")
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::NotFound { role } if role == "Coder"));
}

#[tokio::test]
async fn test_discover_listing_status() {
    let addr = spawn_mock_service().await;
    let http = reqwest::Client::new();

    let err = discover_agent(&http, &format!("http://{}/nowhere", addr), "Coder")
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::Status(404)));
}

#[tokio::test]
async fn test_harness_over_http() {
    let addr = spawn_mock_service().await;
    let target = Target::generate(format!("http://{}/api/generate", addr), "m");
    let client = RoundTripClient::new(Arc::new(backend(Duration::from_secs(5))));

    let result = LoadHarness::new(Arc::new(client))
        .run(&target, 25, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(result.verdict(), Verdict::Pass);
    assert_eq!(result.success_count(), 25);
}
