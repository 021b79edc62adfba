//! Router tests driven through tower::ServiceExt

use aios_agents::{Coordinator, CoordinatorSettings, Oracle, Scout, Worker};
use aios_gateway::{router, AppState};
use aios_llm::{MockBehavior, MockProvider};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;

const LONG_CALL: &str =
    "    response = client.submit_request(payload_builder(first_value, second_value), retries=3)";
const FIXED_CALL: &str = "    response = client.submit_request(\n        payload_builder(first_value, second_value), retries=3)";

fn app() -> axum::Router {
    let worker = Arc::new(MockProvider::constant(MockBehavior::text(FIXED_CALL)).named("ollama", "mistral:7b"));
    let oracle = Arc::new(
        MockProvider::constant(MockBehavior::text(
            r#"{"decision": "APPROVE", "confidence": 0.9, "semantic_preserved": true}"#,
        ))
        .named("gemini", "gemini-2.5-flash"),
    );
    let coordinator = Coordinator::new(
        Scout::new(None),
        Some(Worker::new(worker)),
        Some(Oracle::new(oracle)),
        CoordinatorSettings::default(),
    );
    router(Arc::new(AppState::new(Arc::new(coordinator))))
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_status_and_version() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["uptime_secs"].is_u64());
    // Worker, oracle, fallback; the scout has no model here.
    assert_eq!(body["tiers_configured"], 3);
}

#[tokio::test]
async fn tools_lists_tiers() {
    let response = app()
        .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    let tiers = body["tiers"].as_array().unwrap();
    assert_eq!(tiers.len(), 4);
    assert_eq!(tiers[0]["tier"], "scout");
    assert_eq!(tiers[0]["configured"], false);
    assert_eq!(tiers[1]["model"], "mistral:7b");
    assert_eq!(tiers[2]["provider"], "gemini");
}

#[tokio::test]
async fn categories_cover_every_signal() {
    let response = app()
        .oneshot(Request::builder().uri("/categories").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    let categories = body["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 10);
    assert!(categories
        .iter()
        .any(|c| c["signal_type"] == "E501_COMMENT" && c["route"] == "fallback"));
}

#[tokio::test]
async fn process_fixes_a_line() {
    let response = app()
        .oneshot(post_json(
            "/process",
            serde_json::json!({ "line": LONG_CALL, "file": "app.py", "line_number": 7 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["resolution"], "agent");
    assert_eq!(body["fixed"], FIXED_CALL);
    assert_eq!(body["trace"].as_array().unwrap().last().unwrap(), "DONE");
}

#[tokio::test]
async fn process_short_line_is_unchanged() {
    let response = app()
        .oneshot(post_json("/process", serde_json::json!({ "line": "x = 1" })))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["resolution"], "unchanged");
    assert_eq!(body["fixed"], "x = 1");
}

#[tokio::test]
async fn process_rejects_empty_line() {
    let response = app()
        .oneshot(post_json("/process", serde_json::json!({ "line": "   " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn process_rejects_missing_line_field() {
    let response = app()
        .oneshot(post_json("/process", serde_json::json!({ "file": "a.py" })))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
