//! HTTP API tests against the shipped flow configuration

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use roleplay_agent::FlowResources;
use roleplay_config::Settings;
use roleplay_core::{ChatRequest, LlmProvider, ProviderResponse};
use roleplay_llm::ProviderRegistry;
use roleplay_server::{create_router, AppState};

struct MockProvider {
    name: &'static str,
    available: bool,
    reply: Option<&'static str>,
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn chat(&self, _request: ChatRequest) -> ProviderResponse {
        match self.reply {
            Some(text) => ProviderResponse::ok(text, "mock-1", 3.0),
            None => ProviderResponse::failed("HTTP 503: unavailable", "mock-1", 3.0),
        }
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    fn model_name(&self) -> &str {
        "mock-1"
    }

    fn provider_name(&self) -> &str {
        self.name
    }
}

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config")
}

fn settings(max_sessions: usize) -> Settings {
    let mut settings = Settings::default();
    settings.server.max_sessions = max_sessions;
    settings.llm.default_provider = "mock".to_string();
    settings.flows.signals_path = config_dir().join("signals.yaml").display().to_string();
    settings.flows.flows_path = config_dir().join("flows.yaml").display().to_string();
    settings
}

fn app_with(max_sessions: usize) -> Router {
    let settings = settings(max_sessions);
    let resources = FlowResources::from_settings(&settings.flows).unwrap();

    let mut providers = ProviderRegistry::new("mock");
    providers.register(
        "mock",
        Arc::new(MockProvider { name: "mock", available: true, reply: Some("Tell me more about that.") }),
    );
    providers.register(
        "backup",
        Arc::new(MockProvider { name: "backup", available: true, reply: Some("Backup here.") }),
    );
    providers.register(
        "broken",
        Arc::new(MockProvider { name: "broken", available: true, reply: None }),
    );
    providers.register(
        "offline",
        Arc::new(MockProvider { name: "offline", available: false, reply: None }),
    );

    create_router(AppState::new(settings, resources, providers))
}

fn app() -> Router {
    app_with(10)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create(app: &Router, body: Value) -> String {
    let (status, value) = send(app, Method::POST, "/api/sessions", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    value["session_id"].as_str().unwrap().to_string()
}

async fn chat(app: &Router, id: &str, message: &str) -> (StatusCode, Value) {
    send(app, Method::POST, &format!("/api/chat/{}", id), Some(json!({ "message": message }))).await
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, value) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "healthy");
    assert_eq!(value["sessions"], 0);
    assert_eq!(value["default_provider"], "mock");
    assert!(value["providers"].as_array().unwrap().contains(&json!("backup")));
}

#[tokio::test]
async fn test_ready_probes_default_provider() {
    let app = app();
    let (status, value) = send(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["checks"]["llm_provider"]["name"], "mock");
}

#[tokio::test]
async fn test_create_session_defaults() {
    let app = app();
    let (status, value) = send(&app, Method::POST, "/api/sessions", Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(value["flow_type"], "consultative");
    assert_eq!(value["stage"], "intent");
    assert_eq!(value["provider"], "mock");
    assert_eq!(value["model"], "mock-1");

    let (_, listed) = send(&app, Method::GET, "/api/sessions", None).await;
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["sessions"][0], value["session_id"]);
}

#[tokio::test]
async fn test_create_session_with_flow_and_provider() {
    let app = app();
    let (status, value) = send(
        &app,
        Method::POST,
        "/api/sessions",
        Some(json!({ "flow_type": "transactional", "provider": "backup" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(value["stage"], "pitch");
    assert_eq!(value["provider"], "backup");
}

#[tokio::test]
async fn test_create_session_rejects_unknowns() {
    let app = app();
    let (status, value) =
        send(&app, Method::POST, "/api/sessions", Some(json!({ "flow_type": "hard-sell" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(value["error"].as_str().unwrap().contains("hard-sell"));

    let (status, _) =
        send(&app, Method::POST, "/api/sessions", Some(json!({ "provider": "openai" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_limit() {
    let app = app_with(1);
    create(&app, json!({})).await;
    let (status, _) = send(&app, Method::POST, "/api/sessions", Some(json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_chat_and_jump() {
    let app = app();
    let id = create(&app, json!({})).await;

    let (status, value) = chat(&app, &id, "Hi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["content"], "Tell me more about that.");
    assert_eq!(value["stage"], "intent");
    assert_eq!(value["fallback"], false);

    let (_, value) = chat(&app, &id, "I definitely want to buy this now").await;
    assert_eq!(value["stage"], "pitch");

    let (status, info) = send(&app, Method::GET, &format!("/api/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["session_id"], id.as_str());
    assert_eq!(info["current_stage"], "pitch");
    assert_eq!(info["turn_count"], 2);
    assert_eq!(info["history"].as_array().unwrap().len(), 4);
    assert_eq!(info["transitions"][0]["to"], "pitch");
    assert_eq!(info["transitions"][0]["reason"], "jump");
}

#[tokio::test]
async fn test_chat_rejects_bad_input() {
    let app = app();
    let id = create(&app, json!({})).await;

    let (status, _) = chat(&app, &id, "   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = chat(&app, "no-such-session", "Hi").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_provider_failure_returns_fallback() {
    let app = app();
    let id = create(&app, json!({ "provider": "broken" })).await;

    let (status, value) = chat(&app, &id, "Hi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["fallback"], true);
    assert_eq!(value["provider"], "broken");
}

#[tokio::test]
async fn test_rewind() {
    let app = app();
    let id = create(&app, json!({})).await;
    for message in ["Hi", "We run a bakery", "We have five staff"] {
        chat(&app, &id, message).await;
    }

    let uri = format!("/api/sessions/{}/rewind", id);
    let (status, value) = send(&app, Method::POST, &uri, Some(json!({ "turn_index": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["success"], true);
    assert_eq!(value["snapshot"]["turn_count"], 1);
    assert_eq!(value["snapshot"]["current_stage"], "intent");

    let (_, value) = send(&app, Method::POST, &uri, Some(json!({ "turn_index": 5 }))).await;
    assert_eq!(value["success"], false);
    assert_eq!(value["snapshot"]["turn_count"], 1);
}

#[tokio::test]
async fn test_switch_provider() {
    let app = app();
    let id = create(&app, json!({})).await;
    let uri = format!("/api/sessions/{}/provider", id);

    let (status, value) = send(&app, Method::POST, &uri, Some(json!({ "provider": "backup" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["provider"], "backup");

    let (_, value) = chat(&app, &id, "Hi").await;
    assert_eq!(value["content"], "Backup here.");

    let (status, _) = send(&app, Method::POST, &uri, Some(json!({ "provider": "offline" }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&app, Method::POST, &uri, Some(json!({ "provider": "openai" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_session() {
    let app = app();
    let id = create(&app, json!({})).await;
    let uri = format!("/api/sessions/{}", id);

    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reload_flows() {
    let app = app();
    let (status, value) = send(&app, Method::POST, "/admin/reload-flows", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "success");
    assert_eq!(value["flows"], json!(["consultative", "transactional"]));
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let app = app();
    let (status, _) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
