//! HTTP Endpoints
//!
//! REST API for roleplay sessions.

use std::time::Duration;

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use roleplay_agent::FlowEngineSnapshot;
use roleplay_core::ChatResponse;

use crate::metrics::{metrics_handler, record_fallback, record_transition};
use crate::state::AppState;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.settings.server.cors_origins,
        state.settings.server.cors_enabled,
    );

    Router::new()
        // Sessions
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/rewind", post(rewind_session))
        .route("/api/sessions/:id/provider", post(switch_provider))
        // Chat
        .route("/api/chat/:id", post(chat))
        // Health
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        // Admin
        .route("/admin/reload-flows", post(reload_flows))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// CORS from configured origins.
///
/// Disabled CORS is permissive; an empty or unparseable origin list falls
/// back to localhost:3000.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];
    if parsed_origins.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:3000"))
            .allow_methods(methods)
            .allow_headers(Any);
    }

    tracing::info!(origins = parsed_origins.len(), "CORS configured");
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods(methods)
        .allow_headers(Any)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateSessionRequest {
    flow_type: Option<String>,
    provider: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_id: String,
    flow_type: String,
    stage: String,
    provider: String,
    model: String,
}

/// Create a roleplay session
async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ServerError> {
    let flow_type = state.resolve_flow_type(request.flow_type.as_deref())?;
    let session = state.create_session(flow_type, request.provider.as_deref())?;

    let bot = session.chatbot.lock().await;
    let response = CreateSessionResponse {
        session_id: session.id.clone(),
        flow_type: flow_type.to_string(),
        stage: bot.engine().current_stage().to_string(),
        provider: bot.provider().provider_name().to_string(),
        model: bot.provider().model_name().to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

#[derive(Debug, Serialize)]
struct SessionInfo {
    session_id: String,
    provider: String,
    model: String,
    idle_secs: u64,
    #[serde(flatten)]
    snapshot: FlowEngineSnapshot,
}

/// Engine snapshot of a session
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, ServerError> {
    let session = state.session(&id)?;
    let bot = session.chatbot.lock().await;

    Ok(Json(SessionInfo {
        session_id: session.id.clone(),
        provider: bot.provider().provider_name().to_string(),
        model: bot.provider().model_name().to_string(),
        idle_secs: session.idle_for().as_secs(),
        snapshot: bot.snapshot(),
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::SessionNotFound(id))
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

/// One roleplay exchange
async fn chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ServerError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ServerError::InvalidRequest("Message cannot be empty".to_string()));
    }

    let session = state.session(&id)?;
    session.touch();

    let mut bot = session.chatbot.lock().await;
    let transitions_before = bot.engine().transitions().len();
    let response = bot.chat(message).await;

    if response.fallback {
        record_fallback(&response.provider);
    }
    for transition in &bot.engine().transitions()[transitions_before..] {
        record_transition(session.flow_type.as_str(), &transition.from, &transition.to);
    }

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct RewindRequest {
    turn_index: usize,
}

#[derive(Debug, Serialize)]
struct RewindResponse {
    success: bool,
    snapshot: FlowEngineSnapshot,
}

/// Rebuild the session as it was after `turn_index` exchanges
async fn rewind_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RewindRequest>,
) -> Result<Json<RewindResponse>, ServerError> {
    let session = state.session(&id)?;
    session.touch();

    let mut bot = session.chatbot.lock().await;
    let success = bot.rewind_to_turn(request.turn_index);
    Ok(Json(RewindResponse {
        success,
        snapshot: bot.snapshot(),
    }))
}

#[derive(Debug, Deserialize)]
struct SwitchProviderRequest {
    provider: String,
}

async fn switch_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SwitchProviderRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let session = state.session(&id)?;
    let provider = state.providers.get(&request.provider)?;

    let mut bot = session.chatbot.lock().await;
    bot.switch_provider(provider).await?;

    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "provider": bot.provider().provider_name(),
        "model": bot.provider().model_name(),
    })))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.count(),
        "providers": state.providers.names(),
        "default_provider": state.providers.default_name(),
    }))
}

/// Ready when the default provider answers its availability probe
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let (status, provider) = match state.providers.default_provider() {
        Ok(provider) => {
            let available = tokio::time::timeout(Duration::from_secs(2), provider.is_available())
                .await
                .unwrap_or(false);
            let status = if available { "ok" } else { "unreachable" };
            (status, provider.provider_name().to_string())
        }
        Err(_) => ("missing", state.providers.default_name().to_string()),
    };

    let ready = status == "ok";
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": {
                "llm_provider": { "name": provider, "status": status }
            }
        })),
    )
}

/// Reload signals and flows from disk. Existing sessions keep the flows
/// they were created with.
async fn reload_flows(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload_flows() {
        Ok(resources) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "flows": resources.catalog().flow_types(),
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Flow reload failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "error",
                    "message": e.to_string(),
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;

    #[test]
    fn test_router_creation() {
        let _ = create_router(test_state());
    }

    #[test]
    fn test_cors_layers() {
        let _ = build_cors_layer(&[], true);
        let _ = build_cors_layer(&["not a header\n".to_string()], true);
        let _ = build_cors_layer(&["http://example.com".to_string()], true);
        let _ = build_cors_layer(&[], false);
    }
}
