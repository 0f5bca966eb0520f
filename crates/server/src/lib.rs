//! Sales Roleplay Server
//!
//! HTTP surface over the roleplay flow engine: session lifecycle, chat,
//! rewind, provider switching, flow reload and Prometheus metrics.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;

pub use http::create_router;
pub use metrics::{init_metrics, PrometheusSink};
pub use session::{Session, SessionManager};
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use roleplay_agent::AgentError;
use roleplay_config::ConfigError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Maximum number of sessions reached ({0})")]
    SessionLimit(usize),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::SessionLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        err.status()
    }
}

impl From<AgentError> for ServerError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::ProviderUnavailable(name) => ServerError::ProviderUnavailable(name),
            AgentError::Config(e) => ServerError::Config(e),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<roleplay_llm::LlmError> for ServerError {
    fn from(err: roleplay_llm::LlmError) -> Self {
        match err {
            roleplay_llm::LlmError::ProviderNotFound(name) => {
                ServerError::InvalidRequest(format!("Unknown provider: {}", name))
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StatusCode::from(ServerError::SessionNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            StatusCode::from(ServerError::InvalidRequest("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            StatusCode::from(ServerError::ProviderUnavailable("groq".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            StatusCode::from(ServerError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_agent_error_conversion() {
        let err = ServerError::from(AgentError::ProviderUnavailable("groq".into()));
        assert!(matches!(err, ServerError::ProviderUnavailable(ref n) if n == "groq"));

        let err = ServerError::from(roleplay_llm::LlmError::ProviderNotFound("openai".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
