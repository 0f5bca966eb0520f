//! LLM request/response types
//!
//! Common types exchanged with language model providers (Groq, Ollama, ...)
//! and the value objects the chatbot hands back to its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::{Turn, TurnRole};

/// Message role as understood by chat-completion APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            TurnRole::User => Message::user(turn.content.clone()),
            TurnRole::Bot => Message::assistant(turn.content.clone()),
        }
    }
}

/// Request handed to an [`LlmProvider`](crate::traits::LlmProvider)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Messages for chat completion, system prompt first
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Stage name, for provider-side logging
    pub stage: String,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>, stage: impl Into<String>) -> Self {
        Self {
            messages,
            temperature: 0.7,
            max_tokens: 256,
            stage: stage.into(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Total characters across all messages
    pub fn input_len(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

/// Provider reply. Failures travel in `error` rather than as a Rust error so
/// callers can treat every provider uniformly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub model: String,
    pub latency_ms: f64,
}

impl ProviderResponse {
    /// Successful completion
    pub fn ok(content: impl Into<String>, model: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            content: content.into(),
            error: None,
            model: model.into(),
            latency_ms,
        }
    }

    /// Failed completion
    pub fn failed(error: impl Into<String>, model: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            content: String::new(),
            error: Some(error.into()),
            model: model.into(),
            latency_ms,
        }
    }

    /// True when the reply is usable as a bot turn
    pub fn is_usable(&self) -> bool {
        self.error.is_none() && !self.content.trim().is_empty()
    }
}

/// Result of one `chat()` call, returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub latency_ms: f64,
    pub provider: String,
    pub model: String,
    /// Characters sent to the provider
    pub input_len: usize,
    /// Characters in `content`
    pub output_len: usize,
    /// Stage after the turn was processed
    pub stage: String,
    /// True when `content` is the fallback apology
    #[serde(default)]
    pub fallback: bool,
}

/// One latency observation for the performance sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub session_id: String,
    pub stage: String,
    /// Flow type driving the session
    pub strategy: String,
    pub latency_ms: f64,
    pub provider: String,
    pub model: String,
    pub input_len: usize,
    pub output_len: usize,
    pub recorded_at: DateTime<Utc>,
}
