//! LLM providers for the roleplay engine
//!
//! Features:
//! - Groq cloud API (OpenAI-compatible chat completions)
//! - Local Ollama server
//! - Retry with exponential backoff for transient failures
//! - Name-keyed provider registry built from settings

pub mod backend;
pub mod factory;
pub mod groq;
pub mod ollama;

pub use backend::{HttpProviderConfig, RetryPolicy};
pub use factory::{create_provider, ProviderRegistry};
pub use groq::GroqProvider;
pub use ollama::OllamaProvider;

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for roleplay_core::Error {
    fn from(err: LlmError) -> Self {
        roleplay_core::Error::Llm(err.to_string())
    }
}
