//! Language model provider trait

use async_trait::async_trait;

use crate::{ChatRequest, ProviderResponse};

/// Chat-completion provider
///
/// Implementations:
/// - `GroqProvider` - Groq cloud API (OpenAI-compatible)
/// - `OllamaProvider` - Local Ollama inference server
///
/// `chat` never returns a Rust error: transport and API failures are reported
/// through [`ProviderResponse::error`].
///
/// # Example
///
/// ```ignore
/// let provider: Arc<dyn LlmProvider> = registry.get("groq")?;
/// let request = ChatRequest::new(vec![Message::system("You are a prospect")], "intent");
/// let response = provider.chat(request).await;
/// ```
#[async_trait]
pub trait LlmProvider: Send + Sync + 'static {
    /// Generate a completion for the given messages
    async fn chat(&self, request: ChatRequest) -> ProviderResponse;

    /// Check if the backend is reachable and the model is loaded
    async fn is_available(&self) -> bool;

    /// Model name for logging and responses
    fn model_name(&self) -> &str;

    /// Registry name of the provider ("groq", "ollama", ...)
    fn provider_name(&self) -> &str;
}
