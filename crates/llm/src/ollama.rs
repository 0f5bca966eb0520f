//! Ollama provider
//!
//! Talks to a local Ollama server through `/api/chat` with streaming
//! disabled. The model is kept warm between turns via `keep_alive`.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use roleplay_core::{ChatRequest, LlmProvider, Message, ProviderResponse};

use crate::backend::{check_status, elapsed_ms, HttpProviderConfig};
use crate::LlmError;

const KEEP_ALIVE: &str = "5m";

/// Ollama backend
#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
    config: HttpProviderConfig,
}

impl OllamaProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, LlmError> {
        let client = config.build_client()?;
        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    fn build_request(&self, request: &ChatRequest) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens as i32,
            },
            keep_alive: KEEP_ALIVE.to_string(),
        }
    }

    async fn execute_request(&self, body: &OllamaChatRequest) -> Result<String, LlmError> {
        let response = self.client.post(self.api_url("/chat")).json(body).send().await?;
        let response = check_status(response).await?;

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(parsed.message.content)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn chat(&self, request: ChatRequest) -> ProviderResponse {
        let start = Instant::now();
        let body = self.build_request(&request);

        let result = self
            .config
            .retry
            .run(&self.config.name, || self.execute_request(&body))
            .await;

        match result {
            Ok(content) => {
                tracing::debug!(
                    provider = %self.config.name,
                    stage = %request.stage,
                    latency_ms = elapsed_ms(start),
                    "Ollama completion"
                );
                ProviderResponse::ok(content, &self.config.model, elapsed_ms(start))
            }
            Err(e) => {
                tracing::warn!(provider = %self.config.name, stage = %request.stage, error = %e, "Ollama request failed");
                ProviderResponse::failed(e.to_string(), &self.config.model, elapsed_ms(start))
            }
        }
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn provider_name(&self) -> &str {
        &self.config.name
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
    keep_alive: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use roleplay_config::ProviderSettings;

    fn provider() -> OllamaProvider {
        let config = HttpProviderConfig::from_settings("ollama", &ProviderSettings::ollama());
        OllamaProvider::new(config).unwrap()
    }

    #[test]
    fn test_message_conversion() {
        let msg: OllamaMessage = (&Message::assistant("Hello")).into();
        assert_eq!(msg.role, "assistant");
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest::new(vec![Message::system("sys"), Message::user("hi")], "intent")
            .with_max_tokens(64);
        let body = provider().build_request(&request);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 64);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["keep_alive"], "5m");
    }

    #[test]
    fn test_names() {
        let provider = provider();
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.model_name(), ProviderSettings::ollama().model);
        assert_eq!(provider.api_url("/chat"), "http://localhost:11434/api/chat");
    }
}
