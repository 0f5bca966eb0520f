//! Groq provider
//!
//! Groq exposes an OpenAI-compatible chat completions API. Requests carry a
//! bearer key read from the environment at construction time.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use roleplay_core::{ChatRequest, LlmProvider, Message, ProviderResponse};

use crate::backend::{check_status, elapsed_ms, HttpProviderConfig};
use crate::LlmError;

/// Groq (OpenAI-compatible) backend
pub struct GroqProvider {
    client: Client,
    config: HttpProviderConfig,
}

impl GroqProvider {
    /// Create a provider. A missing API key is not an error here: the
    /// provider reports itself unavailable and every chat call fails in-band.
    pub fn new(config: HttpProviderConfig) -> Result<Self, LlmError> {
        if config.api_key.is_none() {
            tracing::warn!(provider = %config.name, "No API key configured, provider will be unavailable");
        }
        let client = config.build_client()?;
        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint)
    }

    fn build_headers(&self, api_key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
            headers.insert(AUTHORIZATION, val);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn build_request(&self, request: &ChatRequest) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: request.messages.iter().map(OpenAIMessage::from).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        }
    }

    async fn execute_request(
        &self,
        api_key: &str,
        body: &OpenAIChatRequest,
    ) -> Result<String, LlmError> {
        let response = self
            .client
            .post(self.chat_url())
            .headers(self.build_headers(api_key))
            .json(body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let parsed: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn chat(&self, request: ChatRequest) -> ProviderResponse {
        let start = Instant::now();

        let Some(api_key) = self.config.api_key.as_deref() else {
            return ProviderResponse::failed(
                LlmError::Configuration(format!("{} API key is not set", self.config.name))
                    .to_string(),
                &self.config.model,
                elapsed_ms(start),
            );
        };

        let body = self.build_request(&request);
        let result = self
            .config
            .retry
            .run(&self.config.name, || self.execute_request(api_key, &body))
            .await;

        match result {
            Ok(content) => {
                tracing::debug!(
                    provider = %self.config.name,
                    stage = %request.stage,
                    latency_ms = elapsed_ms(start),
                    "Groq completion"
                );
                ProviderResponse::ok(content, &self.config.model, elapsed_ms(start))
            }
            Err(e) => {
                tracing::warn!(provider = %self.config.name, stage = %request.stage, error = %e, "Groq request failed");
                ProviderResponse::failed(e.to_string(), &self.config.model, elapsed_ms(start))
            }
        }
    }

    async fn is_available(&self) -> bool {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return false;
        };

        self.client
            .get(format!("{}/models", self.config.endpoint))
            .headers(self.build_headers(api_key))
            .timeout(Duration::from_secs(5))
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

// OpenAI-compatible API types

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

impl From<&Message> for OpenAIMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
