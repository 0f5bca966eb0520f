//! Chatbot Orchestrator
//!
//! One roleplay session: renders the stage prompt, calls the provider,
//! records the exchange and lets the engine decide whether to advance.
//! `chat` never fails. Provider errors, empty replies and panics inside the
//! provider call all turn into the configured fallback reply.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;

use roleplay_config::ChatbotSettings;
use roleplay_core::{ChatRequest, ChatResponse, LlmProvider, Message, PerformanceSample};

use crate::engine::{FlowEngineSnapshot, SalesFlowEngine};
use crate::metrics::{PerformanceSink, TracingSink};
use crate::AgentError;

/// Per-session chat parameters
#[derive(Debug, Clone)]
pub struct ChatbotConfig {
    pub session_id: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Trailing raw messages sent with each request
    pub history_window: usize,
    pub fallback_message: String,
}

impl ChatbotConfig {
    pub fn from_settings(session_id: impl Into<String>, settings: &ChatbotSettings) -> Self {
        Self {
            session_id: session_id.into(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            history_window: settings.history_window,
            fallback_message: settings.fallback_message.clone(),
        }
    }
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self::from_settings("local", &ChatbotSettings::default())
    }
}

/// Outcome of the provider call
struct Reply {
    content: String,
    model: String,
    fallback: bool,
}

/// Sales roleplay chatbot
pub struct SalesChatbot {
    config: ChatbotConfig,
    engine: SalesFlowEngine,
    provider: Arc<dyn LlmProvider>,
    sink: Arc<dyn PerformanceSink>,
}

impl SalesChatbot {
    pub fn new(engine: SalesFlowEngine, provider: Arc<dyn LlmProvider>, config: ChatbotConfig) -> Self {
        tracing::info!(
            session_id = %config.session_id,
            flow = %engine.flow().flow_type,
            provider = %provider.provider_name(),
            "Chatbot created"
        );
        Self {
            config,
            engine,
            provider,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PerformanceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &ChatbotConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn engine(&self) -> &SalesFlowEngine {
        &self.engine
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn snapshot(&self) -> FlowEngineSnapshot {
        self.engine.snapshot()
    }

    /// Process one user message and return the bot reply
    pub async fn chat(&mut self, user_message: &str) -> ChatResponse {
        let stage = self.engine.current_stage().to_string();
        let system_prompt = self.engine.current_prompt(user_message);
        let request = ChatRequest::new(self.build_messages(system_prompt, user_message), stage.clone())
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);
        let input_len = request.input_len();

        let started = Instant::now();
        let reply = self.call_provider(request).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        // Fallback replies are recorded like any other so turn counting stays aligned
        self.engine.add_turn(user_message, reply.content.clone());
        let decision = self.engine.should_advance(user_message);
        tracing::debug!(
            session_id = %self.config.session_id,
            stage = %stage,
            decision = ?decision,
            "Advancement decision"
        );
        if let Err(e) = self.engine.apply(&decision) {
            tracing::error!(session_id = %self.config.session_id, error = %e, "Failed to apply decision");
        }

        let output_len = reply.content.chars().count();
        let sample = PerformanceSample {
            session_id: self.config.session_id.clone(),
            stage: stage.clone(),
            strategy: self.engine.flow().flow_type.to_string(),
            latency_ms,
            provider: self.provider.provider_name().to_string(),
            model: reply.model.clone(),
            input_len,
            output_len,
            recorded_at: chrono::Utc::now(),
        };
        if let Err(e) = self.sink.record(&sample) {
            tracing::debug!(error = %e, "Performance sink rejected sample");
        }

        ChatResponse {
            content: reply.content,
            latency_ms,
            provider: sample.provider,
            model: reply.model,
            input_len,
            output_len,
            stage: self.engine.current_stage().to_string(),
            fallback: reply.fallback,
        }
    }

    async fn call_provider(&self, request: ChatRequest) -> Reply {
        let provider = Arc::clone(&self.provider);
        let outcome = AssertUnwindSafe(provider.chat(request)).catch_unwind().await;

        match outcome {
            Ok(response) if response.is_usable() => Reply {
                content: response.content,
                model: response.model,
                fallback: false,
            },
            Ok(response) => {
                tracing::warn!(
                    session_id = %self.config.session_id,
                    provider = %self.provider.provider_name(),
                    error = response.error.as_deref().unwrap_or("empty response"),
                    "Provider call failed, using fallback"
                );
                let model = if response.model.is_empty() {
                    self.provider.model_name().to_string()
                } else {
                    response.model
                };
                self.fallback_reply(model)
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(
                    session_id = %self.config.session_id,
                    provider = %self.provider.provider_name(),
                    panic = %message,
                    "Provider call panicked, using fallback"
                );
                self.fallback_reply(self.provider.model_name().to_string())
            }
        }
    }

    fn fallback_reply(&self, model: String) -> Reply {
        Reply {
            content: self.config.fallback_message.clone(),
            model,
            fallback: true,
        }
    }

    /// System prompt, trailing history window, then the new user message
    fn build_messages(&self, system_prompt: String, user_message: &str) -> Vec<Message> {
        let history = self.engine.history();
        let start = history.len().saturating_sub(self.config.history_window);

        let mut messages = Vec::with_capacity(history.len() - start + 2);
        messages.push(Message::system(system_prompt));
        messages.extend(history[start..].iter().map(Message::from));
        messages.push(Message::user(user_message));
        messages
    }

    /// Replace the provider for subsequent turns. Unreachable providers are
    /// refused and the current one is kept.
    pub async fn switch_provider(&mut self, provider: Arc<dyn LlmProvider>) -> Result<(), AgentError> {
        if !provider.is_available().await {
            return Err(AgentError::ProviderUnavailable(provider.provider_name().to_string()));
        }
        tracing::info!(
            session_id = %self.config.session_id,
            from = %self.provider.provider_name(),
            to = %provider.provider_name(),
            "Switched provider"
        );
        self.provider = provider;
        Ok(())
    }

    pub fn rewind_to_turn(&mut self, turn_index: usize) -> bool {
        self.engine.rewind_to_turn(turn_index)
    }

    /// Start the roleplay over
    pub fn reset(&mut self) {
        self.engine.reset();
        tracing::info!(session_id = %self.config.session_id, "Conversation reset");
    }
}
