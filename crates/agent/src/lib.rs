//! Sales roleplay agent
//!
//! Features:
//! - Keyword and regex signal detection
//! - Heuristic intent and tone analysis
//! - Stage-based flow FSM with direct jumps and rewind-by-replay
//! - Chat orchestration over a pluggable LLM provider
//! - Performance sinks

pub mod analysis;
pub mod chatbot;
pub mod engine;
pub mod flow;
pub mod metrics;
pub mod resources;
pub mod signals;

pub use analysis::{AnalysisRecord, ConversationAnalyzer, IntentStrength, Tone};
pub use chatbot::{ChatbotConfig, SalesChatbot};
pub use engine::{
    EngineError, FlowEngineSnapshot, SalesFlowEngine, StageTransition, TransitionReason,
};
pub use flow::{AdvanceDecision, FlowCatalog, FlowConfig, PromptContext, RuleInput, Stage};
pub use metrics::{NoopSink, PerformanceSink, TracingSink};
pub use resources::FlowResources;
pub use signals::SignalDetector;

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] roleplay_config::ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Performance sink error: {0}")]
    Sink(String),
}

impl From<roleplay_llm::LlmError> for AgentError {
    fn from(err: roleplay_llm::LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}

impl From<AgentError> for roleplay_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Config(e) => roleplay_core::Error::Config(e.to_string()),
            AgentError::Engine(e) => roleplay_core::Error::InvalidState(e.to_string()),
            other => roleplay_core::Error::Llm(other.to_string()),
        }
    }
}
