//! Configuration management for the roleplay engine
//!
//! Supports loading configuration from:
//! - YAML files (`config/default.yaml`, `config/{env}.yaml`)
//! - Environment variables (ROLEPLAY_ prefix, `__` separator)
//!
//! # Flow Configuration
//!
//! Conversation behaviour is data-driven and lives next to the settings:
//! - `config/signals.yaml` - keyword lists and regex patterns per signal
//! - `config/flows.yaml` - stage sequences, prompt templates, advancement rules
//!
//! Both files are loaded once at startup and validated before anything
//! downstream is constructed.

pub mod constants;
pub mod flows;
pub mod settings;
pub mod signals;

pub use flows::{
    AdvanceRuleDefinition, FlowDefinition, FlowType, FlowsConfig, JumpDefinition,
    RulePrecedence, StageDefinition, PROMPT_PLACEHOLDERS, fill_template, template_placeholders,
};
pub use settings::{
    load_settings, ChatbotSettings, FlowSettings, LlmSettings, ObservabilityConfig,
    ProviderKind, ProviderSettings, RuntimeEnvironment, ServerConfig, Settings,
};
pub use signals::{
    AnalyzerSettings, SignalDefinition, SignalsConfig, DERIVED_SIGNALS, GOAL_STATEMENT,
    REQUIRED_SIGNALS,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}: {message}")]
    FileNotFound { path: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Missing required signal categories: {}", .0.join(", "))]
    MissingSignals(Vec<String>),

    #[error("Invalid pattern for signal '{signal}': {message}")]
    InvalidPattern { signal: String, message: String },

    #[error("Flow '{0}' has no stages")]
    EmptyStages(String),

    #[error("Flow '{flow}' declares stage '{stage}' more than once")]
    DuplicateStage { flow: String, stage: String },

    #[error("Flow '{flow}' stage '{stage}' jumps to unknown stage '{target}'")]
    DanglingJumpTarget {
        flow: String,
        stage: String,
        target: String,
    },

    #[error("Flow '{flow}' stage '{stage}' uses unknown placeholder '{{{placeholder}}}'")]
    UnknownPlaceholder {
        flow: String,
        stage: String,
        placeholder: String,
    },

    #[error("Flow '{flow}' stage '{stage}' references undefined signal '{signal}'")]
    UnknownSignal {
        flow: String,
        stage: String,
        signal: String,
    },

    #[error("Flow '{0}' is not configured")]
    UnknownFlow(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Read a YAML file into any deserializable config type
pub(crate) fn read_yaml<T, P>(path: P) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<std::path::Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileNotFound {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}
