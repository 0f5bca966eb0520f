//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{chat, endpoints, models, paths, timeouts};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// LLM providers
    #[serde(default)]
    pub llm: LlmSettings,

    /// Chat orchestration parameters
    #[serde(default)]
    pub chatbot: ChatbotSettings,

    /// Signal and flow file locations
    #[serde(default)]
    pub flows: FlowSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_chatbot()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.server.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_sessions".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.server.session_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.session_timeout_secs".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.environment.is_strict() && self.server.cors_origins.is_empty() {
            tracing::warn!(
                environment = ?self.environment,
                "server.cors_origins is empty, browser clients will be rejected"
            );
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if self.llm.providers.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.providers".to_string(),
                message: "At least one provider must be configured".to_string(),
            });
        }

        if !self.llm.providers.contains_key(&self.llm.default_provider) {
            return Err(ConfigError::InvalidValue {
                field: "llm.default_provider".to_string(),
                message: format!(
                    "'{}' is not one of the configured providers ({})",
                    self.llm.default_provider,
                    self.llm.provider_names().join(", ")
                ),
            });
        }

        for (name, provider) in &self.llm.providers {
            if provider.endpoint.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("llm.providers.{}.endpoint", name),
                    message: "Endpoint cannot be empty".to_string(),
                });
            }
            if provider.model.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("llm.providers.{}.model", name),
                    message: "Model cannot be empty".to_string(),
                });
            }
            if provider.timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("llm.providers.{}.timeout_secs", name),
                    message: "Must be at least 1".to_string(),
                });
            }
        }

        Ok(())
    }

    fn validate_chatbot(&self) -> Result<(), ConfigError> {
        let chatbot = &self.chatbot;

        if !(0.0..=2.0).contains(&chatbot.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "chatbot.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", chatbot.temperature),
            });
        }

        if chatbot.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chatbot.max_tokens".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        // The window is counted in raw messages and must cover whole exchanges
        if chatbot.history_window == 0 || chatbot.history_window % 2 != 0 {
            return Err(ConfigError::InvalidValue {
                field: "chatbot.history_window".to_string(),
                message: format!(
                    "Must be a positive even number, got {}",
                    chatbot.history_window
                ),
            });
        }

        if chatbot.fallback_message.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "chatbot.fallback_message".to_string(),
                message: "Fallback message cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent roleplay sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle seconds before a session is expired
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_sessions() -> usize {
    500
}
fn default_session_timeout() -> u64 {
    timeouts::SESSION_IDLE_SECS
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
            session_timeout_secs: default_session_timeout(),
            cors_enabled: default_true(),
            // Empty by default, must be configured explicitly outside development
            cors_origins: Vec::new(),
        }
    }
}

/// Which wire protocol a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Groq cloud API (OpenAI-compatible chat completions)
    Groq,
    /// Local Ollama server
    Ollama,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Groq => write!(f, "groq"),
            ProviderKind::Ollama => write!(f, "ollama"),
        }
    }
}

/// One configured provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub kind: ProviderKind,

    /// Base URL of the API
    pub endpoint: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Name of the environment variable holding the API key, if any
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_provider_timeout() -> u64 {
    timeouts::PROVIDER_REQUEST_SECS
}
fn default_max_retries() -> u32 {
    timeouts::PROVIDER_MAX_RETRIES
}
fn default_initial_backoff() -> u64 {
    timeouts::PROVIDER_INITIAL_BACKOFF_MS
}

impl ProviderSettings {
    /// Local Ollama defaults
    pub fn ollama() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            endpoint: endpoints::OLLAMA_DEFAULT.to_string(),
            model: models::OLLAMA_DEFAULT.to_string(),
            api_key_env: None,
            timeout_secs: default_provider_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }

    /// Groq cloud defaults
    pub fn groq() -> Self {
        Self {
            kind: ProviderKind::Groq,
            endpoint: endpoints::GROQ_DEFAULT.to_string(),
            model: models::GROQ_DEFAULT.to_string(),
            api_key_env: Some(models::GROQ_API_KEY_ENV.to_string()),
            timeout_secs: default_provider_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider used for new sessions
    #[serde(default = "default_provider_name")]
    pub default_provider: String,

    /// Providers keyed by registry name
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderSettings>,
}

fn default_provider_name() -> String {
    "ollama".to_string()
}

fn default_providers() -> BTreeMap<String, ProviderSettings> {
    let mut providers = BTreeMap::new();
    providers.insert("ollama".to_string(), ProviderSettings::ollama());
    providers.insert("groq".to_string(), ProviderSettings::groq());
    providers
}

impl LlmSettings {
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            default_provider: default_provider_name(),
            providers: default_providers(),
        }
    }
}

/// Chat orchestration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Trailing raw messages sent with every request
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Bot turn recorded when the provider fails
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

fn default_temperature() -> f32 {
    chat::TEMPERATURE
}
fn default_max_tokens() -> u32 {
    chat::MAX_TOKENS
}
fn default_history_window() -> usize {
    chat::HISTORY_WINDOW
}
fn default_fallback_message() -> String {
    chat::FALLBACK_MESSAGE.to_string()
}

impl Default for ChatbotSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            history_window: default_history_window(),
            fallback_message: default_fallback_message(),
        }
    }
}

/// Where the signal and flow definitions live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSettings {
    #[serde(default = "default_signals_path")]
    pub signals_path: String,

    #[serde(default = "default_flows_path")]
    pub flows_path: String,

    /// Flow type used when a session does not ask for one
    #[serde(default = "default_flow")]
    pub default_flow: String,
}

fn default_signals_path() -> String {
    paths::SIGNALS.to_string()
}
fn default_flows_path() -> String {
    paths::FLOWS.to_string()
}
fn default_flow() -> String {
    "consultative".to_string()
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            signals_path: default_signals_path(),
            flows_path: default_flows_path(),
            default_flow: default_flow(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (ROLEPLAY_ prefix, `__` between levels)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("ROLEPLAY")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.chatbot.history_window, 10);
        assert_eq!(settings.llm.default_provider, "ollama");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_server_validation() {
        let mut settings = Settings::default();

        settings.server.port = 0;
        assert!(settings.validate_server().is_err());
        settings.server.port = 8080;

        settings.server.max_sessions = 0;
        assert!(settings.validate_server().is_err());
        settings.server.max_sessions = 10;

        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn test_chatbot_validation() {
        let mut settings = Settings::default();

        settings.chatbot.temperature = 2.5;
        assert!(settings.validate_chatbot().is_err());
        settings.chatbot.temperature = 0.3;

        settings.chatbot.max_tokens = 0;
        assert!(settings.validate_chatbot().is_err());
        settings.chatbot.max_tokens = 128;

        // Odd windows would split an exchange
        settings.chatbot.history_window = 7;
        assert!(settings.validate_chatbot().is_err());
        settings.chatbot.history_window = 0;
        assert!(settings.validate_chatbot().is_err());
        settings.chatbot.history_window = 6;

        assert!(settings.validate_chatbot().is_ok());
    }

    #[test]
    fn test_unknown_default_provider() {
        let mut settings = Settings::default();
        settings.llm.default_provider = "openai".to_string();

        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "llm.default_provider"));
    }

    #[test]
    fn test_provider_kind_deserialization() {
        let yaml = r#"
kind: groq
endpoint: https://example.test/v1
model: test-model
api_key_env: TEST_KEY
"#;
        let provider: ProviderSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(provider.kind, ProviderKind::Groq);
        assert_eq!(provider.max_retries, timeouts::PROVIDER_MAX_RETRIES);
        assert_eq!(provider.api_key_env.as_deref(), Some("TEST_KEY"));
    }
}
