//! Provider Factory and Registry
//!
//! Creates providers from settings and keeps them keyed by registry name so
//! sessions can pick or switch providers by name.
//!
//! ## Example
//! ```ignore
//! let registry = ProviderRegistry::from_settings(&settings.llm)?;
//! let provider = registry.default_provider();
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use roleplay_config::{LlmSettings, ProviderKind, ProviderSettings};
use roleplay_core::LlmProvider;

use crate::backend::HttpProviderConfig;
use crate::{GroqProvider, LlmError, OllamaProvider};

/// Create a provider from its settings
pub fn create_provider(
    name: &str,
    settings: &ProviderSettings,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let config = HttpProviderConfig::from_settings(name, settings);

    let provider: Arc<dyn LlmProvider> = match settings.kind {
        ProviderKind::Groq => Arc::new(GroqProvider::new(config)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(config)?),
    };

    tracing::info!(
        provider = name,
        kind = %settings.kind,
        model = %settings.model,
        "Created LLM provider"
    );
    Ok(provider)
}

/// Providers keyed by name
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
    default_name: String,
}

impl ProviderRegistry {
    /// Empty registry whose default is `default_name`
    pub fn new(default_name: impl Into<String>) -> Self {
        Self {
            providers: BTreeMap::new(),
            default_name: default_name.into(),
        }
    }

    /// Build every configured provider
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        let mut registry = Self::new(&settings.default_provider);
        for (name, provider_settings) in &settings.providers {
            registry.register(name.clone(), create_provider(name, provider_settings)?);
        }

        if !registry.contains(&settings.default_provider) {
            return Err(LlmError::ProviderNotFound(settings.default_provider.clone()));
        }
        Ok(registry)
    }

    /// Add or replace a provider
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn LlmProvider>, LlmError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::ProviderNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn default_provider(&self) -> Result<Arc<dyn LlmProvider>, LlmError> {
        self.get(&self.default_name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_from_default_settings() {
        let registry = ProviderRegistry::from_settings(&LlmSettings::default()).unwrap();
        assert_eq!(registry.names(), vec!["groq", "ollama"]);
        assert_eq!(registry.default_name(), "ollama");

        let provider = registry.default_provider().unwrap();
        assert_eq!(provider.provider_name(), "ollama");
    }

    #[test]
    fn test_unknown_provider() {
        let registry = ProviderRegistry::from_settings(&LlmSettings::default()).unwrap();
        assert!(matches!(
            registry.get("openai"),
            Err(LlmError::ProviderNotFound(ref name)) if name == "openai"
        ));
    }

    #[test]
    fn test_missing_default_rejected() {
        let mut settings = LlmSettings::default();
        settings.default_provider = "missing".to_string();
        assert!(ProviderRegistry::from_settings(&settings).is_err());
    }

    #[test]
    fn test_create_provider_kinds() {
        let groq = create_provider("cloud", &ProviderSettings::groq()).unwrap();
        assert_eq!(groq.provider_name(), "cloud");

        let ollama = create_provider("local", &ProviderSettings::ollama()).unwrap();
        assert_eq!(ollama.model_name(), ProviderSettings::ollama().model);
    }
}
