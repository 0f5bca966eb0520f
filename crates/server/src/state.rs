//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use parking_lot::RwLock;

use roleplay_agent::{ChatbotConfig, FlowResources, PerformanceSink, SalesChatbot, TracingSink};
use roleplay_config::{FlowType, Settings};
use roleplay_llm::ProviderRegistry;

use crate::metrics::{record_session_created, PrometheusSink};
use crate::session::{Session, SessionManager};
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Swapped wholesale on flow reload; existing sessions keep their copy
    resources: Arc<RwLock<Arc<FlowResources>>>,
    pub providers: Arc<ProviderRegistry>,
    pub sessions: Arc<SessionManager>,
    sink: Arc<dyn PerformanceSink>,
}

impl AppState {
    pub fn new(settings: Settings, resources: FlowResources, providers: ProviderRegistry) -> Self {
        let sessions = SessionManager::with_config(
            settings.server.max_sessions,
            std::time::Duration::from_secs(settings.server.session_timeout_secs),
            std::time::Duration::from_secs(60),
        );
        let sink: Arc<dyn PerformanceSink> = if settings.observability.metrics_enabled {
            Arc::new(PrometheusSink)
        } else {
            Arc::new(TracingSink)
        };

        Self {
            settings: Arc::new(settings),
            resources: Arc::new(RwLock::new(Arc::new(resources))),
            providers: Arc::new(providers),
            sessions: Arc::new(sessions),
            sink,
        }
    }

    /// Load flow resources and build providers from settings
    pub fn from_settings(settings: Settings) -> Result<Self, ServerError> {
        let resources = FlowResources::from_settings(&settings.flows)?;
        let providers = ProviderRegistry::from_settings(&settings.llm)?;
        Ok(Self::new(settings, resources, providers))
    }

    pub fn with_sink(mut self, sink: Arc<dyn PerformanceSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Resources used for new sessions
    pub fn resources(&self) -> Arc<FlowResources> {
        self.resources.read().clone()
    }

    /// Reload signals and flows from disk. On failure the current resources
    /// stay in place.
    pub fn reload_flows(&self) -> Result<Arc<FlowResources>, ServerError> {
        let reloaded = Arc::new(FlowResources::from_settings(&self.settings.flows)?);
        *self.resources.write() = Arc::clone(&reloaded);
        tracing::info!(
            signals_path = %self.settings.flows.signals_path,
            flows_path = %self.settings.flows.flows_path,
            "Flow configuration reloaded"
        );
        Ok(reloaded)
    }

    /// Flow type named in a request, or the configured default
    pub fn resolve_flow_type(&self, requested: Option<&str>) -> Result<FlowType, ServerError> {
        let name = requested.unwrap_or(&self.settings.flows.default_flow);
        name.parse::<FlowType>()
            .map_err(|_| ServerError::InvalidRequest(format!("Unknown flow type: {}", name)))
    }

    /// Create a session on `flow_type` using the named or default provider
    pub fn create_session(&self, flow_type: FlowType, provider: Option<&str>) -> Result<Arc<Session>, ServerError> {
        let provider = match provider {
            Some(name) => self.providers.get(name)?,
            None => self.providers.default_provider()?,
        };
        let engine = self.resources().engine(flow_type)?;
        let chatbot_settings = &self.settings.chatbot;
        let sink = Arc::clone(&self.sink);

        let session = self.sessions.create(flow_type, |id| {
            SalesChatbot::new(engine, provider, ChatbotConfig::from_settings(id, chatbot_settings))
                .with_sink(sink)
        })?;
        record_session_created(flow_type.as_str());
        Ok(session)
    }

    pub fn session(&self, id: &str) -> Result<Arc<Session>, ServerError> {
        self.sessions
            .get(id)
            .ok_or_else(|| ServerError::SessionNotFound(id.to_string()))
    }
}
