//! Shared flow resources
//!
//! The analyzer and the flow catalog are built once from validated
//! configuration and shared by every engine through `Arc`s.

use std::path::Path;
use std::sync::Arc;

use roleplay_config::{ConfigError, FlowSettings, FlowType, FlowsConfig, SignalsConfig};

use crate::analysis::ConversationAnalyzer;
use crate::engine::SalesFlowEngine;
use crate::flow::{FlowCatalog, FlowConfig};

/// Analyzer plus every runtime flow
#[derive(Debug, Clone)]
pub struct FlowResources {
    analyzer: Arc<ConversationAnalyzer>,
    catalog: FlowCatalog,
}

impl FlowResources {
    /// Build from parsed configs. Rules may only name known signals.
    pub fn new(signals: &SignalsConfig, flows: &FlowsConfig) -> Result<Self, ConfigError> {
        flows.check_signal_references(signals)?;
        let analyzer = ConversationAnalyzer::from_config(signals)?;
        let catalog = FlowCatalog::from_config(flows)?;

        tracing::info!(
            flows = ?catalog.flow_types(),
            signals = signals.signals.len(),
            "Flow resources loaded"
        );
        Ok(Self {
            analyzer: Arc::new(analyzer),
            catalog,
        })
    }

    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(signals_path: P, flows_path: Q) -> Result<Self, ConfigError> {
        let signals = SignalsConfig::load(signals_path)?;
        let flows = FlowsConfig::load(flows_path)?;
        Self::new(&signals, &flows)
    }

    pub fn from_settings(settings: &FlowSettings) -> Result<Self, ConfigError> {
        Self::load(&settings.signals_path, &settings.flows_path)
    }

    pub fn analyzer(&self) -> &Arc<ConversationAnalyzer> {
        &self.analyzer
    }

    pub fn catalog(&self) -> &FlowCatalog {
        &self.catalog
    }

    pub fn flow(&self, flow_type: FlowType) -> Result<Arc<FlowConfig>, ConfigError> {
        self.catalog.flow(flow_type)
    }

    /// Fresh engine for `flow_type`
    pub fn engine(&self, flow_type: FlowType) -> Result<SalesFlowEngine, ConfigError> {
        Ok(SalesFlowEngine::new(
            self.flow(flow_type)?,
            Arc::clone(&self.analyzer),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SIGNALS: &str = r#"
signals:
  commitment: { keywords: ["deal"] }
  objection: { keywords: ["too expensive"] }
  walking: { keywords: ["not interested"] }
  impatience: { keywords: ["hurry up"] }
  guarded: { keywords: ["why do you ask"] }
  high_intent: { keywords: ["buy now"] }
  low_intent: { keywords: ["just looking"] }
  demand_directness: { keywords: ["get to the point"] }
  direct_info_requests: { keywords: ["how much"] }
  soft_positive: { keywords: ["sounds good"] }
  validation_phrases: { keywords: ["exactly"] }
"#;

    const FLOWS: &str = r#"
flows:
  consultative:
    stages:
      - name: intent
        prompt: "intent"
        advance:
          jumps:
            - { signal: high_intent, target: pitch }
      - { name: pitch, prompt: "pitch" }
  transactional:
    stages:
      - { name: pitch, prompt: "pitch" }
"#;

    fn file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_and_build_engines() {
        let signals = file(SIGNALS);
        let flows = file(FLOWS);
        let resources = FlowResources::load(signals.path(), flows.path()).unwrap();

        let engine = resources.engine(FlowType::Consultative).unwrap();
        assert_eq!(engine.current_stage(), "intent");
        let engine = resources.engine(FlowType::Transactional).unwrap();
        assert_eq!(engine.current_stage(), "pitch");
    }

    #[test]
    fn test_unknown_signal_reference() {
        let signals = SignalsConfig::from_yaml(SIGNALS).unwrap();
        let flows = FlowsConfig::from_yaml(&FLOWS.replace("high_intent", "telepathy")).unwrap();
        let err = FlowResources::new(&signals, &flows).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSignal { ref signal, .. } if signal == "telepathy"));
    }

    #[test]
    fn test_missing_file() {
        let flows = file(FLOWS);
        let err = FlowResources::load("/nonexistent/signals.yaml", flows.path()).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
