//! Signals Configuration
//!
//! Keyword lists and regex patterns for every named signal the detector
//! knows, plus the tunables of the conversation analyzer. Loaded from
//! `signals.yaml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::constants::analyzer;
use crate::ConfigError;

/// Signal categories that must be present before a detector can be built
pub const REQUIRED_SIGNALS: &[&str] = &[
    "commitment",
    "objection",
    "walking",
    "impatience",
    "low_intent",
    "high_intent",
    "guarded",
    "demand_directness",
    "direct_info_requests",
    "soft_positive",
    "validation_phrases",
];

/// Optional signal that primes the session goal once seen
pub const GOAL_STATEMENT: &str = "goal_statement";

/// Signals produced by analyzer heuristics rather than by keyword lists.
/// Flow rules may reference them without a definition in signals.yaml.
pub const DERIVED_SIGNALS: &[&str] = &["impatience", "question_fatigue"];

/// Signals configuration loaded from signals.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// Signal definitions keyed by signal name
    #[serde(default)]
    pub signals: BTreeMap<String, SignalDefinition>,

    /// Cross-turn heuristic tunables
    #[serde(default)]
    pub analyzer: AnalyzerSettings,
}

/// Keywords and patterns for one signal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalDefinition {
    /// Case-insensitive phrases matched on word boundaries
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Regex patterns, compiled case-insensitive
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub description: String,
}

impl SignalDefinition {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.patterns.is_empty()
    }
}

/// Analyzer heuristic tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerSettings {
    /// Prior exchanges inspected by cross-turn heuristics
    #[serde(default = "default_lookback")]
    pub lookback_turns: usize,

    #[serde(default = "default_short_reply_words")]
    pub short_reply_words: usize,

    #[serde(default = "default_short_reply_repeats")]
    pub short_reply_repeats: usize,

    #[serde(default = "default_question_repeats")]
    pub question_repeats: usize,

    /// Fraction of shared words that makes a question a repeat
    #[serde(default = "default_question_overlap")]
    pub question_overlap: f32,

    #[serde(default = "default_shouting_min_words")]
    pub shouting_min_words: usize,
}

fn default_lookback() -> usize {
    analyzer::LOOKBACK_TURNS
}
fn default_short_reply_words() -> usize {
    analyzer::SHORT_REPLY_WORDS
}
fn default_short_reply_repeats() -> usize {
    analyzer::SHORT_REPLY_REPEATS
}
fn default_question_repeats() -> usize {
    analyzer::QUESTION_REPEATS
}
fn default_question_overlap() -> f32 {
    analyzer::QUESTION_OVERLAP
}
fn default_shouting_min_words() -> usize {
    analyzer::SHOUTING_MIN_WORDS
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            lookback_turns: default_lookback(),
            short_reply_words: default_short_reply_words(),
            short_reply_repeats: default_short_reply_repeats(),
            question_repeats: default_question_repeats(),
            question_overlap: default_question_overlap(),
            shouting_min_words: default_shouting_min_words(),
        }
    }
}

impl SignalsConfig {
    /// Load from a YAML file and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = crate::read_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a YAML string and validate
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check required categories and analyzer ranges.
    ///
    /// Pattern compilation is left to the detector, which owns the compiled
    /// regexes and reports `ConfigError::InvalidPattern`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = self.missing_required();
        if !missing.is_empty() {
            return Err(ConfigError::MissingSignals(missing));
        }

        let overlap = self.analyzer.question_overlap;
        if !(0.0..=1.0).contains(&overlap) {
            return Err(ConfigError::InvalidValue {
                field: "analyzer.question_overlap".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", overlap),
            });
        }

        for (name, definition) in &self.signals {
            if definition.is_empty() {
                tracing::warn!(signal = %name, "Signal has no keywords or patterns and never fires");
            }
        }

        Ok(())
    }

    /// Required categories absent from the file, in canonical order
    pub fn missing_required(&self) -> Vec<String> {
        REQUIRED_SIGNALS
            .iter()
            .filter(|name| !self.signals.contains_key(**name))
            .map(|name| name.to_string())
            .collect()
    }

    pub fn get_signal(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.get(name)
    }

    pub fn signal_names(&self) -> impl Iterator<Item = &str> {
        self.signals.keys().map(|k| k.as_str())
    }

    pub fn has_signal(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn full_yaml() -> String {
        let mut yaml = String::from("signals:\n");
        for name in REQUIRED_SIGNALS {
            yaml.push_str(&format!("  {}:\n    keywords: [\"{} word\"]\n", name, name));
        }
        yaml
    }

    #[test]
    fn test_complete_config_loads() {
        let config = SignalsConfig::from_yaml(&full_yaml()).unwrap();
        assert_eq!(config.signals.len(), REQUIRED_SIGNALS.len());
        assert_eq!(config.analyzer.lookback_turns, 3);
        assert!(config.has_signal("walking"));
    }

    #[test]
    fn test_missing_category_fails_fast() {
        let yaml = full_yaml().replace("  guarded:", "  guardedd:");
        let err = SignalsConfig::from_yaml(&yaml).unwrap_err();
        match err {
            ConfigError::MissingSignals(missing) => assert_eq!(missing, vec!["guarded"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_each_required_category_is_checked() {
        for name in REQUIRED_SIGNALS {
            let mut config = SignalsConfig::from_yaml(&full_yaml()).unwrap();
            config.signals.remove(*name);
            assert!(
                matches!(config.validate(), Err(ConfigError::MissingSignals(_))),
                "removing {name} should fail validation"
            );
        }
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let yaml = format!("{}analyzer:\n  question_overlap: 1.5\n", full_yaml());
        assert!(SignalsConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(full_yaml().as_bytes()).unwrap();

        let config = SignalsConfig::load(file.path()).unwrap();
        assert!(config.get_signal("commitment").is_some());
    }

    #[test]
    fn test_missing_file() {
        let err = SignalsConfig::load("/nonexistent/signals.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
