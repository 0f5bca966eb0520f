//! Flow Configuration
//!
//! Declarative description of each roleplay flow: ordered stages, prompt
//! templates and advancement rules. Loaded from `flows.yaml`.
//!
//! ```yaml
//! flows:
//!   consultative:
//!     product_context: "..."
//!     stages:
//!       - name: intent
//!         prompt: "You are a prospect... {product_context}"
//!         advance:
//!           min_turns: 2
//!           any_of: [soft_positive]
//!           jumps:
//!             - { signal: high_intent, target: pitch }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;

use crate::signals::{SignalsConfig, DERIVED_SIGNALS};
use crate::ConfigError;

/// Placeholders every stage template may use
pub const PROMPT_PLACEHOLDERS: &[&str] = &[
    "product_context",
    "current_user_message",
    "stage",
    "stage_turn",
    "tone",
    "intent",
    "signals",
    "goal_primed",
    "tone_guidance",
];

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid"));

/// Extract `{name}` placeholders from a template, in order of appearance
pub fn template_placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Replace every `{name}` with `lookup(name)`. Placeholders the lookup does
/// not know are left verbatim. Substituted values are not rescanned.
pub fn fill_template<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Flow types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowType {
    /// Discovery-led selling: intent, logic, emotion, pitch
    Consultative,
    /// Short price-and-terms oriented flow
    Transactional,
}

impl FlowType {
    pub const ALL: [FlowType; 2] = [FlowType::Consultative, FlowType::Transactional];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowType::Consultative => "consultative",
            FlowType::Transactional => "transactional",
        }
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "consultative" => Ok(FlowType::Consultative),
            "transactional" => Ok(FlowType::Transactional),
            other => Err(ConfigError::UnknownFlow(other.to_string())),
        }
    }
}

/// Which rule family wins when both fire on the same turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePrecedence {
    /// Direct jumps are checked before the sequential threshold
    #[default]
    JumpsFirst,
    /// A satisfied sequential threshold beats any jump
    ThresholdFirst,
}

/// Direct jump from a detected signal to a named stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpDefinition {
    pub signal: String,
    pub target: String,
}

/// Advancement rule of a stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceRuleDefinition {
    /// Exchanges required in the stage before a sequential advance
    #[serde(default = "default_min_turns")]
    pub min_turns: u32,

    /// Exchanges after which the stage advances regardless of signals
    #[serde(default)]
    pub max_turns: Option<u32>,

    /// At least one of these must fire (empty: no signal needed)
    #[serde(default)]
    pub any_of: Vec<String>,

    /// None of these may fire
    #[serde(default)]
    pub none_of: Vec<String>,

    /// Sequential advance waits for the goal-primed latch
    #[serde(default)]
    pub requires_goal_primed: bool,

    /// Direct jumps, earliest declared wins
    #[serde(default)]
    pub jumps: Vec<JumpDefinition>,

    #[serde(default)]
    pub precedence: RulePrecedence,
}

fn default_min_turns() -> u32 {
    1
}

impl Default for AdvanceRuleDefinition {
    fn default() -> Self {
        Self {
            min_turns: default_min_turns(),
            max_turns: None,
            any_of: Vec::new(),
            none_of: Vec::new(),
            requires_goal_primed: false,
            jumps: Vec::new(),
            precedence: RulePrecedence::default(),
        }
    }
}

impl AdvanceRuleDefinition {
    /// Every signal name the rule mentions
    pub fn referenced_signals(&self) -> impl Iterator<Item = &str> {
        self.any_of
            .iter()
            .chain(self.none_of.iter())
            .map(|s| s.as_str())
            .chain(self.jumps.iter().map(|j| j.signal.as_str()))
    }
}

/// One stage of a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,

    /// Prompt template with `{placeholder}` slots
    pub prompt: String,

    /// Stage-specific slot values, usable as extra placeholders
    #[serde(default)]
    pub slots: BTreeMap<String, String>,

    #[serde(default)]
    pub advance: AdvanceRuleDefinition,
}

/// One flow as written in the YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Business knowledge injected into every prompt
    #[serde(default)]
    pub product_context: String,

    /// Text prepended to every rendered prompt
    #[serde(default)]
    pub persona: String,

    /// Guidance text keyed by tone name (`neutral`, `impatient`, ...)
    #[serde(default)]
    pub tone_guidance: BTreeMap<String, String>,

    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

/// flows.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowsConfig {
    #[serde(default)]
    pub flows: BTreeMap<FlowType, FlowDefinition>,
}

impl FlowsConfig {
    /// Load from a YAML file and validate structure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = crate::read_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a YAML string and validate structure
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn get(&self, flow_type: FlowType) -> Option<&FlowDefinition> {
        self.flows.get(&flow_type)
    }

    /// Structural validation of every flow. All flow types must be present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for flow_type in FlowType::ALL {
            let flow = self
                .flows
                .get(&flow_type)
                .ok_or_else(|| ConfigError::UnknownFlow(flow_type.to_string()))?;
            validate_flow(flow_type, flow)?;
        }
        Ok(())
    }

    /// Every signal named by a rule must be defined in signals.yaml or be
    /// produced by the analyzer.
    pub fn check_signal_references(&self, signals: &SignalsConfig) -> Result<(), ConfigError> {
        for (flow_type, flow) in &self.flows {
            for stage in &flow.stages {
                for signal in stage.advance.referenced_signals() {
                    if !signals.has_signal(signal) && !DERIVED_SIGNALS.contains(&signal) {
                        return Err(ConfigError::UnknownSignal {
                            flow: flow_type.to_string(),
                            stage: stage.name.clone(),
                            signal: signal.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn validate_flow(flow_type: FlowType, flow: &FlowDefinition) -> Result<(), ConfigError> {
    let flow_name = flow_type.to_string();

    if flow.stages.is_empty() {
        return Err(ConfigError::EmptyStages(flow_name));
    }

    let mut names = HashSet::new();
    for stage in &flow.stages {
        if stage.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("flows.{}.stages.name", flow_name),
                message: "Stage name cannot be empty".to_string(),
            });
        }
        if !names.insert(stage.name.as_str()) {
            return Err(ConfigError::DuplicateStage {
                flow: flow_name,
                stage: stage.name.clone(),
            });
        }
    }

    for stage in &flow.stages {
        let rule = &stage.advance;

        for jump in &rule.jumps {
            if !names.contains(jump.target.as_str()) {
                return Err(ConfigError::DanglingJumpTarget {
                    flow: flow_name,
                    stage: stage.name.clone(),
                    target: jump.target.clone(),
                });
            }
        }

        if rule.referenced_signals().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: format!("flows.{}.{}.advance", flow_name, stage.name),
                message: "Signal names cannot be empty".to_string(),
            });
        }

        if let Some(max) = rule.max_turns {
            if max < rule.min_turns {
                return Err(ConfigError::InvalidValue {
                    field: format!("flows.{}.{}.advance.max_turns", flow_name, stage.name),
                    message: format!("max_turns ({}) is below min_turns ({})", max, rule.min_turns),
                });
            }
        }

        for placeholder in template_placeholders(&stage.prompt) {
            if !PROMPT_PLACEHOLDERS.contains(&placeholder) && !stage.slots.contains_key(placeholder)
            {
                return Err(ConfigError::UnknownPlaceholder {
                    flow: flow_name,
                    stage: stage.name.clone(),
                    placeholder: placeholder.to_string(),
                });
            }
        }
    }

    Ok(())
}
