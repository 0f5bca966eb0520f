//! Runtime Flow Configuration
//!
//! Immutable, validated view of one flow type: the ordered stage list, the
//! advancement rule of every stage and prompt rendering. Built once from
//! `flows.yaml` and shared between sessions through `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use roleplay_config::{
    fill_template, AdvanceRuleDefinition, ConfigError, FlowDefinition, FlowType, FlowsConfig,
    RulePrecedence, StageDefinition,
};

use crate::analysis::AnalysisRecord;

/// Outcome of evaluating a stage's advancement rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum AdvanceDecision {
    /// Remain in the current stage
    Stay,
    /// Move to the next stage in list order
    Sequential,
    /// Jump straight to the named stage
    JumpTo(String),
}

impl AdvanceDecision {
    pub fn is_stay(&self) -> bool {
        matches!(self, AdvanceDecision::Stay)
    }
}

/// One stage of a flow
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    /// Ordinal position in the flow, 0 is the entry stage
    pub position: usize,
    pub prompt: String,
    pub slots: BTreeMap<String, String>,
    pub rule: AdvanceRuleDefinition,
}

/// Inputs of a rule evaluation
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    /// Exchanges completed in the current stage
    pub stage_turns: u32,
    pub analysis: &'a AnalysisRecord,
    /// Session-level goal latch
    pub goal_primed: bool,
    /// The stage is the last one of the flow
    pub is_last: bool,
}

impl Stage {
    fn from_definition(position: usize, def: &StageDefinition) -> Self {
        Self {
            name: def.name.clone(),
            position,
            prompt: def.prompt.clone(),
            slots: def.slots.clone(),
            rule: def.advance.clone(),
        }
    }

    /// Evaluate the advancement rule.
    ///
    /// Jumps to the stage itself are ignored and the last stage never
    /// returns `Sequential`. Which of jump or threshold wins is decided by
    /// the rule's `precedence`.
    pub fn evaluate(&self, input: RuleInput<'_>) -> AdvanceDecision {
        let jump = self.matching_jump(input.analysis);
        let threshold = !input.is_last && self.threshold_met(&input);

        let decision = match self.rule.precedence {
            RulePrecedence::JumpsFirst => match jump {
                Some(target) => AdvanceDecision::JumpTo(target),
                None if threshold => AdvanceDecision::Sequential,
                None => AdvanceDecision::Stay,
            },
            RulePrecedence::ThresholdFirst => {
                if threshold {
                    AdvanceDecision::Sequential
                } else {
                    jump.map_or(AdvanceDecision::Stay, AdvanceDecision::JumpTo)
                }
            }
        };

        tracing::debug!(
            stage = %self.name,
            stage_turns = input.stage_turns,
            ?decision,
            "Evaluated advancement rule"
        );
        decision
    }

    /// First declared jump whose signal fired
    fn matching_jump(&self, analysis: &AnalysisRecord) -> Option<String> {
        self.rule
            .jumps
            .iter()
            .filter(|jump| jump.target != self.name)
            .find(|jump| analysis.has(&jump.signal))
            .map(|jump| jump.target.clone())
    }

    fn threshold_met(&self, input: &RuleInput<'_>) -> bool {
        let rule = &self.rule;

        if let Some(max) = rule.max_turns {
            if input.stage_turns >= max {
                return true;
            }
        }

        if input.stage_turns < rule.min_turns {
            return false;
        }
        if rule.requires_goal_primed && !input.goal_primed {
            return false;
        }
        if rule.none_of.iter().any(|s| input.analysis.has(s)) {
            return false;
        }
        rule.any_of.is_empty() || rule.any_of.iter().any(|s| input.analysis.has(s))
    }
}

/// Values available to a prompt template
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub current_user_message: &'a str,
    pub stage_turn: u32,
    pub analysis: &'a AnalysisRecord,
    pub goal_primed: bool,
}

/// Immutable configuration of one flow type
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub flow_type: FlowType,
    pub stages: Vec<Stage>,
    pub product_context: String,
    pub persona: String,
    pub tone_guidance: BTreeMap<String, String>,
    index: HashMap<String, usize>,
}

impl FlowConfig {
    /// Build from a definition that already passed `FlowsConfig::validate`.
    /// Stage-list invariants are checked again for hand-built definitions.
    pub fn from_definition(flow_type: FlowType, def: &FlowDefinition) -> Result<Self, ConfigError> {
        if def.stages.is_empty() {
            return Err(ConfigError::EmptyStages(flow_type.to_string()));
        }

        let stages: Vec<Stage> = def
            .stages
            .iter()
            .enumerate()
            .map(|(i, s)| Stage::from_definition(i, s))
            .collect();

        let mut index = HashMap::with_capacity(stages.len());
        for stage in &stages {
            if index.insert(stage.name.clone(), stage.position).is_some() {
                return Err(ConfigError::DuplicateStage {
                    flow: flow_type.to_string(),
                    stage: stage.name.clone(),
                });
            }
        }

        for stage in &stages {
            if let Some(jump) = stage.rule.jumps.iter().find(|j| !index.contains_key(&j.target)) {
                return Err(ConfigError::DanglingJumpTarget {
                    flow: flow_type.to_string(),
                    stage: stage.name.clone(),
                    target: jump.target.clone(),
                });
            }
        }

        Ok(Self {
            flow_type,
            stages,
            product_context: def.product_context.clone(),
            persona: def.persona.clone(),
            tone_guidance: def.tone_guidance.clone(),
            index,
        })
    }

    /// The entry stage
    pub fn first_stage(&self) -> &Stage {
        &self.stages[0]
    }

    pub fn last_stage(&self) -> &Stage {
        &self.stages[self.stages.len() - 1]
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.index.get(name).map(|&i| &self.stages[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Stage after `name` in list order, if any
    pub fn next_stage(&self, name: &str) -> Option<&Stage> {
        self.position(name).and_then(|i| self.stages.get(i + 1))
    }

    pub fn is_last(&self, name: &str) -> bool {
        self.position(name) == Some(self.stages.len() - 1)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Render the system prompt of `stage`. The flow persona, when set,
    /// is prepended to the stage template.
    pub fn render_prompt(&self, stage: &Stage, ctx: &PromptContext<'_>) -> String {
        let tone = ctx.analysis.tone.as_str();
        let lookup = |key: &str| -> Option<String> {
            let value = match key {
                "product_context" => self.product_context.clone(),
                "current_user_message" => ctx.current_user_message.to_string(),
                "stage" => stage.name.clone(),
                "stage_turn" => ctx.stage_turn.to_string(),
                "tone" => tone.to_string(),
                "intent" => ctx.analysis.intent.to_string(),
                "signals" => ctx.analysis.signal_list(),
                "goal_primed" => (if ctx.goal_primed { "yes" } else { "no" }).to_string(),
                "tone_guidance" => self.tone_guidance.get(tone).cloned().unwrap_or_default(),
                other => return stage.slots.get(other).cloned(),
            };
            Some(value)
        };

        let body = fill_template(&stage.prompt, &lookup);
        if self.persona.trim().is_empty() {
            body
        } else {
            format!("{}\n\n{}", fill_template(&self.persona, &lookup), body)
        }
    }
}

/// All flows, keyed by type
#[derive(Debug, Clone)]
pub struct FlowCatalog {
    flows: BTreeMap<FlowType, Arc<FlowConfig>>,
}

impl FlowCatalog {
    /// Validate and build every flow
    pub fn from_config(config: &FlowsConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut flows = BTreeMap::new();
        for (flow_type, def) in &config.flows {
            flows.insert(*flow_type, Arc::new(FlowConfig::from_definition(*flow_type, def)?));
        }
        Ok(Self { flows })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_config(&FlowsConfig::load(path)?)
    }

    /// Shared configuration of one flow type
    pub fn flow(&self, flow_type: FlowType) -> Result<Arc<FlowConfig>, ConfigError> {
        self.flows
            .get(&flow_type)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownFlow(flow_type.to_string()))
    }

    pub fn flow_types(&self) -> Vec<FlowType> {
        self.flows.keys().copied().collect()
    }
}
