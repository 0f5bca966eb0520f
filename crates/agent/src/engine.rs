//! Sales Flow Engine
//!
//! Finite state machine over the stages of one flow. Owns the current
//! stage, the per-stage exchange counter, the conversation history and the
//! goal-primed latch.
//!
//! State is only mutated by `add_turn`, `advance` (and `apply`, which maps
//! an [`AdvanceDecision`] onto `advance`) and `rewind_to_turn`. A rewind
//! always hard-resets before it replays, so retained turns are never
//! duplicated.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use roleplay_config::FlowType;
use roleplay_core::Turn;

use crate::analysis::{AnalysisRecord, ConversationAnalyzer};
use crate::flow::{AdvanceDecision, FlowConfig, PromptContext, RuleInput, Stage};

/// Engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unknown stage: {0}")]
    UnknownStage(String),
}

/// Why a transition happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// Next stage in list order
    Sequential,
    /// Named target stage
    Jump,
}

/// Stage transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: String,
    pub to: String,
    pub reason: TransitionReason,
    /// Exchanges completed when the transition happened
    pub at_turn: usize,
}

/// Mutable engine state
#[derive(Debug, Clone, Default)]
struct FlowEngineState {
    /// Index into the flow's stage list
    current: usize,
    stage_turn_count: u32,
    history: Vec<Turn>,
    goal_primed: bool,
    transitions: Vec<StageTransition>,
}

/// Serializable view of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEngineSnapshot {
    pub flow_type: FlowType,
    pub current_stage: String,
    pub stage_turn_count: u32,
    pub turn_count: usize,
    pub goal_primed: bool,
    pub history: Vec<Turn>,
    pub transitions: Vec<StageTransition>,
}

/// Sales flow FSM
pub struct SalesFlowEngine {
    flow: Arc<FlowConfig>,
    analyzer: Arc<ConversationAnalyzer>,
    state: FlowEngineState,
}

impl SalesFlowEngine {
    /// New engine at the flow's entry stage with empty history
    pub fn new(flow: Arc<FlowConfig>, analyzer: Arc<ConversationAnalyzer>) -> Self {
        Self {
            flow,
            analyzer,
            state: FlowEngineState::default(),
        }
    }

    pub fn flow(&self) -> &Arc<FlowConfig> {
        &self.flow
    }

    pub fn analyzer(&self) -> &Arc<ConversationAnalyzer> {
        &self.analyzer
    }

    fn stage_ref(&self) -> &Stage {
        &self.flow.stages[self.state.current]
    }

    pub fn current_stage(&self) -> &str {
        &self.stage_ref().name
    }

    /// Exchanges completed since the last transition
    pub fn stage_turn_count(&self) -> u32 {
        self.state.stage_turn_count
    }

    pub fn history(&self) -> &[Turn] {
        &self.state.history
    }

    /// Completed exchanges
    pub fn turn_count(&self) -> usize {
        self.state.history.len() / 2
    }

    /// Once set, stays set until the engine is reset
    pub fn goal_primed(&self) -> bool {
        self.state.goal_primed
    }

    pub fn transitions(&self) -> &[StageTransition] {
        &self.state.transitions
    }

    /// Analyze `user_message` as the next message after the current history
    pub fn analyze(&self, user_message: &str) -> AnalysisRecord {
        self.analyzer.analyze(user_message, &self.state.history)
    }

    /// System prompt of the current stage for the incoming `user_message`
    pub fn current_prompt(&self, user_message: &str) -> String {
        let analysis = self.analyze(user_message);
        let ctx = PromptContext {
            current_user_message: user_message,
            stage_turn: self.state.stage_turn_count,
            analysis: &analysis,
            goal_primed: self.state.goal_primed || analysis.goal_primed,
        };
        self.flow.render_prompt(self.stage_ref(), &ctx)
    }

    /// Record one completed exchange
    pub fn add_turn(&mut self, user_message: impl Into<String>, bot_message: impl Into<String>) {
        let user_message = user_message.into();

        if !self.state.goal_primed && self.analyzer.is_goal_statement(&user_message) {
            self.state.goal_primed = true;
            tracing::debug!(stage = %self.current_stage(), "Goal primed");
        }

        self.state.history.push(Turn::user(user_message));
        self.state.history.push(Turn::bot(bot_message));
        self.state.stage_turn_count += 1;
    }

    /// Evaluate the current stage's rule for the exchange just recorded.
    ///
    /// `user_message` is analyzed against the history that preceded the
    /// most recent exchange, so this is meant to be called after
    /// [`add_turn`](Self::add_turn).
    pub fn should_advance(&self, user_message: &str) -> AdvanceDecision {
        let history = &self.state.history;
        let prior = &history[..history.len().saturating_sub(2)];
        let analysis = self.analyzer.analyze(user_message, prior);

        self.stage_ref().evaluate(RuleInput {
            stage_turns: self.state.stage_turn_count,
            analysis: &analysis,
            goal_primed: self.state.goal_primed || analysis.goal_primed,
            is_last: self.state.current + 1 == self.flow.stages.len(),
        })
    }

    /// Move to `target`, or to the next stage when `target` is `None`.
    ///
    /// A sequential advance from the last stage is a no-op and returns
    /// `Ok(None)`. Every real transition resets the stage counter.
    pub fn advance(&mut self, target: Option<&str>) -> Result<Option<StageTransition>, EngineError> {
        let (next, reason) = match target {
            Some(name) => {
                let position = self
                    .flow
                    .position(name)
                    .ok_or_else(|| EngineError::UnknownStage(name.to_string()))?;
                (position, TransitionReason::Jump)
            }
            None => {
                if self.state.current + 1 >= self.flow.stages.len() {
                    tracing::debug!(stage = %self.current_stage(), "Already at last stage");
                    return Ok(None);
                }
                (self.state.current + 1, TransitionReason::Sequential)
            }
        };

        let transition = StageTransition {
            from: self.current_stage().to_string(),
            to: self.flow.stages[next].name.clone(),
            reason,
            at_turn: self.turn_count(),
        };

        self.state.current = next;
        self.state.stage_turn_count = 0;
        self.state.transitions.push(transition.clone());

        tracing::info!(
            from = %transition.from,
            to = %transition.to,
            reason = ?transition.reason,
            turn = transition.at_turn,
            "Stage transition"
        );
        Ok(Some(transition))
    }

    /// Carry out an advancement decision
    pub fn apply(&mut self, decision: &AdvanceDecision) -> Result<Option<StageTransition>, EngineError> {
        match decision {
            AdvanceDecision::Stay => Ok(None),
            AdvanceDecision::Sequential => self.advance(None),
            AdvanceDecision::JumpTo(target) => self.advance(Some(target)),
        }
    }

    /// Back to the entry stage with empty history and a cleared latch
    pub fn reset(&mut self) {
        self.state = FlowEngineState::default();
    }

    /// Rebuild the state as it was right after exchange `turn_index`
    /// completed, keeping `history[0..turn_index * 2]`.
    ///
    /// Returns `false` without touching state when the index is out of
    /// range. Replay failures restore the pre-rewind state and return
    /// `false`.
    pub fn rewind_to_turn(&mut self, turn_index: usize) -> bool {
        let history_len = self.state.history.len();
        if turn_index > history_len / 2 {
            tracing::debug!(turn_index, history_len, "Rewind index out of range");
            return false;
        }

        // Capture first, reset second, replay last
        let before = self.state.clone();
        let retained: Vec<Turn> = self.state.history[..turn_index * 2].to_vec();
        self.reset();

        for pair in retained.chunks(2) {
            let (user, bot) = match pair {
                [user, bot] if user.is_user() && !bot.is_user() => (user, bot),
                _ => {
                    tracing::warn!(turn_index, "Malformed exchange during replay, rewind aborted");
                    self.state = before;
                    return false;
                }
            };

            self.add_turn(user.content.clone(), bot.content.clone());
            let decision = self.should_advance(&user.content);
            if let Err(e) = self.apply(&decision) {
                tracing::warn!(turn_index, error = %e, "Replay transition failed, rewind aborted");
                self.state = before;
                return false;
            }
        }

        tracing::info!(
            turn_index,
            stage = %self.current_stage(),
            stage_turn_count = self.state.stage_turn_count,
            "Rewound conversation"
        );
        true
    }

    pub fn snapshot(&self) -> FlowEngineSnapshot {
        FlowEngineSnapshot {
            flow_type: self.flow.flow_type,
            current_stage: self.current_stage().to_string(),
            stage_turn_count: self.state.stage_turn_count,
            turn_count: self.turn_count(),
            goal_primed: self.state.goal_primed,
            history: self.state.history.clone(),
            transitions: self.state.transitions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowCatalog;
    use roleplay_config::{FlowsConfig, SignalDefinition, SignalsConfig, REQUIRED_SIGNALS};

    fn engine() -> SalesFlowEngine {
        let mut signals = SignalsConfig::default();
        for name in REQUIRED_SIGNALS {
            signals
                .signals
                .insert(name.to_string(), SignalDefinition::default());
        }
        signals.signals.insert(
            "high_intent".to_string(),
            SignalDefinition {
                keywords: vec!["sign me up".to_string()],
                ..Default::default()
            },
        );
        let analyzer = Arc::new(ConversationAnalyzer::from_config(&signals).unwrap());

        let flows = FlowsConfig::from_yaml(
            r#"
flows:
  consultative:
    stages:
      - name: intent
        prompt: "intent {current_user_message}"
        advance:
          min_turns: 3
          jumps:
            - { signal: high_intent, target: pitch }
      - name: logical
        prompt: "logical"
      - name: pitch
        prompt: "pitch"
  transactional:
    stages:
      - { name: pitch, prompt: "pitch" }
"#,
        )
        .unwrap();
        let flow = FlowCatalog::from_config(&flows)
            .unwrap()
            .flow(FlowType::Consultative)
            .unwrap();
        SalesFlowEngine::new(flow, analyzer)
    }

    #[test]
    fn test_initial_state() {
        let engine = engine();
        assert_eq!(engine.current_stage(), "intent");
        assert_eq!(engine.stage_turn_count(), 0);
        assert!(engine.history().is_empty());
        assert!(!engine.goal_primed());
        assert_eq!(engine.current_prompt("hello"), "intent hello");
    }

    #[test]
    fn test_advance_unknown_stage() {
        let mut engine = engine();
        assert_eq!(
            engine.advance(Some("closing")),
            Err(EngineError::UnknownStage("closing".to_string()))
        );
        assert_eq!(engine.current_stage(), "intent");
    }

    #[test]
    fn test_saturating_advance() {
        let mut engine = engine();
        for _ in 0..10 {
            engine.advance(None).unwrap();
        }
        assert_eq!(engine.current_stage(), "pitch");
        assert_eq!(engine.transitions().len(), 2);

        engine.add_turn("u", "b");
        assert_eq!(engine.advance(None).unwrap(), None);
        // Saturated advance is not a transition and keeps the counter
        assert_eq!(engine.stage_turn_count(), 1);
    }

    #[test]
    fn test_jump_resets_counter() {
        let mut engine = engine();
        engine.add_turn("hello", "hi");
        engine.add_turn("hmm", "yes?");
        assert_eq!(engine.stage_turn_count(), 2);

        engine.add_turn("ok sign me up", "great");
        let decision = engine.should_advance("ok sign me up");
        assert_eq!(decision, AdvanceDecision::JumpTo("pitch".to_string()));

        let transition = engine.apply(&decision).unwrap().unwrap();
        assert_eq!(transition.reason, TransitionReason::Jump);
        assert_eq!(transition.at_turn, 3);
        assert_eq!(engine.current_stage(), "pitch");
        assert_eq!(engine.stage_turn_count(), 0);
    }

    #[test]
    fn test_malformed_replay_restores_state() {
        let mut engine = engine();
        engine.add_turn("a", "b");
        engine.add_turn("c", "d");
        engine.advance(None).unwrap();

        // Corrupt the retained prefix
        engine.state.history[1] = Turn::user("not a bot turn");
        let before = engine.snapshot();

        assert!(!engine.rewind_to_turn(1));
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn test_rewind_out_of_range_is_noop() {
        let mut engine = engine();
        engine.add_turn("a", "b");
        let before = engine.snapshot();
        assert!(!engine.rewind_to_turn(2));
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn test_rewind_to_zero_resets() {
        let mut engine = engine();
        engine.add_turn("sign me up", "ok");
        let decision = engine.should_advance("sign me up");
        engine.apply(&decision).unwrap();

        assert!(engine.rewind_to_turn(0));
        assert_eq!(engine.current_stage(), "intent");
        assert!(engine.history().is_empty());
        assert!(engine.transitions().is_empty());
    }
}
