//! Conversation Analysis
//!
//! Combines signal detection on the latest user message with a few
//! cross-turn heuristics over a bounded window of recent history. The
//! analyzer keeps no state between calls: identical inputs always produce
//! identical records, which is what makes rewind-and-replay deterministic.
//!
//! `!!` and all-caps messages count as impatience. Repeated question marks
//! count as question fatigue, like a re-asked question.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use roleplay_config::{AnalyzerSettings, ConfigError, SignalsConfig, GOAL_STATEMENT};
use roleplay_core::Turn;

use crate::signals::SignalDetector;

/// Signal added when the user keeps asking the same thing
pub const QUESTION_FATIGUE: &str = "question_fatigue";
/// Signal added by the length and punctuation heuristics
pub const IMPATIENCE: &str = "impatience";

/// How strongly the prospect wants to buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntentStrength {
    Low,
    #[default]
    Medium,
    High,
}

impl IntentStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStrength::Low => "low",
            IntentStrength::Medium => "medium",
            IntentStrength::High => "high",
        }
    }
}

impl std::fmt::Display for IntentStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioural tone of the latest message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Neutral,
    Positive,
    Guarded,
    Impatient,
    Resistant,
    Direct,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Neutral => "neutral",
            Tone::Positive => "positive",
            Tone::Guarded => "guarded",
            Tone::Impatient => "impatient",
            Tone::Resistant => "resistant",
            Tone::Direct => "direct",
        }
    }
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of analyzing one user message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub signals: BTreeSet<String>,
    pub intent: IntentStrength,
    pub tone: Tone,
    /// A goal statement appears in the message or in the inspected window
    pub goal_primed: bool,
}

impl AnalysisRecord {
    pub fn has(&self, signal: &str) -> bool {
        self.signals.contains(signal)
    }

    fn has_any(&self, signals: &[&str]) -> bool {
        signals.iter().any(|s| self.has(s))
    }

    /// Comma-separated signal list, for prompts and logs
    pub fn signal_list(&self) -> String {
        if self.signals.is_empty() {
            "none".to_string()
        } else {
            self.signals.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    }
}

/// Pure analyzer over the detector and heuristic settings
#[derive(Debug, Clone)]
pub struct ConversationAnalyzer {
    detector: SignalDetector,
    settings: AnalyzerSettings,
}

impl ConversationAnalyzer {
    pub fn new(detector: SignalDetector, settings: AnalyzerSettings) -> Self {
        Self { detector, settings }
    }

    /// Build detector and analyzer from one signals file
    pub fn from_config(config: &SignalsConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            SignalDetector::new(config)?,
            config.analyzer.clone(),
        ))
    }

    pub fn detector(&self) -> &SignalDetector {
        &self.detector
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// True when the text carries a goal statement
    pub fn is_goal_statement(&self, text: &str) -> bool {
        self.detector.detect(text, GOAL_STATEMENT)
    }

    /// Analyze `user_message` against the history that preceded it
    pub fn analyze(&self, user_message: &str, recent_history: &[Turn]) -> AnalysisRecord {
        let window = self.window(recent_history);
        let prior_user: Vec<&str> = window
            .iter()
            .filter(|t| t.is_user())
            .map(|t| t.content.as_str())
            .collect();

        let goal_primed = self.is_goal_statement(user_message)
            || prior_user.iter().any(|text| self.is_goal_statement(text));

        if user_message.trim().is_empty() {
            return AnalysisRecord {
                goal_primed,
                ..Default::default()
            };
        }

        let mut signals = self.detector.detect_all(user_message);

        if self.is_short_reply_streak(user_message, &prior_user)
            || is_shouting(user_message, self.settings.shouting_min_words)
        {
            signals.insert(IMPATIENCE.to_string());
        }

        if user_message.contains("??") || self.is_repeated_question(user_message, &prior_user) {
            signals.insert(QUESTION_FATIGUE.to_string());
        }

        let mut record = AnalysisRecord {
            signals,
            goal_primed,
            ..Default::default()
        };
        record.intent = classify_intent(&record);
        record.tone = classify_tone(&record);

        tracing::debug!(
            signals = %record.signal_list(),
            intent = %record.intent,
            tone = %record.tone,
            goal_primed = record.goal_primed,
            "Analyzed user message"
        );
        record
    }

    /// Trailing `lookback_turns` exchanges of the history
    fn window<'a>(&self, history: &'a [Turn]) -> &'a [Turn] {
        let keep = self.settings.lookback_turns * 2;
        &history[history.len().saturating_sub(keep)..]
    }

    fn is_short(&self, text: &str) -> bool {
        text.unicode_words().count() <= self.settings.short_reply_words
    }

    fn is_short_reply_streak(&self, message: &str, prior_user: &[&str]) -> bool {
        if self.settings.short_reply_repeats == 0 || !self.is_short(message) {
            return false;
        }
        let short_priors = prior_user.iter().filter(|text| self.is_short(text)).count();
        short_priors >= self.settings.short_reply_repeats
    }

    fn is_repeated_question(&self, message: &str, prior_user: &[&str]) -> bool {
        if self.settings.question_repeats == 0 || !is_question(message) {
            return false;
        }
        let current = word_set(message);
        if current.is_empty() {
            return false;
        }

        let repeats = prior_user
            .iter()
            .filter(|text| is_question(text))
            .filter(|text| overlap(&current, &word_set(text)) >= self.settings.question_overlap)
            .count();
        repeats >= self.settings.question_repeats
    }
}

fn classify_intent(record: &AnalysisRecord) -> IntentStrength {
    if record.has_any(&["high_intent", "commitment"]) {
        IntentStrength::High
    } else if record.has_any(&["low_intent", "walking"]) {
        IntentStrength::Low
    } else {
        IntentStrength::Medium
    }
}

fn classify_tone(record: &AnalysisRecord) -> Tone {
    if record.has_any(&["walking", "objection"]) {
        Tone::Resistant
    } else if record.has(IMPATIENCE) {
        Tone::Impatient
    } else if record.has("guarded") {
        Tone::Guarded
    } else if record.has_any(&["demand_directness", "direct_info_requests"]) {
        Tone::Direct
    } else if record.has_any(&["commitment", "soft_positive", "validation_phrases"]) {
        Tone::Positive
    } else {
        Tone::Neutral
    }
}

fn is_question(text: &str) -> bool {
    text.trim_end().ends_with('?')
}

/// Repeated `!!` or an all-caps message of at least `min_words` words
fn is_shouting(text: &str, min_words: usize) -> bool {
    if text.contains("!!") {
        return true;
    }

    let words = text.unicode_words().count();
    let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
    words >= min_words && letters.peek().is_some() && letters.all(|c| !c.is_lowercase())
}

fn word_set(text: &str) -> HashSet<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Share of `current` words also present in `previous`
fn overlap(current: &HashSet<String>, previous: &HashSet<String>) -> f32 {
    if current.is_empty() {
        return 0.0;
    }
    let shared = current.intersection(previous).count();
    shared as f32 / current.len() as f32
}
