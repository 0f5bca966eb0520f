//! Conversation types: turns and roles
//!
//! A roleplay history is a flat, chronological list of turns that always
//! alternates user → bot. Turns carry no timestamps so that a replayed
//! history compares equal to the one it was rebuilt from.

use serde::{Deserialize, Serialize};

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The trainee playing the prospect
    User,
    /// The roleplay bot
    Bot,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Bot => "bot",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the speaker
    pub role: TurnRole,
    /// Content of the turn
    pub content: String,
}

impl Turn {
    /// Create a new turn
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    /// Create a bot turn
    pub fn bot(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Bot, content)
    }

    /// Get word count
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    pub fn is_user(&self) -> bool {
        self.role == TurnRole::User
    }
}

/// Check the user/bot alternation of a history.
///
/// Returns true when the history has even length and every even index is a
/// user turn followed by a bot turn.
pub fn is_well_formed(history: &[Turn]) -> bool {
    history.len() % 2 == 0
        && history
            .chunks(2)
            .all(|pair| pair[0].role == TurnRole::User && pair[1].role == TurnRole::Bot)
}
