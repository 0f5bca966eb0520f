//! Centralized constants for the roleplay engine
//!
//! Single source of truth for default values shared by the settings loader,
//! the providers and the flow engine.

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Ollama local inference server
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Groq OpenAI-compatible API
    pub const GROQ_DEFAULT: &str = "https://api.groq.com/openai/v1";
}

/// Default model identifiers
pub mod models {
    pub const OLLAMA_DEFAULT: &str = "llama3.2:3b";
    pub const GROQ_DEFAULT: &str = "llama-3.3-70b-versatile";

    /// Environment variable holding the Groq API key
    pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";
}

/// Timeouts and retry policy for provider calls
pub mod timeouts {
    /// Provider request timeout (seconds)
    pub const PROVIDER_REQUEST_SECS: u64 = 30;

    /// Retry attempts after the first failure
    pub const PROVIDER_MAX_RETRIES: u32 = 2;

    /// First backoff delay; doubled on every retry
    pub const PROVIDER_INITIAL_BACKOFF_MS: u64 = 250;

    /// Idle time after which a session is dropped (seconds)
    pub const SESSION_IDLE_SECS: u64 = 1800;
}

/// Chat orchestration defaults
pub mod chat {
    pub const TEMPERATURE: f32 = 0.7;
    pub const MAX_TOKENS: u32 = 256;

    /// Raw messages (not exchanges) of history sent with every request
    pub const HISTORY_WINDOW: usize = 10;

    pub const FALLBACK_MESSAGE: &str =
        "Sorry, I lost my train of thought there. Could you say that again?";
}

/// Conversation analyzer defaults
pub mod analyzer {
    /// Exchanges of prior history the heuristics look at
    pub const LOOKBACK_TURNS: usize = 3;

    /// Replies with at most this many words count as short
    pub const SHORT_REPLY_WORDS: usize = 3;

    /// Prior short replies needed before the impatience boost kicks in
    pub const SHORT_REPLY_REPEATS: usize = 2;

    /// Prior overlapping questions needed for question fatigue
    pub const QUESTION_REPEATS: usize = 2;

    /// Word overlap ratio at which a question carries no new information
    pub const QUESTION_OVERLAP: f32 = 0.5;

    /// Minimum words before an all-caps message reads as shouting
    pub const SHOUTING_MIN_WORDS: usize = 3;
}

/// Config file locations relative to the working directory
pub mod paths {
    pub const SIGNALS: &str = "config/signals.yaml";
    pub const FLOWS: &str = "config/flows.yaml";
}
