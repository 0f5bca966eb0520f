//! Core traits for the roleplay engine
//!
//! Pluggable collaborators are expressed as traits so backends can be
//! swapped by configuration and replaced with mocks in tests.
//!
//! ```text
//! Language Models:
//!   - LlmProvider: chat completion, availability, model name
//! ```

mod llm;

pub use llm::LlmProvider;
