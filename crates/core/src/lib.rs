//! Core traits and types for the sales roleplay engine
//!
//! This crate provides foundational types used across all other crates:
//! - Conversation turns and roles
//! - LLM request/response types
//! - The `LlmProvider` trait for pluggable backends
//! - Error types

pub mod conversation;
pub mod error;
pub mod llm_types;
pub mod traits;

pub use conversation::{is_well_formed, Turn, TurnRole};
pub use error::{Error, Result};
pub use llm_types::{
    ChatRequest, ChatResponse, Message, PerformanceSample, ProviderResponse, Role,
};
pub use traits::LlmProvider;
