//! Claude API integration for the assistant chat.
//!
//! Provides a streaming and non-streaming client for the Anthropic Messages
//! API. The assistant here is conversational only - no tool use.

pub mod client;
pub mod error;
pub mod types;

pub use client::ClaudeClient;
pub use error::ClaudeError;
pub use types::{
    ChatRequest, ChatResponse, ContentBlock, ContentBlockDelta, Message, StopReason, StreamEvent,
    Usage,
};
