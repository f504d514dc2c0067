//! Application services.
//!
//! Services orchestrate repositories and external clients; they are
//! constructed per request from application state.

pub mod auth;
pub mod chat;
pub mod handoff;

pub use auth::{AuthError, AuthService};
pub use chat::{ChatError, ChatService, ChatStreamEvent, SendOutcome, stream_chat_message};
pub use handoff::{HandoffDecision, HandoffReason};
