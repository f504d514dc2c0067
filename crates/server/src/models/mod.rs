//! Domain models for the Concierge server.

pub mod app;
pub mod chat;
pub mod feature;
pub mod session;
pub mod support;
pub mod user;

pub use app::{App, AppGrant};
pub use chat::{ChatMessage, ChatSession};
pub use feature::{FeatureFlag, FeatureGroup, PermissionTemplate};
pub use session::{CurrentUser, keys as session_keys};
pub use support::{Conversation, SupportMessage};
pub use user::User;
