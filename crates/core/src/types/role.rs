//! Role and status enums for Concierge entities.
//!
//! All of these are persisted as plain TEXT columns and parsed on read, so
//! the database needs no custom enum types.

use serde::{Deserialize, Serialize};

/// Error returned when a TEXT column holds an unknown enum variant.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// Which enum failed to parse.
    pub kind: &'static str,
    /// The offending database value.
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// User role with different permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Full access: user management, feature console, all support queues.
    Admin,
    /// Regular platform user.
    #[default]
    User,
}

impl UserRole {
    /// The TEXT value stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(UnknownVariant::new("user role", other)),
        }
    }
}

/// Support conversation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Waiting for an agent.
    #[default]
    Open,
    /// Waiting on the user.
    Pending,
    /// Resolved.
    Closed,
}

impl ConversationStatus {
    /// The TEXT value stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Pending => "pending",
            Self::Closed => "closed",
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "pending" => Ok(Self::Pending),
            "closed" => Ok(Self::Closed),
            other => Err(UnknownVariant::new("conversation status", other)),
        }
    }
}

/// How a support conversation was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationOrigin {
    /// Opened directly by the user.
    #[default]
    Manual,
    /// Escalated out of an assistant chat session.
    Handoff,
}

impl ConversationOrigin {
    /// The TEXT value stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Handoff => "handoff",
        }
    }
}

impl std::str::FromStr for ConversationOrigin {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "handoff" => Ok(Self::Handoff),
            other => Err(UnknownVariant::new("conversation origin", other)),
        }
    }
}

/// Chat message role for assistant transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// The TEXT value stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(UnknownVariant::new("chat role", other)),
        }
    }
}

/// Inheritance mode of a permission template.
///
/// Templates fold left-to-right into the user's effective permission set:
/// `base` replaces the accumulated set, `additive` unions into it, and
/// `override` replaces the set outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateMode {
    Base,
    Additive,
    Override,
}

impl TemplateMode {
    /// The TEXT value stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Additive => "additive",
            Self::Override => "override",
        }
    }
}

impl std::str::FromStr for TemplateMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Self::Base),
            "additive" => Ok(Self::Additive),
            "override" => Ok(Self::Override),
            other => Err(UnknownVariant::new("template mode", other)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_roundtrip() {
        for role in [UserRole::Admin, UserRole::User] {
            let parsed: UserRole = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn test_user_role_unknown() {
        let err = "superuser".parse::<UserRole>().unwrap_err();
        assert_eq!(err.kind, "user role");
        assert_eq!(err.value, "superuser");
    }

    #[test]
    fn test_conversation_status_roundtrip() {
        for status in [
            ConversationStatus::Open,
            ConversationStatus::Pending,
            ConversationStatus::Closed,
        ] {
            let parsed: ConversationStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_template_mode_roundtrip() {
        for mode in [
            TemplateMode::Base,
            TemplateMode::Additive,
            TemplateMode::Override,
        ] {
            let parsed: TemplateMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&UserRole::Admin).unwrap(),
            "\"admin\""
        );
        assert_eq!(
            serde_json::to_string(&ConversationOrigin::Handoff).unwrap(),
            "\"handoff\""
        );
        assert_eq!(serde_json::to_string(&ChatRole::User).unwrap(), "\"user\"");
    }
}
