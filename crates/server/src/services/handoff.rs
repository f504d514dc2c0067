//! Handoff detection for assistant chat.
//!
//! Decides when an in-progress assistant conversation should be transferred
//! to a human support agent, based on explicit requests and frustration
//! signals in the transcript. Detection is deliberately cheap - phrase
//! matching and a couple of heuristics, no model call.

use serde::Serialize;

/// Phrases that explicitly ask for a human.
const HUMAN_REQUEST_PHRASES: &[&str] = &[
    "talk to a human",
    "talk to a person",
    "talk to an agent",
    "speak to a human",
    "speak to a person",
    "speak to an agent",
    "speak to someone",
    "speak with a person",
    "real person",
    "real human",
    "human agent",
    "live agent",
    "human support",
    "customer service",
    "support team",
    "transfer me",
    "escalate",
];

/// Number of exclamation marks that reads as frustration.
const EXCLAMATION_THRESHOLD: usize = 3;

/// Uppercase ratio above which a message counts as shouting.
const SHOUTING_RATIO: f64 = 0.8;

/// Minimum alphabetic length before the shouting heuristic applies.
const SHOUTING_MIN_LETTERS: usize = 8;

/// Why a handoff was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffReason {
    /// The user explicitly asked for a human.
    ExplicitRequest,
    /// Frustration signals: shouting, repeated punctuation, or a repeated
    /// message.
    Frustration,
}

/// A positive handoff decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandoffDecision {
    pub reason: HandoffReason,
    /// The phrase or signal that triggered the decision.
    pub signal: String,
}

/// Run handoff detection over a new user message and the preceding user
/// turns of the transcript.
///
/// Returns `None` when the assistant should keep handling the conversation.
#[must_use]
pub fn detect(new_message: &str, previous_user_messages: &[&str]) -> Option<HandoffDecision> {
    let normalized = new_message.to_lowercase();

    // Explicit request beats heuristics.
    for phrase in HUMAN_REQUEST_PHRASES {
        if normalized.contains(phrase) {
            return Some(HandoffDecision {
                reason: HandoffReason::ExplicitRequest,
                signal: (*phrase).to_string(),
            });
        }
    }

    if new_message.matches('!').count() >= EXCLAMATION_THRESHOLD {
        return Some(HandoffDecision {
            reason: HandoffReason::Frustration,
            signal: "repeated exclamation".to_string(),
        });
    }

    if is_shouting(new_message) {
        return Some(HandoffDecision {
            reason: HandoffReason::Frustration,
            signal: "shouting".to_string(),
        });
    }

    // The same message sent twice in a row means the assistant isn't helping.
    if let Some(last) = previous_user_messages.last() {
        if normalize(last) == normalize(new_message) && !normalize(new_message).is_empty() {
            return Some(HandoffDecision {
                reason: HandoffReason::Frustration,
                signal: "repeated message".to_string(),
            });
        }
    }

    None
}

/// Whether a message is mostly uppercase letters.
fn is_shouting(message: &str) -> bool {
    let letters: Vec<char> = message.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < SHOUTING_MIN_LETTERS {
        return false;
    }

    let uppercase = letters.iter().filter(|c| c.is_uppercase()).count();
    #[allow(clippy::cast_precision_loss)] // message lengths are tiny
    let ratio = uppercase as f64 / letters.len() as f64;
    ratio >= SHOUTING_RATIO
}

/// Lowercase and collapse whitespace for repeat comparison.
fn normalize(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_request() {
        let decision = detect("Can I talk to a human please?", &[]);
        assert_eq!(
            decision.map(|d| d.reason),
            Some(HandoffReason::ExplicitRequest)
        );
    }

    #[test]
    fn test_explicit_request_case_insensitive() {
        let decision = detect("I want to SPEAK TO AN AGENT", &[]);
        assert_eq!(
            decision.map(|d| d.reason),
            Some(HandoffReason::ExplicitRequest)
        );
    }

    #[test]
    fn test_ordinary_message_passes() {
        assert!(detect("How do I reset my password?", &[]).is_none());
    }

    #[test]
    fn test_word_human_alone_is_not_enough() {
        // Mentioning humans is not a request for one.
        assert!(detect("Is this model trained on human feedback?", &[]).is_none());
    }

    #[test]
    fn test_repeated_exclamation() {
        let decision = detect("this is broken!!! fix it", &[]);
        assert_eq!(decision.map(|d| d.reason), Some(HandoffReason::Frustration));
    }

    #[test]
    fn test_shouting() {
        let decision = detect("WHY IS NOTHING WORKING HERE", &[]);
        assert_eq!(decision.map(|d| d.reason), Some(HandoffReason::Frustration));
    }

    #[test]
    fn test_short_uppercase_is_not_shouting() {
        // Acronyms and short yells don't trigger.
        assert!(detect("OK", &[]).is_none());
        assert!(detect("USA", &[]).is_none());
    }

    #[test]
    fn test_repeated_message() {
        let previous = ["where is my invoice"];
        let decision = detect("Where is  my invoice", &previous);
        assert_eq!(decision.map(|d| d.reason), Some(HandoffReason::Frustration));
    }

    #[test]
    fn test_different_followup_is_fine() {
        let previous = ["where is my invoice"];
        assert!(detect("it was for order 1234", &previous).is_none());
    }

    #[test]
    fn test_signal_names_the_trigger() {
        let decision = detect("please escalate this", &[]).expect("should trigger");
        assert_eq!(decision.signal, "escalate");
    }
}
