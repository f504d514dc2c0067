//! Integration tests for assistant-to-human handoff detection.

use concierge_server::services::HandoffReason;
use concierge_server::services::handoff::detect;

// =============================================================================
// Explicit Requests
// =============================================================================

#[test]
fn test_explicit_phrases_trigger() {
    let positives = [
        "I want to talk to a human",
        "can i speak to an agent?",
        "Please transfer me to support",
        "get me a REAL PERSON",
        "escalate this ticket",
    ];

    for message in positives {
        let decision = detect(message, &[]);
        assert_eq!(
            decision.map(|d| d.reason),
            Some(HandoffReason::ExplicitRequest),
            "should trigger: {message}"
        );
    }
}

#[test]
fn test_ordinary_questions_do_not_trigger() {
    let negatives = [
        "How do I reset my password?",
        "What apps do I have access to?",
        "Is the assistant trained on human feedback?",
        "The export finished ok",
    ];

    for message in negatives {
        assert!(detect(message, &[]).is_none(), "false positive: {message}");
    }
}

// =============================================================================
// Frustration Heuristics
// =============================================================================

#[test]
fn test_shouting_triggers_frustration() {
    let decision = detect("NOTHING ON THIS PAGE WORKS", &[]);
    assert_eq!(decision.map(|d| d.reason), Some(HandoffReason::Frustration));
}

#[test]
fn test_exclamation_pileup_triggers_frustration() {
    let decision = detect("fix this now!!! it keeps failing", &[]);
    assert_eq!(decision.map(|d| d.reason), Some(HandoffReason::Frustration));
}

#[test]
fn test_repeating_yourself_triggers_frustration() {
    let previous = ["my export is stuck"];
    let decision = detect("My export is stuck", &previous);
    assert_eq!(decision.map(|d| d.reason), Some(HandoffReason::Frustration));
}

#[test]
fn test_followup_with_new_content_is_fine() {
    let previous = ["my export is stuck"];
    assert!(detect("it's the quarterly report export", &previous).is_none());
}

#[test]
fn test_acronyms_are_not_shouting() {
    assert!(detect("does SSO work with SAML?", &[]).is_none());
}
