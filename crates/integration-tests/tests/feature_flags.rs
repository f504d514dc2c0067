//! Integration tests for the feature-flag evaluation engine.
//!
//! These verify the decision layering and rollout bucketing through the
//! public engine API, without requiring a database.

use concierge_core::UserId;
use concierge_integration_tests::flag;
use concierge_server::flags::{FlagDecision, decide, rollout_bucket};

// =============================================================================
// Rollout Bucketing
// =============================================================================

#[test]
fn test_bucket_is_stable_across_calls() {
    for id in [1, 7, 42, 9999] {
        let first = rollout_bucket("checkout.redesign", UserId::new(id));
        let second = rollout_bucket("checkout.redesign", UserId::new(id));
        assert_eq!(first, second, "bucket must be deterministic for user {id}");
    }
}

#[test]
fn test_bucket_range() {
    for id in 0..1000 {
        assert!(rollout_bucket("any.flag", UserId::new(id)) < 100);
    }
}

#[test]
fn test_rollout_expansion_is_monotonic() {
    // Every user enabled at 20% must stay enabled when the rollout widens
    // to 50%: the bucket is fixed, only the threshold moves.
    let narrow = flag("gradual.rollout", false, 20);
    let wide = flag("gradual.rollout", false, 50);

    for id in 0..1000 {
        let user = UserId::new(id);
        let at_narrow = decide(&narrow, user, None, false).enabled();
        let at_wide = decide(&wide, user, None, false).enabled();
        if at_narrow {
            assert!(at_wide, "user {id} lost the flag when the rollout widened");
        }
    }
}

#[test]
fn test_distinct_flags_bucket_independently() {
    let same_cohort = (0..200).all(|id| {
        rollout_bucket("flag.alpha", UserId::new(id)) == rollout_bucket("flag.beta", UserId::new(id))
    });
    assert!(!same_cohort, "flags must not share a rollout cohort");
}

// =============================================================================
// Decision Layering
// =============================================================================

#[test]
fn test_false_override_beats_enabled_group() {
    let f = flag("beta.console", true, 100);
    let decision = decide(&f, UserId::new(3), Some(false), true);
    assert!(!decision.enabled());
    assert!(matches!(decision, FlagDecision::Override { enabled: false }));
}

#[test]
fn test_true_override_beats_disabled_everything() {
    let f = flag("beta.console", false, 0);
    let decision = decide(&f, UserId::new(3), Some(true), false);
    assert!(decision.enabled());
}

#[test]
fn test_group_assignment_enables_without_rollout() {
    let f = flag("beta.console", false, 0);
    let decision = decide(&f, UserId::new(3), None, true);
    assert!(matches!(decision, FlagDecision::Group { enabled: true }));
}

#[test]
fn test_default_true_applies_outside_rollout_bucket() {
    let f = flag("already.launched", true, 5);
    let outside = (0..500)
        .map(UserId::new)
        .find(|&u| rollout_bucket("already.launched", u) >= 5)
        .expect("some user must fall outside a 5% bucket");

    let decision = decide(&f, outside, None, false);
    assert!(decision.enabled());
    assert!(matches!(decision, FlagDecision::Default { enabled: true }));
}

#[test]
fn test_zero_and_full_rollout_boundaries() {
    let off = flag("boundary.check", false, 0);
    let on = flag("boundary.check", false, 100);

    for id in 0..300 {
        let user = UserId::new(id);
        assert!(!decide(&off, user, None, false).enabled());
        assert!(decide(&on, user, None, false).enabled());
    }
}

#[test]
fn test_decision_explanation_shape() {
    let f = flag("explained.flag", false, 100);
    let decision = decide(&f, UserId::new(12), None, false);

    let json = serde_json::to_value(&decision).expect("decision serializes");
    assert_eq!(json["source"], "rollout");
    assert_eq!(json["enabled"], true);
    assert_eq!(json["percentage"], 100);
    assert!(json["bucket"].as_u64().expect("bucket present") < 100);
}
