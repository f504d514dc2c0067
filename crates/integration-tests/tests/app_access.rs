//! Integration tests for the unified app access decision.
//!
//! The decision combines role, flag gate, explicit grants, and the
//! permission-template engine; these tests drive the pure decision function
//! with permission sets produced by the real fold.

use concierge_core::{TemplateMode, UserRole};
use concierge_integration_tests::template;
use concierge_server::flags::templates::fold_templates;
use concierge_server::flags::{AccessReason, decide_app_access};

#[test]
fn test_admin_ignores_flag_gate_and_grants() {
    let decision = decide_app_access(UserRole::Admin, Some(false), false, Some(false));
    assert!(decision.allowed);
    assert_eq!(decision.reason, AccessReason::AdminRole);
}

#[test]
fn test_flag_gate_blocks_even_with_grant() {
    let decision = decide_app_access(UserRole::User, Some(false), true, Some(true));
    assert!(!decision.allowed);
    assert_eq!(decision.reason, AccessReason::FlagDisabled);
}

#[test]
fn test_grant_wins_over_missing_permission() {
    let decision = decide_app_access(UserRole::User, Some(true), true, Some(false));
    assert!(decision.allowed);
    assert_eq!(decision.reason, AccessReason::Grant);
}

#[test]
fn test_open_app_needs_only_authentication() {
    let decision = decide_app_access(UserRole::User, None, false, None);
    assert!(decision.allowed);
    assert_eq!(decision.reason, AccessReason::Open);
}

#[test]
fn test_permission_set_feeds_the_decision() {
    // Staff group gets apps.* additively; the requirement apps.reports is
    // satisfied through the wildcard.
    let set = fold_templates(&[
        template("staff", "baseline", TemplateMode::Base, &["chat.use"], 0),
        template("staff", "apps", TemplateMode::Additive, &["apps.*"], 1),
    ]);

    let allowed = decide_app_access(UserRole::User, None, false, Some(set.allows("apps.reports")));
    assert!(allowed.allowed);
    assert_eq!(allowed.reason, AccessReason::Permission);

    let denied = decide_app_access(UserRole::User, None, false, Some(set.allows("billing.export")));
    assert!(!denied.allowed);
    assert_eq!(denied.reason, AccessReason::Denied);
}

#[test]
fn test_lockdown_override_revokes_app_access() {
    // An override template drops the apps.* wildcard; access follows.
    let before = fold_templates(&[template(
        "restricted",
        "baseline",
        TemplateMode::Base,
        &["apps.*"],
        0,
    )]);
    let after = fold_templates(&[
        template("restricted", "baseline", TemplateMode::Base, &["apps.*"], 0),
        template("restricted", "lockdown", TemplateMode::Override, &["chat.use"], 1),
    ]);

    assert!(decide_app_access(UserRole::User, None, false, Some(before.allows("apps.reports"))).allowed);
    assert!(!decide_app_access(UserRole::User, None, false, Some(after.allows("apps.reports"))).allowed);
}
