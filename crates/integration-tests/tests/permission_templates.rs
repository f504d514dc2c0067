//! Integration tests for permission-template folding and wildcard matching.

use concierge_core::TemplateMode;
use concierge_integration_tests::template;
use concierge_server::flags::templates::{fold_templates, permission_matches};

// =============================================================================
// Fold Semantics
// =============================================================================

#[test]
fn test_base_plus_additive_union() {
    let set = fold_templates(&[
        template("default", "baseline", TemplateMode::Base, &["chat.use", "apps.home"], 0),
        template("default", "reports", TemplateMode::Additive, &["apps.reports"], 1),
        template("default", "queue", TemplateMode::Additive, &["support.queue"], 2),
    ]);

    for permission in ["chat.use", "apps.home", "apps.reports", "support.queue"] {
        assert!(set.allows(permission), "missing {permission}");
    }
    assert_eq!(set.len(), 4);
}

#[test]
fn test_second_base_resets_accumulated_set() {
    let set = fold_templates(&[
        template("default", "old", TemplateMode::Base, &["legacy.everything"], 0),
        template("default", "extra", TemplateMode::Additive, &["legacy.extra"], 1),
        template("default", "new", TemplateMode::Base, &["modern.core"], 2),
        template("default", "late", TemplateMode::Additive, &["modern.extra"], 3),
    ]);

    assert!(!set.allows("legacy.everything"));
    assert!(!set.allows("legacy.extra"));
    assert!(set.allows("modern.core"));
    assert!(set.allows("modern.extra"));
}

#[test]
fn test_override_discards_everything_after_and_before() {
    let set = fold_templates(&[
        template("restricted", "baseline", TemplateMode::Base, &["chat.use", "apps.*"], 0),
        template("restricted", "lockdown", TemplateMode::Override, &["support.read"], 1),
        template("restricted", "ignored", TemplateMode::Additive, &["apps.home"], 2),
    ]);

    assert_eq!(set.len(), 1);
    assert!(set.allows("support.read"));
    assert!(!set.allows("chat.use"));
    assert!(!set.allows("apps.home"));
}

#[test]
fn test_empty_group_resolves_to_empty_set() {
    let set = fold_templates(&[]);
    assert!(set.is_empty());
    assert!(!set.allows("anything"));
}

// =============================================================================
// Wildcard Matching
// =============================================================================

#[test]
fn test_wildcard_matrix() {
    // (granted, requested, expected)
    let cases = [
        ("*", "anything.at.all", true),
        ("admin.*", "admin.users.read", true),
        ("admin.*", "admin", true),
        ("admin.*", "administrator", false),
        ("admin.*", "support.admin", false),
        ("apps.reports", "apps.reports", true),
        ("apps.reports", "apps.reports.export", false),
        ("apps.reports", "apps", false),
    ];

    for (granted, requested, expected) in cases {
        assert_eq!(
            permission_matches(granted, requested),
            expected,
            "granted={granted} requested={requested}"
        );
    }
}

#[test]
fn test_wildcard_membership_through_set() {
    let set = fold_templates(&[template(
        "staff",
        "apps",
        TemplateMode::Base,
        &["apps.*"],
        0,
    )]);

    assert!(set.allows("apps.reports"));
    assert!(set.allows("apps"));
    assert!(!set.allows("support.queue"));
}
