//! Permission-template folding and wildcard matching.
//!
//! A permission group owns an ordered list of templates, each a bundle of
//! permission strings with an inheritance mode. The effective set folds the
//! list in position order:
//!
//! - `base` replaces the accumulated set (a later base resets the baseline)
//! - `additive` unions its permissions into the set
//! - `override` replaces the set and ends the fold
//!
//! Membership tests use prefix wildcards: `admin.*` matches
//! `admin.users.read` (and bare `admin`), `*` matches everything, anything
//! else is exact string equality.

use std::collections::BTreeSet;

use serde::Serialize;

use concierge_core::TemplateMode;

use crate::models::PermissionTemplate;

/// An effective permission set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionSet {
    permissions: BTreeSet<String>,
}

impl PermissionSet {
    /// An empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            permissions: BTreeSet::new(),
        }
    }

    /// Whether the set allows the requested permission, honoring wildcards.
    #[must_use]
    pub fn allows(&self, requested: &str) -> bool {
        self.permissions
            .iter()
            .any(|granted| permission_matches(granted, requested))
    }

    /// Number of granted permission strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Whether the set grants nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Iterate the granted permission strings in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.permissions.iter().map(String::as_str)
    }
}

impl FromIterator<String> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            permissions: iter.into_iter().collect(),
        }
    }
}

/// Whether a granted permission string matches a requested one.
///
/// `*` matches everything; `prefix.*` matches `prefix` and anything under
/// `prefix.`; otherwise the comparison is exact.
#[must_use]
pub fn permission_matches(granted: &str, requested: &str) -> bool {
    if granted == "*" {
        return true;
    }

    if let Some(prefix) = granted.strip_suffix(".*") {
        return requested == prefix
            || (requested.len() > prefix.len()
                && requested.starts_with(prefix)
                && requested.as_bytes().get(prefix.len()) == Some(&b'.'));
    }

    granted == requested
}

/// Fold an ordered template list into an effective permission set.
///
/// Templates must already be sorted by fold position (the repository
/// guarantees this).
#[must_use]
pub fn fold_templates(templates: &[PermissionTemplate]) -> PermissionSet {
    let mut set = BTreeSet::new();

    for template in templates {
        match template.mode {
            TemplateMode::Base => {
                set = template.permissions.iter().cloned().collect();
            }
            TemplateMode::Additive => {
                set.extend(template.permissions.iter().cloned());
            }
            TemplateMode::Override => {
                // Terminal: the override has the final word.
                return PermissionSet {
                    permissions: template.permissions.iter().cloned().collect(),
                };
            }
        }
    }

    PermissionSet { permissions: set }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use concierge_core::TemplateId;

    fn template(name: &str, mode: TemplateMode, permissions: &[&str], position: i32) -> PermissionTemplate {
        PermissionTemplate {
            id: TemplateId::new(position),
            group_name: "default".to_string(),
            name: name.to_string(),
            mode,
            permissions: permissions.iter().map(|s| (*s).to_string()).collect(),
            position,
        }
    }

    #[test]
    fn test_matches_exact() {
        assert!(permission_matches("apps.reports", "apps.reports"));
        assert!(!permission_matches("apps.reports", "apps.billing"));
    }

    #[test]
    fn test_matches_global_wildcard() {
        assert!(permission_matches("*", "anything.at.all"));
        assert!(permission_matches("*", ""));
    }

    #[test]
    fn test_matches_prefix_wildcard() {
        assert!(permission_matches("admin.*", "admin.users.read"));
        assert!(permission_matches("admin.*", "admin"));
        assert!(!permission_matches("admin.*", "administrator"));
        assert!(!permission_matches("admin.*", "support.admin"));
    }

    #[test]
    fn test_wildcard_is_not_bidirectional() {
        // A granted exact string does not satisfy a wildcard request.
        assert!(!permission_matches("admin.users", "admin.*"));
    }

    #[test]
    fn test_fold_empty() {
        assert!(fold_templates(&[]).is_empty());
    }

    #[test]
    fn test_fold_base_then_additive() {
        let set = fold_templates(&[
            template("baseline", TemplateMode::Base, &["apps.home", "chat.use"], 0),
            template("extras", TemplateMode::Additive, &["apps.reports"], 1),
        ]);

        assert!(set.allows("apps.home"));
        assert!(set.allows("apps.reports"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_fold_later_base_resets() {
        let set = fold_templates(&[
            template("a", TemplateMode::Base, &["one"], 0),
            template("extra", TemplateMode::Additive, &["two"], 1),
            template("b", TemplateMode::Base, &["three"], 2),
        ]);

        assert!(!set.allows("one"));
        assert!(!set.allows("two"));
        assert!(set.allows("three"));
    }

    #[test]
    fn test_fold_override_is_terminal() {
        let set = fold_templates(&[
            template("a", TemplateMode::Base, &["one", "two"], 0),
            template("lockdown", TemplateMode::Override, &["support.read"], 1),
            template("late", TemplateMode::Additive, &["three"], 2),
        ]);

        assert!(set.allows("support.read"));
        assert!(!set.allows("one"));
        assert!(!set.allows("three"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_fold_additive_only() {
        let set = fold_templates(&[
            template("x", TemplateMode::Additive, &["a"], 0),
            template("y", TemplateMode::Additive, &["b", "a"], 1),
        ]);

        assert_eq!(set.len(), 2);
        assert!(set.allows("a"));
        assert!(set.allows("b"));
    }

    #[test]
    fn test_set_allows_via_wildcard_member() {
        let set: PermissionSet = ["apps.*".to_string()].into_iter().collect();
        assert!(set.allows("apps.reports"));
        assert!(!set.allows("support.queue"));
    }

    #[test]
    fn test_set_serializes_as_sorted_array() {
        let set: PermissionSet = ["b".to_string(), "a".to_string()].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "[\"a\",\"b\"]");
    }
}
