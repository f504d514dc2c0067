//! Seed baseline permission templates and example feature flags.
//!
//! Idempotent: rows that already exist are left untouched.

use super::CommandError;

/// Baseline templates: (group, name, mode, permissions, position).
const TEMPLATES: &[(&str, &str, &str, &[&str], i32)] = &[
    (
        "default",
        "member-baseline",
        "base",
        &["chat.use", "support.create", "apps.home"],
        0,
    ),
    (
        "staff",
        "member-baseline",
        "base",
        &["chat.use", "support.create", "apps.home"],
        0,
    ),
    (
        "staff",
        "staff-extras",
        "additive",
        &["apps.*", "support.queue"],
        1,
    ),
    ("restricted", "lockdown", "override", &["chat.use"], 0),
];

/// Example flags: (key, description, default_enabled, rollout_percentage).
const FLAGS: &[(&str, &str, bool, i16)] = &[
    ("assistant.streaming", "Stream assistant replies over SSE", true, 100),
    ("support.bulk_actions", "Bulk actions in the support queue", false, 0),
    ("apps.beta_marketplace", "Redesigned marketplace listing", false, 25),
];

/// Run the seeder.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or an insert fails.
pub async fn run() -> Result<(), CommandError> {
    let pool = super::connect().await?;

    for &(group, name, mode, permissions, position) in TEMPLATES {
        let permissions: Vec<String> = permissions.iter().map(|s| (*s).to_string()).collect();
        sqlx::query(
            "INSERT INTO permission_templates (group_name, name, mode, permissions, position)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (group_name, name) DO NOTHING",
        )
        .bind(group)
        .bind(name)
        .bind(mode)
        .bind(&permissions)
        .bind(position)
        .execute(&pool)
        .await?;
    }
    tracing::info!(count = TEMPLATES.len(), "permission templates seeded");

    for &(key, description, default_enabled, rollout) in FLAGS {
        sqlx::query(
            "INSERT INTO feature_flags (key, description, default_enabled, rollout_percentage)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(description)
        .bind(default_enabled)
        .bind(rollout)
        .execute(&pool)
        .await?;
    }
    tracing::info!(count = FLAGS.len(), "feature flags seeded");

    Ok(())
}
