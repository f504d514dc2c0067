//! Database migration command.
//!
//! Runs the embedded application migrations from `crates/server/migrations/`
//! and then lets the tower-sessions store create its own table.

use tower_sessions_sqlx_store::PostgresStore;

use super::CommandError;

/// Run all database migrations.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let pool = super::connect().await?;

    tracing::info!("Running application migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Running session store migration...");
    let store = PostgresStore::new(pool.clone())
        .with_table_name("session")
        .map_err(|e| CommandError::SessionStore(e.to_string()))?;
    store
        .migrate()
        .await
        .map_err(|e| CommandError::SessionStore(e.to_string()))?;

    tracing::info!("Migrations complete!");
    Ok(())
}
