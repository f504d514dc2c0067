//! Admin user management commands.

use rand::Rng;
use rand::distr::Alphanumeric;

use concierge_core::UserRole;
use concierge_server::services::AuthService;

use super::CommandError;

/// Length of generated admin passwords.
const GENERATED_PASSWORD_LENGTH: usize = 24;

/// Create an admin user.
///
/// When no password is supplied, a random one is generated and printed once.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or registration
/// fails (e.g. the email is taken).
pub async fn create_user(
    email: &str,
    name: &str,
    password: Option<&str>,
) -> Result<(), CommandError> {
    let pool = super::connect().await?;

    let generated = password.is_none();
    let password = password.map_or_else(generate_password, ToString::to_string);

    let service = AuthService::new(&pool);
    let user = service
        .register(email, &password, Some(name), UserRole::Admin)
        .await?;

    tracing::info!(user_id = %user.id, email = %user.email, "admin user created");

    if generated {
        // The generated password is shown exactly once.
        #[allow(clippy::print_stdout)]
        {
            println!("Generated password for {email}: {password}");
        }
    }

    Ok(())
}

/// Generate a random alphanumeric password.
fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}
