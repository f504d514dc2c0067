//! Authentication route handlers.
//!
//! Server-rendered login/registration pages with form posts; session state
//! is stored server-side via tower-sessions.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::warn;

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::services::AuthService;
use crate::state::AppState;

use concierge_core::UserRole;

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login_page).post(login))
        .route("/auth/register", get(register_page).post(register))
        .route("/auth/logout", post(logout))
}

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub display_name: Option<String>,
}

/// Query parameters for error/success display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub error: Option<String>,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// Display the login page.
async fn login_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    LoginTemplate {
        error: query.error,
        success: query.success,
    }
}

/// Handle a login form post.
async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> impl IntoResponse {
    let service = AuthService::new(state.pool());

    match service.login(&form.email, &form.password).await {
        Ok(user) => {
            let current = CurrentUser::from(&user);
            if let Err(e) = set_current_user(&session, &current).await {
                warn!(error = %e, "failed to write session on login");
                return Redirect::to("/auth/login?error=Something+went+wrong");
            }
            set_sentry_user(user.id.as_i32(), Some(user.email.as_str()));
            Redirect::to("/")
        }
        Err(e) => {
            warn!(error = %e, "login failed");
            Redirect::to("/auth/login?error=Invalid+email+or+password")
        }
    }
}

/// Display the registration page.
async fn register_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    RegisterTemplate { error: query.error }
}

/// Handle a registration form post.
async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> impl IntoResponse {
    if form.password != form.password_confirm {
        return Redirect::to("/auth/register?error=Passwords+do+not+match");
    }

    let service = AuthService::new(state.pool());

    match service
        .register(
            &form.email,
            &form.password,
            form.display_name.as_deref(),
            UserRole::User,
        )
        .await
    {
        Ok(user) => {
            let current = CurrentUser::from(&user);
            if let Err(e) = set_current_user(&session, &current).await {
                warn!(error = %e, "failed to write session after registration");
                return Redirect::to("/auth/login?success=Account+created,+please+log+in");
            }
            set_sentry_user(user.id.as_i32(), Some(user.email.as_str()));
            Redirect::to("/")
        }
        Err(e) => {
            warn!(error = %e, "registration failed");
            let message = match e {
                crate::services::AuthError::UserAlreadyExists => "Email+already+registered",
                crate::services::AuthError::WeakPassword => {
                    "Password+must+be+at+least+8+characters"
                }
                crate::services::AuthError::InvalidEmail(_) => "Invalid+email+address",
                _ => "Something+went+wrong",
            };
            Redirect::to(&format!("/auth/register?error={message}"))
        }
    }
}

/// Log out and clear the session.
async fn logout(session: Session) -> impl IntoResponse {
    if let Err(e) = clear_current_user(&session).await {
        warn!(error = %e, "failed to clear session on logout");
    }
    clear_sentry_user();
    Redirect::to("/auth/login?success=Logged+out")
}
