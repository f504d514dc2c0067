//! Dashboard page handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{Router, extract::State, response::IntoResponse, routing::get};

use concierge_core::ConversationStatus;

use crate::db::{ConversationFilter, ConversationRepository};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::state::AppState;

/// Build the dashboard router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// Dashboard page template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard/index.html")]
struct DashboardTemplate {
    display_name: String,
    email: String,
    is_admin: bool,
    open_conversations: i64,
}

/// Render the dashboard.
///
/// GET /
async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> impl IntoResponse {
    // Admins see the whole open queue, users their own threads.
    let filter = ConversationFilter {
        status: Some(ConversationStatus::Open),
        user_id: (!user.is_admin()).then_some(user.id),
        ..ConversationFilter::default()
    };
    let open_conversations = ConversationRepository::new(state.pool())
        .count(&filter)
        .await
        .unwrap_or(0);

    DashboardTemplate {
        display_name: user.display_name.clone(),
        email: user.email.to_string(),
        is_admin: user.is_admin(),
        open_conversations,
    }
}
