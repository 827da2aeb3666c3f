//! Onboarding page: pick a slug and display name, redeem an invitation code.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::db::{InvitationCodeRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{OptionalAuth, login_url, refresh_current_user};
use crate::models::CurrentUser;
use crate::state::AppState;

use super::auth::safe_return_to;

pub fn router() -> Router<AppState> {
    Router::new().route("/onboarding", get(show))
}

#[derive(Debug, Deserialize)]
pub struct OnboardingQuery {
    pub return_to: Option<String>,
    pub error: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "onboarding.html")]
pub struct OnboardingTemplate {
    pub user: Option<CurrentUser>,
    pub login_href: String,
    pub return_to: String,
    pub error: Option<String>,
    pub slug: String,
    pub display_name: String,
    pub invitation_required: bool,
    pub invitation_code: Option<String>,
}

/// Where to go once onboarding is done. Never back to onboarding itself.
fn destination(return_to: Option<&str>) -> String {
    let path = safe_return_to(return_to);
    if path.starts_with("/onboarding") {
        "/listings".to_string()
    } else {
        path
    }
}

/// `GET /onboarding?return_to=&error=`
///
/// Signed-out visitors get a sign-in link. Users whose profile is already
/// complete are sent on to `return_to`.
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<OnboardingQuery>,
) -> Result<Response> {
    let return_to = destination(query.return_to.as_deref());

    let Some(user) = user else {
        return Ok(OnboardingTemplate {
            user: None,
            login_href: login_url(&return_to),
            return_to,
            error: query.error,
            slug: String::new(),
            display_name: String::new(),
            invitation_required: false,
            invitation_code: None,
        }
        .into_response());
    };

    // The session copy may predate a redemption or slug change made elsewhere.
    let current = refresh_current_user(&state, &session, &user.id).await?;
    if current.profile_complete {
        return Ok(Redirect::to(&return_to).into_response());
    }

    let row = UserRepository::new(state.pool())
        .get_by_id(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let invitation = InvitationCodeRepository::new(state.pool())
        .get_by_user(&user.id)
        .await?;

    Ok(OnboardingTemplate {
        login_href: login_url(&return_to),
        return_to,
        error: query.error,
        slug: row.slug.unwrap_or_default(),
        display_name: row.display_name.unwrap_or_default(),
        invitation_required: state.config().require_invitation
            && !state.config().is_admin(&user.id)
            && invitation.is_none(),
        invitation_code: invitation.map(|i| i.code),
        user: Some(current),
    }
    .into_response())
}
