//! Identity provider sign-in.
//!
//! - Login: stores CSRF state, nonce and `return_to` in the session and
//!   redirects to the provider's authorization page
//! - Callback: checks state, exchanges the code, upserts the user and starts
//!   the session
//! - Logout: flushes the session

use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;

use kado_core::UserId;

use crate::db::UserRepository;
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::middleware::{auth_rate_limiter, clear_current_user, session_user_for, set_current_user};
use crate::models::session_keys;
use crate::services::identity::generate_random_string;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .layer(auth_rate_limiter())
        .route("/auth/logout", post(logout))
}

/// Query parameters for `/auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub return_to: Option<String>,
}

/// Query parameters from the provider callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code to exchange for tokens.
    pub code: Option<String>,
    /// State parameter for CSRF protection.
    pub state: Option<String>,
    /// Error code if authorization failed.
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
}

/// Accept only same-site relative paths as redirect targets.
#[must_use]
pub fn safe_return_to(candidate: Option<&str>) -> String {
    candidate
        .map(str::trim)
        .filter(|path| {
            path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
        })
        .unwrap_or("/listings")
        .to_string()
}

fn callback_url(state: &AppState) -> String {
    state.config().url_for("/auth/callback")
}

fn login_failed(reason: &str) -> Response {
    Redirect::to(&format!("/onboarding?error={}", urlencoding::encode(reason))).into_response()
}

/// Start the authorization-code flow.
///
/// # Route
///
/// `GET /auth/login?return_to=/listings/4`
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<LoginQuery>,
) -> Response {
    let oauth_state = generate_random_string(32);
    let nonce = generate_random_string(32);
    let return_to = safe_return_to(query.return_to.as_deref());

    let stored = async {
        session.insert(session_keys::OAUTH_STATE, &oauth_state).await?;
        session.insert(session_keys::OAUTH_NONCE, &nonce).await?;
        session.insert(session_keys::RETURN_TO, &return_to).await
    };
    if let Err(e) = stored.await {
        tracing::error!(error = %e, "Failed to store OAuth state in session");
        return login_failed("session");
    }

    let auth_url = state
        .identity()
        .authorization_url(&callback_url(&state), &oauth_state, &nonce);
    Redirect::to(&auth_url).into_response()
}

/// Handle the provider callback.
///
/// # Route
///
/// `GET /auth/callback`
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        tracing::warn!(
            error,
            description = query.error_description.unwrap_or_default(),
            "Identity provider returned an error"
        );
        return login_failed("denied");
    }

    let Some(code) = query.code else {
        tracing::warn!("OAuth callback missing code");
        return login_failed("missing_code");
    };

    let stored_state: Option<String> = session
        .remove(session_keys::OAUTH_STATE)
        .await
        .ok()
        .flatten();
    let _ = session.remove::<String>(session_keys::OAUTH_NONCE).await;
    if stored_state.is_none() || stored_state != query.state {
        tracing::warn!("OAuth state mismatch");
        return login_failed("invalid_state");
    }

    let token = match state
        .identity()
        .exchange_code(&code, &callback_url(&state))
        .await
    {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "Failed to exchange authorization code");
            return login_failed("token_exchange");
        }
    };

    let info = match state.identity().userinfo(&token.access_token).await {
        Ok(info) => info,
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch userinfo");
            return login_failed("userinfo");
        }
    };

    let user_id = UserId::new(info.sub);
    let user = match UserRepository::new(state.pool())
        .upsert(&user_id, info.email.as_deref(), info.name.as_deref())
        .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = %e, user_id = %user_id, "Failed to upsert user");
            return login_failed("account");
        }
    };

    let current = match session_user_for(&state, &user).await {
        Ok(current) => current,
        Err(e) => {
            tracing::error!(error = %e, user_id = %user_id, "Failed to load onboarding state");
            return login_failed("account");
        }
    };

    let return_to: Option<String> = session
        .remove(session_keys::RETURN_TO)
        .await
        .ok()
        .flatten();

    // New session id after sign-in (session fixation).
    if let Err(e) = session.cycle_id().await {
        tracing::error!(error = %e, "Failed to cycle session id");
        return login_failed("session");
    }
    if let Err(e) = set_current_user(&session, &current).await {
        tracing::error!(error = %e, "Failed to set session user");
        return login_failed("session");
    }

    set_sentry_user(&current.id, current.email.as_deref());
    tracing::info!(user_id = %current.id, profile_complete = current.profile_complete, "User signed in");

    let destination = safe_return_to(return_to.as_deref());
    if current.profile_complete {
        Redirect::to(&destination).into_response()
    } else {
        Redirect::to(&format!(
            "/onboarding?return_to={}",
            urlencoding::encode(&destination)
        ))
        .into_response()
    }
}

/// End the session.
///
/// # Route
///
/// `POST /auth/logout`
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_user(&session).await {
        tracing::error!(error = %e, "Failed to flush session on logout");
    }
    clear_sentry_user();
    Redirect::to("/listings").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_return_to_keeps_local_paths() {
        assert_eq!(safe_return_to(Some("/orders/4?tab=1")), "/orders/4?tab=1");
        assert_eq!(safe_return_to(Some(" /listings ")), "/listings");
    }

    #[test]
    fn test_safe_return_to_rejects_other_sites() {
        assert_eq!(safe_return_to(Some("https://evil.test")), "/listings");
        assert_eq!(safe_return_to(Some("//evil.test/path")), "/listings");
        assert_eq!(safe_return_to(Some("/\\evil.test")), "/listings");
        assert_eq!(safe_return_to(None), "/listings");
    }
}
