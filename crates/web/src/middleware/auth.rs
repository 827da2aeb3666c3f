//! Authentication extractors and session helpers.
//!
//! The signed-in user is stored in the session as a [`CurrentUser`]. Extractors
//! read it from the `Session` that `SessionManagerLayer` puts in request
//! extensions. API paths (`/api/...`) get JSON 401s, pages get a login redirect.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use kado_core::UserId;

use crate::db::{InvitationCodeRepository, RepositoryError, UserRepository};
use crate::error::AppError;
use crate::models::{CurrentUser, User, session_keys};
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", user.id)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires a signed-in administrator.
pub struct RequireAdmin(pub CurrentUser);

/// Rejection for the auth extractors.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin(String),
    /// Unauthorized response (for API requests).
    Unauthorized,
    /// Signed in, but not an administrator.
    Forbidden,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin(return_to) => Redirect::to(&login_url(&return_to)).into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Authentication required" })),
            )
                .into_response(),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "Admin access required" })),
            )
                .into_response(),
        }
    }
}

/// Login URL that returns to `path` afterwards.
#[must_use]
pub fn login_url(return_to: &str) -> String {
    format!("/auth/login?return_to={}", urlencoding::encode(return_to))
}

/// Whether a path is part of the JSON API.
#[must_use]
pub fn is_api_path(path: &str) -> bool {
    path.starts_with("/api/")
}

/// Path and query of the request, for `return_to` values.
pub(crate) fn original_uri(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), ToString::to_string)
}

/// Read the current user from the session, if any.
pub async fn current_user(session: &Session) -> Option<CurrentUser> {
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::Unauthorized)?;

        match current_user(session).await {
            Some(user) => Ok(Self(user)),
            None if is_api_path(parts.uri.path()) => Err(AuthRejection::Unauthorized),
            None => Err(AuthRejection::RedirectToLogin(original_uri(parts))),
        }
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !state.config().is_admin(&user.id) {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "Non-admin hit admin route");
            return Err(AuthRejection::Forbidden);
        }
        Ok(Self(user))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is signed in.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>() {
            Some(session) => current_user(session).await,
            None => None,
        };

        Ok(Self(user))
    }
}

/// Build the session's view of a user, including whether onboarding is done.
///
/// A profile is complete once the user has a slug and, when invitations are
/// required, has redeemed a code. Administrators skip the invitation step.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the invitation lookup fails.
pub async fn session_user_for(state: &AppState, user: &User) -> Result<CurrentUser, RepositoryError> {
    let invited = !state.config().require_invitation
        || state.config().is_admin(&user.id)
        || InvitationCodeRepository::new(state.pool())
            .get_by_user(&user.id)
            .await?
            .is_some();

    Ok(CurrentUser {
        id: user.id.clone(),
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        profile_complete: invited && user.slug.is_some(),
    })
}

/// Store the current user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Rebuild the session user from the database after a profile or invitation change.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the user row is missing, a database error,
/// or `AppError::Internal` if the session cannot be written.
pub async fn refresh_current_user(
    state: &AppState,
    session: &Session,
    user_id: &UserId,
) -> Result<CurrentUser, AppError> {
    let user = UserRepository::new(state.pool())
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let current = session_user_for(state, &user).await?;
    set_current_user(session, &current)
        .await
        .map_err(|e| AppError::Internal(format!("session write failed: {e}")))?;
    Ok(current)
}

/// Clear the whole session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be flushed.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_url_encodes_return_to() {
        assert_eq!(
            login_url("/orders/5?tab=timeline"),
            "/auth/login?return_to=%2Forders%2F5%3Ftab%3Dtimeline"
        );
    }

    #[test]
    fn test_is_api_path() {
        assert!(is_api_path("/api/checkout"));
        assert!(!is_api_path("/apiary"));
        assert!(!is_api_path("/listings"));
    }

    #[test]
    fn test_unauthorized_rejection_is_json_401() {
        let response = AuthRejection::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = AuthRejection::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = AuthRejection::RedirectToLogin("/orders/1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }
}
