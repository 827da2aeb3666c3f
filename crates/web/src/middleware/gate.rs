//! Sign-in and onboarding gate.
//!
//! Every route needs a session except the public allow-list. Signed-in users
//! whose profile is incomplete (no slug, or no redeemed invitation) are sent to
//! onboarding, except on the endpoints onboarding itself calls.

use axum::{
    Json,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use super::auth::{current_user, is_api_path, login_url};

/// Prefixes reachable without a session.
const PUBLIC_PREFIXES: &[&str] = &["/auth/", "/onboarding", "/static/", "/health", "/webhooks/"];

/// Exact paths reachable without a session.
const PUBLIC_PATHS: &[&str] = &["/api/invitations/validate", "/favicon.ico", "/robots.txt"];

/// Endpoints a signed-in user needs while onboarding.
const ONBOARDING_PATHS: &[&str] = &[
    "/api/users/me",
    "/api/users/profile",
    "/api/users/slug-check",
    "/api/users/avatar",
    "/api/uploads/avatar",
    "/api/invitations/redeem",
    "/api/invitations/status",
];

/// What the gate decided for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Login,
    Onboarding,
}

/// Whether `path` needs no session.
#[must_use]
pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
        || PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Decide a request from its path and the session's user, if any.
#[must_use]
pub fn decide(path: &str, signed_in: bool, profile_complete: bool) -> GateDecision {
    if is_public_path(path) {
        return GateDecision::Allow;
    }
    if !signed_in {
        return GateDecision::Login;
    }
    if profile_complete || ONBOARDING_PATHS.contains(&path) {
        return GateDecision::Allow;
    }
    GateDecision::Onboarding
}

/// Middleware applying [`decide`] to every request.
pub async fn gate_middleware(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let return_to = request
        .uri()
        .path_and_query()
        .map_or_else(|| path.clone(), ToString::to_string);

    let user = match request.extensions().get::<Session>() {
        Some(session) => current_user(session).await,
        None => None,
    };
    let decision = decide(
        &path,
        user.is_some(),
        user.as_ref().is_some_and(|u| u.profile_complete),
    );

    match decision {
        GateDecision::Allow => next.run(request).await,
        GateDecision::Login if is_api_path(&path) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Authentication required" })),
        )
            .into_response(),
        GateDecision::Login => Redirect::to(&login_url(&return_to)).into_response(),
        GateDecision::Onboarding if is_api_path(&path) => (
            StatusCode::PRECONDITION_REQUIRED,
            Json(serde_json::json!({ "error": "Complete your profile to continue" })),
        )
            .into_response(),
        GateDecision::Onboarding => Redirect::to(&format!(
            "/onboarding?return_to={}",
            urlencoding::encode(&return_to)
        ))
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths_need_no_session() {
        for path in [
            "/auth/login",
            "/auth/callback",
            "/onboarding",
            "/static/app.css",
            "/health",
            "/health/ready",
            "/webhooks/payments",
            "/api/invitations/validate",
        ] {
            assert_eq!(decide(path, false, false), GateDecision::Allow, "{path}");
        }
    }

    #[test]
    fn test_anonymous_requests_must_sign_in() {
        assert_eq!(decide("/listings", false, false), GateDecision::Login);
        assert_eq!(decide("/api/checkout", false, false), GateDecision::Login);
        assert_eq!(decide("/api/invitations/redeem", false, false), GateDecision::Login);
    }

    #[test]
    fn test_incomplete_profiles_are_sent_to_onboarding() {
        assert_eq!(decide("/listings", true, false), GateDecision::Onboarding);
        assert_eq!(decide("/api/checkout", true, false), GateDecision::Onboarding);
        assert_eq!(decide("/api/users/profile", true, false), GateDecision::Allow);
        assert_eq!(decide("/api/invitations/redeem", true, false), GateDecision::Allow);
        assert_eq!(decide("/listings", true, true), GateDecision::Allow);
    }
}
