//! Profile endpoints: the signed-in user, slug and display name, avatar.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use kado_core::{Slug, UserId};

use crate::db::{InvitationCodeRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::middleware::{RequireAuth, refresh_current_user, session_user_for};
use crate::models::{PublicUser, User};
use crate::state::AppState;

/// Longest display name accepted.
pub const MAX_DISPLAY_NAME: usize = 60;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/me", get(me))
        .route("/api/users/profile", patch(update_profile))
        .route("/api/users/slug-check", get(slug_check))
        .route("/api/users/avatar", post(set_avatar))
}

/// Body of `PATCH /api/users/profile`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBody {
    pub display_name: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SlugQuery {
    pub slug: String,
}

/// Result of a slug availability check.
#[derive(Debug, Serialize)]
pub struct SlugAvailability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvatarBody {
    pub url: String,
}

/// Trimmed display name, `None` when blank.
///
/// # Errors
///
/// Returns `AppError::BadRequest` if the name is longer than [`MAX_DISPLAY_NAME`].
fn clean_display_name(raw: Option<&str>) -> Result<Option<&str>> {
    let Some(name) = raw.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name.chars().count() > MAX_DISPLAY_NAME {
        return Err(AppError::BadRequest(format!(
            "Display name must be at most {MAX_DISPLAY_NAME} characters"
        )));
    }
    Ok(Some(name))
}

async fn public_user(state: &AppState, user: User) -> Result<PublicUser> {
    let invitation = InvitationCodeRepository::new(state.pool())
        .get_by_user(&user.id)
        .await?;
    let current = session_user_for(state, &user).await?;

    Ok(PublicUser {
        is_admin: state.config().is_admin(&user.id),
        has_seller_account: user.payments_account_id.is_some(),
        invitation_code: invitation.map(|i| i.code),
        profile_complete: current.profile_complete,
        id: user.id,
        email: user.email,
        display_name: user.display_name,
        avatar_url: user.avatar_url,
        slug: user.slug,
        created_at: user.created_at,
    })
}

async fn load_user(state: &AppState, id: &UserId) -> Result<User> {
    UserRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// `GET /api/users/me`
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<PublicUser>> {
    let row = load_user(&state, &user.id).await?;
    Ok(Json(public_user(&state, row).await?))
}

/// `PATCH /api/users/profile`
///
/// Validates both fields before writing either. A slug taken by someone else
/// (case-insensitively) is a 409.
pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Json(body): Json<ProfileBody>,
) -> Result<Json<PublicUser>> {
    let display_name = clean_display_name(body.display_name.as_deref())?;
    let slug = body
        .slug
        .as_deref()
        .map(|s| Slug::parse(s.trim()))
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let row = UserRepository::new(state.pool())
        .update_profile(&user.id, display_name, slug.as_ref())
        .await?;
    refresh_current_user(&state, &session, &user.id).await?;

    tracing::info!(user_id = %user.id, slug = ?row.slug, "Profile updated");
    Ok(Json(public_user(&state, row).await?))
}

/// `GET /api/users/slug-check?slug=`
pub async fn slug_check(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<SlugQuery>,
) -> Result<Json<SlugAvailability>> {
    let slug = match Slug::parse(query.slug.trim()) {
        Ok(slug) => slug,
        Err(e) => {
            return Ok(Json(SlugAvailability {
                available: false,
                reason: Some(e.to_string()),
            }));
        }
    };

    let available = UserRepository::new(state.pool())
        .slug_available(&slug, Some(&user.id))
        .await?;
    Ok(Json(SlugAvailability {
        available,
        reason: (!available).then(|| "That slug is already taken".to_string()),
    }))
}

/// `POST /api/users/avatar`
///
/// Records an avatar the browser uploaded with a signature from
/// `/api/uploads/avatar`.
pub async fn set_avatar(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<AvatarBody>,
) -> Result<Json<PublicUser>> {
    if !state.media().is_hosted_asset(&body.url) {
        return Err(AppError::BadRequest(
            "Avatar must be uploaded through Kado".to_string(),
        ));
    }

    UserRepository::new(state.pool())
        .set_avatar_url(&user.id, &body.url)
        .await?;
    let row = load_user(&state, &user.id).await?;
    Ok(Json(public_user(&state, row).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_display_name_trims_and_drops_blank() {
        assert_eq!(clean_display_name(Some("  Ash  ")).unwrap(), Some("Ash"));
        assert_eq!(clean_display_name(Some("   ")).unwrap(), None);
        assert_eq!(clean_display_name(None).unwrap(), None);
    }

    #[test]
    fn test_clean_display_name_rejects_long_names() {
        let long = "x".repeat(MAX_DISPLAY_NAME + 1);
        assert!(matches!(
            clean_display_name(Some(&long)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_slug_availability_omits_missing_reason() {
        let json = serde_json::to_value(SlugAvailability {
            available: true,
            reason: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "available": true }));
    }
}
