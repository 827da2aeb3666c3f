//! Invitation code validation and redemption.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::db::InvitationCodeRepository;
use crate::error::Result;
use crate::middleware::{RequireAuth, refresh_current_user};
use crate::services::invitations::{self, Redemption, Validation};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/invitations/validate", post(validate))
        .route("/api/invitations/redeem", post(redeem))
        .route("/api/invitations/status", get(status))
}

/// Body carrying an invitation code.
#[derive(Debug, Deserialize)]
pub struct CodeBody {
    pub code: String,
}

/// A redemption plus the refreshed onboarding state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    #[serde(flatten)]
    pub redemption: Redemption,
    pub profile_complete: bool,
}

/// The caller's invitation state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationStatus {
    pub required: bool,
    pub redeemed: bool,
    pub code: Option<String>,
}

/// `POST /api/invitations/validate` (public)
pub async fn validate(
    State(state): State<AppState>,
    Json(body): Json<CodeBody>,
) -> Result<Json<Validation>> {
    Ok(Json(invitations::validate(state.pool(), &body.code).await?))
}

/// `POST /api/invitations/redeem`
///
/// Idempotent: a user who already redeemed a code gets that code back.
pub async fn redeem(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Json(body): Json<CodeBody>,
) -> Result<Json<RedeemResponse>> {
    let redemption = invitations::redeem(state.pool(), &user.id, &body.code).await?;
    let current = refresh_current_user(&state, &session, &user.id).await?;
    Ok(Json(RedeemResponse {
        redemption,
        profile_complete: current.profile_complete,
    }))
}

/// `GET /api/invitations/status`
pub async fn status(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<InvitationStatus>> {
    let record = InvitationCodeRepository::new(state.pool())
        .get_by_user(&user.id)
        .await?;
    Ok(Json(InvitationStatus {
        required: state.config().require_invitation && !state.config().is_admin(&user.id),
        redeemed: record.is_some(),
        code: record.map(|r| r.code),
    }))
}
