//! Signed upload parameters for direct browser uploads to the CDN.

use axum::{Json, Router, extract::State, routing::post};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::services::media::{SignedUpload, Throttled, UploadKind};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/uploads/avatar", post(avatar))
        .route("/api/uploads/listing-photo", post(listing_photo))
}

impl From<Throttled> for AppError {
    fn from(_: Throttled) -> Self {
        Self::RateLimited
    }
}

/// `POST /api/uploads/avatar` (429 past the per-user limit)
pub async fn avatar(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<SignedUpload>> {
    Ok(Json(state.media().sign_upload(&user.id, UploadKind::Avatar).await?))
}

/// `POST /api/uploads/listing-photo`
pub async fn listing_photo(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<SignedUpload>> {
    Ok(Json(
        state
            .media()
            .sign_upload(&user.id, UploadKind::ListingPhoto)
            .await?,
    ))
}
