//! Administrator endpoints.
//!
//! Administrators are configured by identity subject (`KADO_ADMIN_USER_IDS`).

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use kado_core::ListingStatus;

use crate::db::ListingRepository;
use crate::error::{AppError, Result};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{InvitationCodeRecord, Listing};
use crate::services::invitations;
use crate::state::AppState;

use super::PageQuery;

/// Most codes one request may generate.
pub const MAX_CODES_PER_REQUEST: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/check", get(check))
        .route("/api/admin/listings", get(listings))
        .route("/api/admin/invitation-codes", post(generate_codes))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCheck {
    pub is_admin: bool,
}

/// `?status=&page=` for the admin listing table.
#[derive(Debug, Deserialize)]
pub struct AdminListingsQuery {
    pub status: Option<ListingStatus>,
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct GeneratedCodes {
    pub codes: Vec<InvitationCodeRecord>,
}

/// `GET /api/admin/check`
pub async fn check(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Json<AdminCheck> {
    Json(AdminCheck {
        is_admin: state.config().is_admin(&user.id),
    })
}

/// `GET /api/admin/listings` (every status, newest first)
pub async fn listings(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<AdminListingsQuery>,
) -> Result<Json<Vec<Listing>>> {
    let (limit, offset) = PageQuery { page: query.page }.limit_offset();
    let listings = ListingRepository::new(state.pool())
        .list_all(query.status, limit, offset)
        .await?;
    Ok(Json(listings))
}

/// `POST /api/admin/invitation-codes` with `{ "count": 10 }`
pub async fn generate_codes(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<GenerateBody>,
) -> Result<Json<GeneratedCodes>> {
    if !(1..=MAX_CODES_PER_REQUEST).contains(&body.count) {
        return Err(AppError::BadRequest(format!(
            "count must be between 1 and {MAX_CODES_PER_REQUEST}"
        )));
    }

    let codes = invitations::create_codes(state.pool(), body.count, Some(&admin.id)).await?;
    Ok(Json(GeneratedCodes { codes }))
}
