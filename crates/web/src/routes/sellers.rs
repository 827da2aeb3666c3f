//! Seller payout onboarding through the payment processor's connected accounts.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::UserRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sellers/onboarding", post(onboarding))
        .route("/api/sellers/status", get(status))
        .route("/api/sellers/dashboard-link", post(dashboard_link))
}

/// A processor-hosted page to send the seller to.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub url: String,
}

/// Connected account state.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerStatus {
    pub has_account: bool,
    pub charges_enabled: bool,
    pub details_submitted: bool,
    pub payouts_enabled: bool,
}

/// `POST /api/sellers/onboarding`
///
/// Creates the connected account on first use, then returns an onboarding link.
pub async fn onboarding(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<LinkResponse>> {
    let users = UserRepository::new(state.pool());
    let row = users
        .upsert(&user.id, user.email.as_deref(), user.display_name.as_deref())
        .await?;

    let account_id = match row.payments_account_id {
        Some(id) => id,
        None => {
            let id = state
                .payments()
                .create_connected_account(&user.id, row.email.as_deref())
                .await?;
            users.set_payments_account_id(&user.id, &id).await?;
            id
        }
    };

    let return_url = state.config().url_for("/listings?payouts=ready");
    let url = state
        .payments()
        .create_account_link(&account_id, &return_url, &return_url)
        .await?;
    Ok(Json(LinkResponse { url }))
}

/// `GET /api/sellers/status`
pub async fn status(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<SellerStatus>> {
    let account_id = UserRepository::new(state.pool())
        .get_by_id(&user.id)
        .await?
        .and_then(|u| u.payments_account_id);
    let Some(account_id) = account_id else {
        return Ok(Json(SellerStatus::default()));
    };

    let account = state.payments().get_connected_account(&account_id).await?;
    Ok(Json(SellerStatus {
        has_account: true,
        charges_enabled: account.charges_enabled,
        details_submitted: account.details_submitted,
        payouts_enabled: account.payouts_enabled,
    }))
}

/// `POST /api/sellers/dashboard-link`
pub async fn dashboard_link(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<LinkResponse>> {
    let account_id = UserRepository::new(state.pool())
        .get_by_id(&user.id)
        .await?
        .and_then(|u| u.payments_account_id)
        .ok_or_else(|| AppError::NotFound("No seller account".to_string()))?;

    let url = state.payments().create_login_link(&account_id).await?;
    Ok(Json(LinkResponse { url }))
}
