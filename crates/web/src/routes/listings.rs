//! Listing browse pages and the seller listing API.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;

use kado_core::{ListingId, ListingStatus};

use crate::db::{AuditAction, AuditLogRepository, CardRepository, ListingRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{CertificateDetail, CurrentUser, Listing, ListingDraft, ListingDraftError};
use crate::routes::PageQuery;
use crate::state::AppState;

/// Comparable sales shown on a listing page.
const RECENT_SALES_LIMIT: i64 = 5;

pub fn page_router() -> Router<AppState> {
    Router::new()
        .route("/listings", get(index))
        .route("/listings/{id}", get(show))
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/listings", get(browse).post(create))
        .route("/api/listings/mine", get(mine))
        .route("/api/listings/{id}", get(get_listing).patch(update))
        .route("/api/listings/{id}/publish", post(publish))
        .route("/api/listings/{id}/unpublish", post(unpublish))
}

impl From<ListingDraftError> for AppError {
    fn from(err: ListingDraftError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

// =============================================================================
// View models
// =============================================================================

/// A listing as rendered in templates.
#[derive(Debug, Clone)]
pub struct ListingView {
    pub id: ListingId,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub price: String,
    pub status: ListingStatus,
    pub sold: bool,
    pub purchasable: bool,
}

impl From<&Listing> for ListingView {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id,
            title: listing.title.clone(),
            description: listing.description.clone(),
            image_url: listing.image_url.clone(),
            price: listing.price().display(),
            status: listing.status,
            sold: listing.status == ListingStatus::Sold,
            purchasable: listing.status.is_purchasable(),
        }
    }
}

/// A comparable sale as rendered in templates.
#[derive(Debug, Clone)]
pub struct SaleView {
    pub price: String,
    pub sold_on: String,
    pub source: String,
}

/// Certificate summary as rendered in templates.
#[derive(Debug, Clone)]
pub struct CertificateView {
    pub grader: String,
    pub grade: String,
    pub cert_number: String,
    pub population: Option<i32>,
    pub recent_sales: Vec<SaleView>,
}

impl From<CertificateDetail> for CertificateView {
    fn from(detail: CertificateDetail) -> Self {
        Self {
            recent_sales: detail
                .recent_sales
                .iter()
                .map(|sale| SaleView {
                    price: sale.price().display(),
                    sold_on: sale.sold_at.format("%b %-d, %Y").to_string(),
                    source: sale.source.clone(),
                })
                .collect(),
            grader: detail.certificate.grader,
            grade: detail.certificate.grade,
            cert_number: detail.certificate.cert_number,
            population: detail.certificate.population,
        }
    }
}

/// Browse page template.
#[derive(Template, WebTemplate)]
#[template(path = "listings/index.html")]
pub struct ListingsTemplate {
    pub user: Option<CurrentUser>,
    pub listings: Vec<ListingView>,
    pub page: u32,
    pub has_more: bool,
}

/// Listing detail template.
#[derive(Template, WebTemplate)]
#[template(path = "listings/show.html")]
pub struct ListingTemplate {
    pub user: Option<CurrentUser>,
    pub listing: ListingView,
    pub seller_name: String,
    pub certificate: Option<CertificateView>,
    pub is_owner: bool,
}

/// One page of listings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub listings: Vec<Listing>,
    pub page: u32,
    pub has_more: bool,
}

// =============================================================================
// Helpers
// =============================================================================

/// Whether `viewer` may see `listing`. Drafts are visible to their seller and admins.
fn can_view(state: &AppState, listing: &Listing, viewer: Option<&CurrentUser>) -> bool {
    listing.status != ListingStatus::Draft
        || viewer.is_some_and(|u| listing.is_owned_by(&u.id) || state.config().is_admin(&u.id))
}

async fn published_page(state: &AppState, query: PageQuery) -> Result<ListingPage> {
    let (limit, offset) = query.limit_offset();
    // Fetch one extra row to learn whether another page exists.
    let mut listings = ListingRepository::new(state.pool())
        .list_published(limit + 1, offset)
        .await?;
    let has_more = listings.len() > usize::try_from(limit).unwrap_or(usize::MAX);
    listings.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    Ok(ListingPage {
        listings,
        page: query.page(),
        has_more,
    })
}

/// Load a listing the caller owns, for mutation.
async fn owned_listing(state: &AppState, id: ListingId, user: &CurrentUser) -> Result<Listing> {
    let listing = ListingRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Listing not found".to_string()))?;
    if !listing.is_owned_by(&user.id) {
        return Err(AppError::Forbidden(
            "Only the seller can change this listing".to_string(),
        ));
    }
    Ok(listing)
}

fn check_image(state: &AppState, draft: &ListingDraft) -> Result<()> {
    match draft.image_url.as_deref() {
        Some(url) if !state.media().is_hosted_asset(url) => Err(AppError::BadRequest(
            "Listing photos must be uploaded through Kado".to_string(),
        )),
        _ => Ok(()),
    }
}

// =============================================================================
// Pages
// =============================================================================

/// `GET /listings`
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let page = published_page(&state, query).await?;
    Ok(ListingsTemplate {
        user,
        listings: page.listings.iter().map(ListingView::from).collect(),
        page: page.page,
        has_more: page.has_more,
    })
}

/// `GET /listings/{id}`
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<ListingId>,
) -> Result<impl IntoResponse> {
    let listing = ListingRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .filter(|l| can_view(&state, l, user.as_ref()))
        .ok_or_else(|| AppError::NotFound("Listing not found".to_string()))?;

    let seller_name = UserRepository::new(state.pool())
        .get_by_id(&listing.seller_id)
        .await?
        .map_or_else(|| "a Kado seller".to_string(), |s| s.name().to_string());

    let certificate = match listing.certificate_id {
        Some(cert_id) => CardRepository::new(state.pool())
            .certificate_detail(cert_id, RECENT_SALES_LIMIT)
            .await?
            .map(CertificateView::from),
        None => None,
    };

    let is_owner = user.as_ref().is_some_and(|u| listing.is_owned_by(&u.id));
    Ok(ListingTemplate {
        user,
        listing: ListingView::from(&listing),
        seller_name,
        certificate,
        is_owner,
    })
}

// =============================================================================
// API
// =============================================================================

/// `GET /api/listings?page=`
pub async fn browse(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListingPage>> {
    Ok(Json(published_page(&state, query).await?))
}

/// `GET /api/listings/mine`
pub async fn mine(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Listing>>> {
    let listings = ListingRepository::new(state.pool())
        .list_by_seller(&user.id)
        .await?;
    Ok(Json(listings))
}

/// `GET /api/listings/{id}`
pub async fn get_listing(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<ListingId>,
) -> Result<Json<Listing>> {
    ListingRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .filter(|l| can_view(&state, l, user.as_ref()))
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Listing not found".to_string()))
}

/// `POST /api/listings`
///
/// Creates a DRAFT.
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(draft): Json<ListingDraft>,
) -> Result<(StatusCode, Json<Listing>)> {
    let draft = draft.validated()?;
    check_image(&state, &draft)?;

    // Sellers may reach this before any other action that creates their row.
    UserRepository::new(state.pool())
        .upsert(&user.id, user.email.as_deref(), user.display_name.as_deref())
        .await?;
    let listing = ListingRepository::new(state.pool())
        .create(&user.id, &draft)
        .await?;

    tracing::info!(listing_id = %listing.id, seller_id = %user.id, "Listing created");
    Ok((StatusCode::CREATED, Json(listing)))
}

/// `PATCH /api/listings/{id}`
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ListingId>,
    Json(draft): Json<ListingDraft>,
) -> Result<Json<Listing>> {
    let draft = draft.validated()?;
    check_image(&state, &draft)?;

    let listing = owned_listing(&state, id, &user).await?;
    if !listing.status.is_editable() {
        return Err(AppError::Conflict("Sold listings cannot be edited".to_string()));
    }

    let listing = ListingRepository::new(state.pool())
        .update(id, &user.id, &draft)
        .await
        .map_err(|e| match e {
            crate::db::RepositoryError::NotFound => {
                AppError::Conflict("Listing was sold while you were editing".to_string())
            }
            other => other.into(),
        })?;
    Ok(Json(listing))
}

/// `POST /api/listings/{id}/publish`
///
/// Requires a connected account that can accept charges (428 otherwise).
pub async fn publish(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ListingId>,
) -> Result<Json<Listing>> {
    let listing = owned_listing(&state, id, &user).await?;
    if !listing.status.can_transition_to(ListingStatus::Published) {
        return Err(AppError::Conflict(format!(
            "A {} listing cannot be published",
            listing.status
        )));
    }

    let seller = UserRepository::new(state.pool()).get_by_id(&user.id).await?;
    let Some(account_id) = seller.and_then(|s| s.payments_account_id) else {
        return Err(AppError::PreconditionRequired(
            "Set up payouts before publishing".to_string(),
        ));
    };
    let account = state.payments().get_connected_account(&account_id).await?;
    if !account.charges_enabled {
        return Err(AppError::PreconditionRequired(
            "Finish payout setup before publishing".to_string(),
        ));
    }

    transition(&state, &user, listing, ListingStatus::Published).await
}

/// `POST /api/listings/{id}/unpublish`
pub async fn unpublish(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ListingId>,
) -> Result<Json<Listing>> {
    let listing = owned_listing(&state, id, &user).await?;
    if !listing.status.can_transition_to(ListingStatus::Draft) {
        return Err(AppError::Conflict(format!(
            "A {} listing cannot be unpublished",
            listing.status
        )));
    }
    transition(&state, &user, listing, ListingStatus::Draft).await
}

async fn transition(
    state: &AppState,
    user: &CurrentUser,
    listing: Listing,
    to: ListingStatus,
) -> Result<Json<Listing>> {
    let updated = ListingRepository::new(state.pool())
        .transition(listing.id, &user.id, listing.status, to)
        .await
        .map_err(|e| match e {
            crate::db::RepositoryError::NotFound => {
                AppError::Conflict("Listing changed while you were updating it".to_string())
            }
            other => other.into(),
        })?;

    let action = if to == ListingStatus::Published {
        AuditAction::ListingPublished
    } else {
        AuditAction::ListingUnpublished
    };
    AuditLogRepository::new(state.pool())
        .record(
            Some(&user.id),
            action,
            "listing",
            &updated.id.to_string(),
            &serde_json::json!({ "from": listing.status, "to": to }),
        )
        .await?;

    tracing::info!(listing_id = %updated.id, status = %to, "Listing status changed");
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use kado_core::{CurrencyCode, UserId};

    use super::*;

    fn listing(status: ListingStatus) -> Listing {
        Listing {
            id: ListingId::new(7),
            seller_id: UserId::new("seller"),
            title: "Charizard PSA 10".to_string(),
            description: String::new(),
            image_url: None,
            price_cents: 1999,
            currency: CurrencyCode::Usd,
            status,
            card_id: None,
            certificate_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            published_at: None,
        }
    }

    #[test]
    fn test_listing_view_formats_price_and_flags() {
        let view = ListingView::from(&listing(ListingStatus::Published));
        assert_eq!(view.price, "$19.99");
        assert!(view.purchasable);
        assert!(!view.sold);

        let view = ListingView::from(&listing(ListingStatus::Sold));
        assert!(view.sold);
        assert!(!view.purchasable);
    }

    #[test]
    fn test_draft_errors_are_bad_requests() {
        assert_eq!(
            AppError::from(ListingDraftError::MissingTitle).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
