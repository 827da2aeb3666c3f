//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (database)
//!
//! # Auth
//! GET  /auth/login                      - Redirect to the identity provider
//! GET  /auth/callback                   - Provider callback, starts the session
//! POST /auth/logout                     - End the session
//!
//! # Pages
//! GET  /                                - Redirect to /listings
//! GET  /onboarding                      - Profile and invitation setup
//! GET  /listings                        - Browse published listings
//! GET  /listings/{id}                   - Listing detail
//! GET  /orders/{id}                     - Order detail with timeline
//! GET  /purchase/success                - Return page after checkout
//!
//! # JSON API
//! GET  /api/listings                    - Published listings (paginated)
//! POST /api/listings                    - Create a draft
//! GET  /api/listings/mine               - The seller's own listings
//! GET  /api/listings/{id}               - One listing
//! PATCH /api/listings/{id}              - Edit a listing
//! POST /api/listings/{id}/publish       - DRAFT -> PUBLISHED
//! POST /api/listings/{id}/unpublish     - PUBLISHED -> DRAFT
//! POST /api/checkout                    - Start a checkout
//! GET  /api/orders                      - Orders as buyer or seller
//! GET  /api/orders/{id}                 - Order with history
//! POST /api/orders/{id}/ship            - Record a shipment
//! POST /api/invitations/validate        - Check a code (public)
//! POST /api/invitations/redeem          - Redeem a code
//! GET  /api/invitations/status          - The user's redeemed code
//! POST /api/sellers/onboarding          - Connected account onboarding link
//! GET  /api/sellers/status              - Connected account status
//! POST /api/sellers/dashboard-link      - Connected account login link
//! POST /api/uploads/avatar              - Signed avatar upload
//! POST /api/uploads/listing-photo       - Signed listing photo upload
//! GET  /api/users/me                    - Own profile
//! PATCH /api/users/profile              - Edit display name and slug
//! GET  /api/users/slug-check            - Slug availability
//! POST /api/users/avatar                - Save an uploaded avatar URL
//! GET  /api/admin/check                 - Whether the caller is an admin
//! GET  /api/admin/listings              - Every listing (admin)
//! POST /api/admin/invitation-codes      - Generate codes (admin)
//!
//! # Webhooks
//! POST /webhooks/payments               - Payment processor events (signed)
//! POST /webhooks/tracking               - Tracking provider updates (token)
//! ```

pub mod admin;
pub mod auth;
pub mod checkout;
pub mod health;
pub mod invitations;
pub mod listings;
pub mod onboarding;
pub mod orders;
pub mod sellers;
pub mod uploads;
pub mod users;
pub mod webhooks;

use axum::{Router, response::Redirect, routing::get};
use serde::Deserialize;

use crate::middleware::api_rate_limiter;
use crate::state::AppState;

/// Page size for browse endpoints.
pub const PAGE_SIZE: i64 = 24;

/// `?page=` query for paginated endpoints (1-based).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

impl PageQuery {
    /// Current page, at least 1.
    #[must_use]
    pub fn page(self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// `(limit, offset)` for a SQL query.
    #[must_use]
    pub fn limit_offset(self) -> (i64, i64) {
        (PAGE_SIZE, i64::from(self.page() - 1) * PAGE_SIZE)
    }
}

/// JSON API routes, rate limited per client IP.
fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(listings::api_router())
        .merge(checkout::api_router())
        .merge(orders::api_router())
        .merge(invitations::router())
        .merge(sellers::router())
        .merge(uploads::router())
        .merge(users::router())
        .merge(admin::router())
        .layer(api_rate_limiter())
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/listings") }))
        .merge(health::router())
        .merge(auth::router())
        .merge(onboarding::router())
        .merge(listings::page_router())
        .merge(checkout::page_router())
        .merge(orders::page_router())
        .merge(webhooks::router())
        .merge(api_routes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_defaults_and_clamps() {
        assert_eq!(PageQuery::default().limit_offset(), (PAGE_SIZE, 0));
        assert_eq!(PageQuery { page: Some(0) }.page(), 1);
        assert_eq!(
            PageQuery { page: Some(3) }.limit_offset(),
            (PAGE_SIZE, 2 * PAGE_SIZE)
        );
    }
}
