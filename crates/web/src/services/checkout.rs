//! Checkout orchestration.
//!
//! Creates the PENDING order first so the processor's session metadata can point
//! at it, then resolves the buyer's processor customer and opens the session.

use serde::Serialize;

use kado_core::{ListingId, ListingStatus, OrderId, UserId};

use crate::db::{AuditAction, AuditLogRepository, ListingRepository, OrderRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::models::{CurrentUser, Listing, Order, User};
use crate::services::lifecycle::OrderLifecycle;
use crate::services::payments::CheckoutRequest;
use crate::state::AppState;

/// Why a listing cannot be bought by this buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PurchaseError {
    #[error("Listing not found")]
    ListingNotFound,
    #[error("Listing is not available for purchase")]
    NotPurchasable(ListingStatus),
    #[error("You cannot buy your own listing")]
    OwnListing,
}

impl From<PurchaseError> for AppError {
    fn from(err: PurchaseError) -> Self {
        match err {
            PurchaseError::ListingNotFound => Self::NotFound(err.to_string()),
            PurchaseError::NotPurchasable(_) | PurchaseError::OwnListing => {
                Self::BadRequest(err.to_string())
            }
        }
    }
}

/// Check a listing can be bought by `buyer`. Runs before any side effect.
///
/// # Errors
///
/// Returns the first failed precondition: missing listing, non-PUBLISHED status,
/// or the buyer being the seller.
pub fn validate_purchase<'a>(
    listing: Option<&'a Listing>,
    buyer: &UserId,
) -> std::result::Result<&'a Listing, PurchaseError> {
    let listing = listing.ok_or(PurchaseError::ListingNotFound)?;
    if !listing.status.is_purchasable() {
        return Err(PurchaseError::NotPurchasable(listing.status));
    }
    if listing.is_owned_by(buyer) {
        return Err(PurchaseError::OwnListing);
    }
    Ok(listing)
}

/// Optional buyer-supplied checkout inputs.
#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    /// Receipt email to use instead of the identity provider's.
    pub email: Option<String>,
    /// IANA timezone, forwarded to the processor as metadata.
    pub timezone: Option<String>,
}

/// A started checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStarted {
    pub url: String,
    pub order_id: OrderId,
}

/// Start a checkout for one listing.
///
/// # Errors
///
/// Returns 404/400 for failed preconditions (no order is created), a database
/// error, or the processor's error when customer or session creation fails.
/// In that last case the PENDING order is cancelled before returning.
pub async fn start_checkout(
    state: &AppState,
    buyer: &CurrentUser,
    listing_id: ListingId,
    options: &CheckoutOptions,
) -> Result<CheckoutStarted> {
    let pool = state.pool();
    let listing = ListingRepository::new(pool).get_by_id(listing_id).await?;
    let listing = validate_purchase(listing.as_ref(), &buyer.id)?;

    let users = UserRepository::new(pool);
    let email = options
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .or(buyer.email.as_deref());
    let buyer_row = users
        .upsert(&buyer.id, buyer.email.as_deref(), buyer.display_name.as_deref())
        .await?;
    let seller = users.get_by_id(&listing.seller_id).await?;

    let order = OrderRepository::new(pool)
        .create_pending(listing, &buyer.id)
        .await?;

    AuditLogRepository::new(pool)
        .record(
            Some(&buyer.id),
            AuditAction::CheckoutCreated,
            "order",
            &order.id.to_string(),
            &serde_json::json!({
                "listingId": listing.id,
                "priceCents": listing.price_cents,
                "currency": listing.currency,
            }),
        )
        .await?;

    let opened = open_session(
        state,
        buyer,
        listing,
        &order,
        buyer_row,
        email,
        seller.and_then(|s| s.payments_account_id),
        options,
    )
    .await;
    let url = match opened {
        Ok(url) => url,
        Err(e) => {
            abandon(state, order.id).await;
            return Err(e);
        }
    };

    Ok(CheckoutStarted {
        url,
        order_id: order.id,
    })
}

/// Resolve the buyer's processor customer and open a checkout session for `order`.
#[allow(clippy::too_many_arguments)]
async fn open_session(
    state: &AppState,
    buyer: &CurrentUser,
    listing: &Listing,
    order: &Order,
    buyer_row: User,
    email: Option<&str>,
    destination_account: Option<String>,
    options: &CheckoutOptions,
) -> Result<String> {
    let pool = state.pool();
    let users = UserRepository::new(pool);
    let customer_id = match buyer_row.payments_customer_id {
        Some(id) => id,
        None => {
            let id = state
                .payments()
                .create_customer(&buyer.id, email, buyer_row.display_name.as_deref())
                .await?;
            users.set_payments_customer_id(&buyer.id, &id).await?;
            id
        }
    };

    let config = state.config();
    let request = CheckoutRequest {
        order_id: order.id,
        listing_id: listing.id,
        buyer_id: &buyer.id,
        customer_id: &customer_id,
        title: &listing.title,
        image_url: listing.image_url.as_deref(),
        amount_cents: listing.price_cents,
        currency: listing.currency,
        destination_account: destination_account.as_deref(),
        buyer_timezone: options.timezone.as_deref(),
        success_url: config.url_for(&format!(
            "/purchase/success?order_id={}&listing_id={}&session_id={{CHECKOUT_SESSION_ID}}",
            order.id, listing.id
        )),
        cancel_url: config.url_for(&format!("/listings/{}", listing.id)),
    };

    let session = state.payments().create_checkout_session(&request).await?;
    OrderRepository::new(pool)
        .set_checkout_session(order.id, &session.id)
        .await?;

    let url = session
        .url
        .ok_or_else(|| AppError::Internal("checkout session has no URL".to_string()))?;

    tracing::info!(
        order_id = %order.id,
        listing_id = %listing.id,
        buyer_id = %buyer.id,
        session_id = %session.id,
        "Checkout session created"
    );
    Ok(url)
}

/// Cancel an order whose checkout session could not be opened.
///
/// Without a session no expiry webhook will ever arrive for it.
async fn abandon(state: &AppState, order_id: OrderId) {
    match OrderLifecycle::new(state.pool())
        .cancel(order_id, "checkout_failed")
        .await
    {
        Ok(_) => tracing::info!(order_id = %order_id, "Abandoned order cancelled"),
        Err(e) => tracing::error!(
            order_id = %order_id,
            error = %e,
            "Failed to cancel abandoned order"
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use kado_core::CurrencyCode;

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
    fn test_published_listing_is_purchasable() {
        let listing = listing(ListingStatus::Published);
        let validated = validate_purchase(Some(&listing), &UserId::new("buyer")).unwrap();
        assert_eq!(validated.price_cents, 1999);
    }

    #[test]
    fn test_unpublished_listing_rejected() {
        for status in [ListingStatus::Draft, ListingStatus::Sold] {
            let listing = listing(status);
            let err = validate_purchase(Some(&listing), &UserId::new("buyer")).unwrap_err();
            assert_eq!(err, PurchaseError::NotPurchasable(status));
            assert_eq!(
                AppError::from(err).status(),
                axum::http::StatusCode::BAD_REQUEST
            );
        }
    }

    #[test]
    fn test_missing_listing_is_not_found() {
        let err = validate_purchase(None, &UserId::new("buyer")).unwrap_err();
        assert_eq!(
            AppError::from(err).status(),
            axum::http::StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_seller_cannot_buy_own_listing() {
        let listing = listing(ListingStatus::Published);
        assert_eq!(
            validate_purchase(Some(&listing), &UserId::new("seller")).unwrap_err(),
            PurchaseError::OwnListing
        );
    }
}
