//! Checkout start and the purchase-success return page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use kado_core::{ListingId, OrderId, OrderStatus};

use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, Order};
use crate::services::checkout::{CheckoutOptions, CheckoutStarted, start_checkout};
use crate::services::lifecycle::{OrderLifecycle, PaymentConfirmation};
use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new().route("/api/checkout", post(create))
}

pub fn page_router() -> Router<AppState> {
    Router::new().route("/purchase/success", get(success))
}

/// Body of `POST /api/checkout`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub listing_id: ListingId,
    pub email: Option<String>,
    pub timezone: Option<String>,
}

/// Query string the processor returns to after payment.
#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub order_id: OrderId,
    pub listing_id: ListingId,
    pub session_id: Option<String>,
}

/// Purchase confirmation page.
#[derive(Template, WebTemplate)]
#[template(path = "purchase_success.html")]
pub struct PurchaseSuccessTemplate {
    pub user: Option<CurrentUser>,
    pub order_id: OrderId,
    pub listing_title: String,
    pub total: String,
    pub paid: bool,
}

/// Start a checkout for a listing.
///
/// # Route
///
/// `POST /api/checkout` with `{ "listingId": 4, "email"?, "timezone"? }`
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<CheckoutStarted>> {
    let options = CheckoutOptions {
        email: body.email,
        timezone: body.timezone,
    };
    let started = start_checkout(&state, &user, body.listing_id, &options).await?;
    Ok(Json(started))
}

/// Confirm a purchase when the buyer returns from the processor.
///
/// The processor's session must belong to this order and report it paid before
/// the order is marked PAID. Webhook delivery may already have done so, in which
/// case the confirmation is a no-op.
///
/// # Route
///
/// `GET /purchase/success?order_id=&listing_id=&session_id=`
pub async fn success(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<SuccessQuery>,
) -> Result<impl IntoResponse> {
    let order = OrderRepository::new(state.pool())
        .get_by_id(query.order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    if order.buyer_id != user.id {
        return Err(AppError::Forbidden("Order belongs to another buyer".to_string()));
    }
    if order.listing_id != query.listing_id {
        return Err(AppError::BadRequest("Order does not match listing".to_string()));
    }

    let order = if order.status == OrderStatus::Pending {
        confirm_if_paid(&state, &user, order, query.session_id.as_deref()).await?
    } else {
        order
    };

    Ok(PurchaseSuccessTemplate {
        paid: order.status == OrderStatus::Paid,
        order_id: order.id,
        total: order.total().display(),
        listing_title: order.listing_title,
        user: Some(user),
    })
}

async fn confirm_if_paid(
    state: &AppState,
    user: &CurrentUser,
    order: Order,
    session_id: Option<&str>,
) -> Result<Order> {
    let Some(expected) = order.checkout_session_id.as_deref() else {
        return Ok(order);
    };
    if session_id.is_some_and(|id| id != expected) {
        return Err(AppError::BadRequest(
            "Checkout session does not match order".to_string(),
        ));
    }

    let session = state.payments().get_checkout_session(expected).await?;
    if !session.is_paid() {
        tracing::info!(order_id = %order.id, "Buyer returned before payment completed");
        return Ok(order);
    }

    let transition = OrderLifecycle::new(state.pool())
        .mark_paid(PaymentConfirmation {
            order_id: order.id,
            listing_id: Some(order.listing_id),
            buyer_id: Some(&user.id),
            payment_intent_id: session.payment_intent.as_deref(),
            source: "success_page",
        })
        .await?;
    Ok(transition.order)
}
