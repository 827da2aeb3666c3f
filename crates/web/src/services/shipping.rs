//! Seller shipping and carrier status updates.

use serde::Serialize;

use kado_core::{Carrier, FulfillmentStatus, OrderId, OrderStatus, TrackingNumber, UserId};

use crate::db::{AuditAction, AuditLogRepository, OrderRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::models::Order;
use crate::services::email::{OrderEmail, sent_or_logged};
use crate::services::tracking::TrackingStatus;
use crate::state::AppState;

/// Why a shipment was refused. All checks run before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShipmentError {
    #[error("Order not found")]
    OrderNotFound,
    #[error("Only the seller can ship this order")]
    NotSeller,
    #[error("Order must be paid before it can ship (status {0})")]
    NotPaid(OrderStatus),
    #[error("Order has already shipped")]
    AlreadyShipped,
    #[error(transparent)]
    Input(#[from] kado_core::ShippingInputError),
}

impl From<ShipmentError> for AppError {
    fn from(err: ShipmentError) -> Self {
        match err {
            ShipmentError::OrderNotFound => Self::NotFound(err.to_string()),
            ShipmentError::NotSeller => Self::Forbidden(err.to_string()),
            _ => Self::BadRequest(err.to_string()),
        }
    }
}

/// Validate a ship request against the order.
///
/// # Errors
///
/// Returns the first failed precondition in order: existence, seller match,
/// PAID status, no existing tracking, carrier, tracking number format.
pub fn validate_shipment(
    order: Option<&Order>,
    seller: &UserId,
    carrier: &str,
    tracking_number: &str,
    allow_test_numbers: bool,
) -> std::result::Result<(Carrier, TrackingNumber), ShipmentError> {
    let order = order.ok_or(ShipmentError::OrderNotFound)?;
    if order.seller_id != *seller {
        return Err(ShipmentError::NotSeller);
    }
    if order.status != OrderStatus::Paid {
        return Err(ShipmentError::NotPaid(order.status));
    }
    if order.tracking_number.is_some() {
        return Err(ShipmentError::AlreadyShipped);
    }
    let carrier: Carrier = carrier.parse()?;
    let tracking = TrackingNumber::parse(carrier, tracking_number, allow_test_numbers)?;
    Ok((carrier, tracking))
}

/// A recorded shipment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub order: Order,
    pub email_sent: bool,
}

/// Ship an order: register tracking, persist, notify the buyer.
///
/// Persistence is authoritative: a failed tracking registration or email is
/// logged and does not undo the shipment.
///
/// # Errors
///
/// Returns 404/403/400 for failed preconditions, 409 when a concurrent request
/// shipped the order first, or a database error.
pub async fn ship_order(
    state: &AppState,
    seller: &UserId,
    order_id: OrderId,
    carrier: &str,
    tracking_number: &str,
) -> Result<Shipment> {
    let pool = state.pool();
    let repo = OrderRepository::new(pool);
    let order = repo.get_by_id(order_id).await?;
    let allow_test_numbers = !state.config().env.is_production();
    let (carrier, tracking) =
        validate_shipment(order.as_ref(), seller, carrier, tracking_number, allow_test_numbers)?;

    if let Err(e) = state.tracking().register(carrier, &tracking, order_id).await {
        tracing::warn!(
            order_id = %order_id,
            error = %e,
            "Tracking registration failed; status updates will not arrive"
        );
    }

    let tracking_url = carrier.tracking_url(&tracking);
    let order = repo
        .mark_shipped(order_id, carrier, &tracking, &tracking_url)
        .await?
        .ok_or_else(|| AppError::Conflict("Order was updated by another request".to_string()))?;

    AuditLogRepository::new(pool)
        .record(
            Some(seller),
            AuditAction::OrderShipped,
            "order",
            &order.id.to_string(),
            &serde_json::json!({
                "carrier": carrier.as_str(),
                "trackingNumber": tracking.as_str(),
            }),
        )
        .await?;

    let email_sent = notify_buyer(state, &order, FulfillmentStatus::Shipped, None).await;

    tracing::info!(
        order_id = %order.id,
        carrier = carrier.as_str(),
        email_sent,
        "Order shipped"
    );
    Ok(Shipment { order, email_sent })
}

/// Apply a tracking provider status to the order with this tracking number.
///
/// Returns the updated order, or `None` when nothing changed (unknown number,
/// non-actionable status, repeated status, or a move backwards).
///
/// # Errors
///
/// Returns a database error.
pub async fn apply_tracking_update(
    state: &AppState,
    tracking_number: &str,
    status: &TrackingStatus,
) -> Result<Option<Order>> {
    let Some(next) = status.fulfillment_status() else {
        return Ok(None);
    };

    let repo = OrderRepository::new(state.pool());
    let Some(order) = repo.get_by_tracking(tracking_number).await? else {
        tracing::info!(tracking_number, "Tracking update for unknown shipment");
        return Ok(None);
    };

    let Some(current) = order.fulfillment_status else {
        return Ok(None);
    };
    if !current.can_advance_to(next) {
        tracing::debug!(order_id = %order.id, %current, %next, "Ignoring tracking update");
        return Ok(None);
    }

    let metadata = serde_json::json!({
        "status": status.status,
        "substatus": status.substatus.as_ref().map(|s| s.code.as_str()),
        "details": status.status_details,
        "statusDate": status.status_date,
    });
    let Some(updated) = repo
        .advance_fulfillment(order.id, current, next, &metadata)
        .await?
    else {
        return Ok(None);
    };

    if matches!(
        next,
        FulfillmentStatus::Delivered | FulfillmentStatus::Exception
    ) {
        notify_buyer(state, &updated, next, status.status_details.as_deref()).await;
    }

    tracing::info!(order_id = %updated.id, status = %next, "Fulfillment status updated");
    Ok(Some(updated))
}

/// Email the buyer about a fulfillment change. Returns whether it was sent.
async fn notify_buyer(
    state: &AppState,
    order: &Order,
    status: FulfillmentStatus,
    status_details: Option<&str>,
) -> bool {
    let buyer = match UserRepository::new(state.pool()).get_by_id(&order.buyer_id).await {
        Ok(buyer) => buyer,
        Err(e) => {
            tracing::warn!(order_id = %order.id, error = %e, "Could not load buyer for email");
            return false;
        }
    };
    let recipient_name = buyer.as_ref().map_or("there", |b| b.name());
    let to = buyer.as_ref().and_then(|b| b.email.as_deref());
    let order_url = state.config().url_for(&format!("/orders/{}", order.id));
    let carrier = order
        .shipping_carrier
        .as_deref()
        .and_then(|c| c.parse::<Carrier>().ok())
        .map(|c| c.display_name());

    let email = OrderEmail {
        recipient_name,
        listing_title: &order.listing_title,
        order_url: &order_url,
        carrier,
        tracking_number: order.tracking_number.as_deref(),
        tracking_url: order.tracking_url.as_deref(),
        status_details,
    };

    let service = state.email();
    match status {
        FulfillmentStatus::Shipped => {
            sent_or_logged(service.send_order_shipped(to, &email).await, "shipped")
        }
        FulfillmentStatus::Delivered => {
            sent_or_logged(service.send_order_delivered(to, &email).await, "delivered")
        }
        FulfillmentStatus::Exception => sent_or_logged(
            service.send_delivery_exception(to, &email).await,
            "delivery_exception",
        ),
        FulfillmentStatus::InTransit | FulfillmentStatus::OutForDelivery => false,
    }
}
