//! Inbound webhooks from the payment processor and the tracking provider.
//!
//! Payment events are verified against the raw body, then claimed by event id
//! so retries and duplicate deliveries are handled once.

use std::collections::HashMap;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use kado_core::{ListingId, OrderId};

use crate::db::{OrderRepository, WebhookEventRepository};
use crate::error::{AppError, Result};
use crate::models::Order;
use crate::services::lifecycle::{LifecycleError, OrderLifecycle, PaymentConfirmation};
use crate::services::shipping::apply_tracking_update;
use crate::services::tracking::TrackingWebhook;
use crate::state::AppState;

/// Header carrying the payment processor's signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Header alternative to `?token=` for the tracking webhook.
pub const TRACKING_TOKEN_HEADER: &str = "x-kado-webhook-token";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/payments", post(payments))
        .route("/webhooks/tracking", post(tracking))
}

/// Payment processor event envelope.
#[derive(Debug, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// The fields read from a checkout session object.
#[derive(Debug, Default, Deserialize)]
pub struct SessionObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

impl SessionObject {
    fn order_id(&self) -> Option<OrderId> {
        self.metadata.get("order_id")?.parse().ok()
    }

    fn listing_id(&self) -> Option<ListingId> {
        self.metadata.get("listing_id")?.parse().ok()
    }
}

/// The fields read from a charge object.
#[derive(Debug, Default, Deserialize)]
pub struct ChargeObject {
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_refunded: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// What handling an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(&'static str),
}

fn received() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "received": true })))
}

/// `POST /webhooks/payments`
///
/// 400 on a bad signature or body. A handler failure releases the claim and
/// returns an error status so the processor retries.
#[instrument(skip_all, fields(event_id = tracing::field::Empty))]
pub async fn payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing signature header".to_string()))?;
    state.payments().verify_webhook(&body, signature).map_err(|e| {
        warn!(error = %e, "Payment webhook signature rejected");
        AppError::BadRequest("Invalid signature".to_string())
    })?;

    let event: PaymentEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid event: {e}")))?;
    tracing::Span::current().record("event_id", event.id.as_str());

    let events = WebhookEventRepository::new(state.pool());
    if !events.claim(&event.id, &event.event_type).await? {
        info!(event_id = %event.id, "Duplicate payment event, skipping");
        return Ok(received());
    }

    match handle_payment_event(&state, &event).await {
        Ok(Outcome::Applied) => {
            info!(event_id = %event.id, event_type = %event.event_type, "Payment event applied");
        }
        Ok(Outcome::Skipped(reason)) => {
            debug!(event_id = %event.id, event_type = %event.event_type, reason, "Payment event skipped");
        }
        Err(e) => {
            if let Err(release) = events.release(&event.id).await {
                tracing::error!(event_id = %event.id, error = %release, "Failed to release webhook claim");
            }
            return Err(e);
        }
    }
    Ok(received())
}

async fn handle_payment_event(state: &AppState, event: &PaymentEvent) -> Result<Outcome> {
    match event.event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            let session: SessionObject = parse_object(event)?;
            if session.payment_status.as_deref() != Some("paid") {
                return Ok(Outcome::Skipped("payment not settled"));
            }
            checkout_paid(state, &session).await
        }
        "checkout.session.expired" | "checkout.session.async_payment_failed" => {
            let session: SessionObject = parse_object(event)?;
            let Some(order) = order_for_session(state, &session).await? else {
                return Ok(Outcome::Skipped("no order for session"));
            };
            let transition = OrderLifecycle::new(state.pool())
                .cancel(order.id, &event.event_type)
                .await?;
            Ok(applied_or(transition.applied, "order not pending"))
        }
        "charge.refunded" => {
            let charge: ChargeObject = parse_object(event)?;
            let Some(intent) = charge.payment_intent.as_deref() else {
                return Ok(Outcome::Skipped("charge has no payment intent"));
            };
            let Some(order) = OrderRepository::new(state.pool())
                .get_by_payment_intent(intent)
                .await?
            else {
                return Ok(Outcome::Skipped("no order for payment intent"));
            };
            let transition = OrderLifecycle::new(state.pool())
                .refund(order.id, charge.amount_refunded)
                .await?;
            Ok(applied_or(transition.applied, "order not paid"))
        }
        _ => Ok(Outcome::Skipped("unhandled event type")),
    }
}

async fn checkout_paid(state: &AppState, session: &SessionObject) -> Result<Outcome> {
    let Some(order) = order_for_session(state, session).await? else {
        warn!(session_id = %session.id, "Paid checkout session has no order");
        return Ok(Outcome::Skipped("no order for session"));
    };

    let confirmation = PaymentConfirmation {
        order_id: order.id,
        listing_id: session.listing_id(),
        buyer_id: None,
        payment_intent_id: session.payment_intent.as_deref(),
        source: "webhook",
    };
    match OrderLifecycle::new(state.pool()).mark_paid(confirmation).await {
        Ok(transition) => Ok(applied_or(transition.applied, "order already paid")),
        // Retrying cannot change these; acknowledge so the processor stops.
        Err(e @ (LifecycleError::InvalidTransition(..) | LifecycleError::ListingMismatch)) => {
            warn!(order_id = %order.id, error = %e, "Paid session for an order that cannot be paid");
            Ok(Outcome::Skipped("order cannot be paid"))
        }
        Err(e) => Err(e.into()),
    }
}

/// The order a checkout session was created for: metadata first, then the stored session id.
async fn order_for_session(state: &AppState, session: &SessionObject) -> Result<Option<Order>> {
    let repo = OrderRepository::new(state.pool());
    if let Some(id) = session.order_id()
        && let Some(order) = repo.get_by_id(id).await?
    {
        return Ok(Some(order));
    }
    Ok(repo.get_by_checkout_session(&session.id).await?)
}

fn parse_object<T: serde::de::DeserializeOwned>(event: &PaymentEvent) -> Result<T> {
    serde_json::from_value(event.data.object.clone())
        .map_err(|e| AppError::BadRequest(format!("Invalid {} object: {e}", event.event_type)))
}

const fn applied_or(applied: bool, reason: &'static str) -> Outcome {
    if applied {
        Outcome::Applied
    } else {
        Outcome::Skipped(reason)
    }
}

/// `POST /webhooks/tracking?token=`
///
/// Authenticated by the shared token, in the query or [`TRACKING_TOKEN_HEADER`].
#[instrument(skip_all)]
pub async fn tracking(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let token = query.token.as_deref().or_else(|| {
        headers
            .get(TRACKING_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
    });
    if !token.is_some_and(|t| state.tracking().verify_webhook_token(t)) {
        warn!("Tracking webhook with bad token");
        return Err(AppError::Unauthorized("Invalid webhook token".to_string()));
    }

    let webhook: TrackingWebhook = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid tracking update: {e}")))?;

    let record = &webhook.data;
    let Some(status) = record.tracking_status.as_ref() else {
        debug!(event = %webhook.event, "Tracking update without status");
        return Ok(received());
    };

    match apply_tracking_update(&state, &record.tracking_number, status).await? {
        Some(order) => info!(
            order_id = %order.id,
            carrier = %record.carrier,
            status = %status.status,
            "Tracking update applied"
        ),
        None => debug!(status = %status.status, "Tracking update ignored"),
    }
    Ok(received())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_object_reads_metadata_ids() {
        let session: SessionObject = serde_json::from_value(serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "payment_intent": "pi_1",
            "metadata": { "order_id": "42", "listing_id": "7", "buyer_id": "user_1" }
        }))
        .unwrap();
        assert_eq!(session.order_id(), Some(OrderId::new(42)));
        assert_eq!(session.listing_id(), Some(ListingId::new(7)));
    }

    #[test]
    fn test_session_object_tolerates_missing_metadata() {
        let session: SessionObject =
            serde_json::from_value(serde_json::json!({ "id": "cs_test_2" })).unwrap();
        assert_eq!(session.order_id(), None);
        assert!(session.payment_intent.is_none());
    }

    #[test]
    fn test_parse_object_rejects_wrong_shape() {
        let event: PaymentEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "amount_refunded": 10 } }
        }))
        .unwrap();
        assert!(matches!(
            parse_object::<SessionObject>(&event),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_applied_or() {
        assert_eq!(applied_or(true, "x"), Outcome::Applied);
        assert_eq!(applied_or(false, "x"), Outcome::Skipped("x"));
    }
}
