//! Order records and their timeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

use kado_core::{
    CurrencyCode, FulfillmentStatus, ListingId, Money, OrderEventId, OrderEventType, OrderId,
    OrderStatus, UserId,
};

/// A buyer's purchase of a listing.
///
/// Title, image and price are snapshots taken at checkout; later listing edits
/// never change an order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub listing_id: ListingId,
    pub listing_title: String,
    pub listing_image_url: Option<String>,
    pub price_cents: i64,
    pub status: OrderStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub currency: CurrencyCode,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub shipping_carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub fulfillment_status: Option<FulfillmentStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Order total with currency.
    #[must_use]
    pub const fn total(&self) -> Money {
        Money::from_cents(self.total_cents, self.currency)
    }

    /// Whether `user` is the buyer or the seller.
    #[must_use]
    pub fn is_party(&self, user: &UserId) -> bool {
        &self.buyer_id == user || &self.seller_id == user
    }
}

/// One row of an order's append-only timeline.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub id: OrderEventId,
    pub order_id: OrderId,
    pub event_type: OrderEventType,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
