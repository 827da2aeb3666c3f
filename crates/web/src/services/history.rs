//! Order timeline reconstruction.

use chrono::{DateTime, Utc};
use serde::Serialize;

use kado_core::{Carrier, OrderEventType};

use crate::models::{Order, OrderEvent};

/// One line of an order's timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub event_type: OrderEventType,
    pub label: &'static str,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Build the timeline of `order`, oldest first.
///
/// Events with equal timestamps keep their input order. Orders that predate
/// event recording get entries synthesized from their own timestamps.
#[must_use]
pub fn reconstruct(order: &Order, events: &[OrderEvent]) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = if events.is_empty() {
        synthesize(order)
    } else {
        events
            .iter()
            .map(|event| entry(order, event.event_type, event.created_at, &event.metadata))
            .collect()
    };
    entries.sort_by_key(|e| e.timestamp);
    entries
}

fn synthesize(order: &Order) -> Vec<HistoryEntry> {
    let none = serde_json::Value::Null;
    [
        (OrderEventType::OrderCreated, Some(order.created_at)),
        (OrderEventType::PaymentReceived, order.paid_at),
        (OrderEventType::OrderShipped, order.shipped_at),
        (OrderEventType::Delivered, order.delivered_at),
    ]
    .into_iter()
    .filter_map(|(kind, at)| at.map(|at| entry(order, kind, at, &none)))
    .collect()
}

fn entry(
    order: &Order,
    event_type: OrderEventType,
    timestamp: DateTime<Utc>,
    metadata: &serde_json::Value,
) -> HistoryEntry {
    HistoryEntry {
        event_type,
        label: event_type.label(),
        description: describe(order, event_type, metadata),
        timestamp,
    }
}

fn describe(order: &Order, event_type: OrderEventType, metadata: &serde_json::Value) -> String {
    let meta = |key: &str| metadata.get(key).and_then(serde_json::Value::as_str);
    let details = meta("details").filter(|d| !d.trim().is_empty());

    match event_type {
        OrderEventType::OrderCreated => format!("Order placed for {}", order.listing_title),
        OrderEventType::PaymentReceived => {
            format!("Payment of {} received", order.total().display())
        }
        OrderEventType::OrderShipped => {
            let carrier = meta("carrier")
                .or(order.shipping_carrier.as_deref())
                .map(|c| c.parse::<Carrier>().map_or_else(|_| c.to_string(), |c| c.to_string()));
            let number = meta("trackingNumber").or(order.tracking_number.as_deref());
            match (carrier, number) {
                (Some(carrier), Some(number)) => format!("Shipped with {carrier}, tracking {number}"),
                (Some(carrier), None) => format!("Shipped with {carrier}"),
                _ => "Seller shipped the card".to_string(),
            }
        }
        OrderEventType::InTransit => details.unwrap_or("Package is in transit").to_string(),
        OrderEventType::OutForDelivery => {
            details.unwrap_or("Package is out for delivery").to_string()
        }
        OrderEventType::Delivered => "Package was delivered".to_string(),
        OrderEventType::DeliveryException => details
            .unwrap_or("The carrier reported a delivery problem")
            .to_string(),
        OrderEventType::OrderCancelled => "Checkout was not completed".to_string(),
        OrderEventType::OrderRefunded => "Payment was refunded".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};
    use kado_core::{CurrencyCode, ListingId, OrderEventId, OrderId, OrderStatus, UserId};

    use super::*;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn order() -> Order {
        Order {
            id: OrderId::new(1),
            buyer_id: UserId::new("buyer"),
            seller_id: UserId::new("seller"),
            listing_id: ListingId::new(2),
            listing_title: "Mew PSA 10".to_string(),
            listing_image_url: None,
            price_cents: 1999,
            status: OrderStatus::Paid,
            subtotal_cents: 1999,
            tax_cents: 0,
            shipping_cents: 0,
            total_cents: 1999,
            currency: CurrencyCode::Usd,
            checkout_session_id: None,
            payment_intent_id: None,
            shipping_carrier: Some("usps".to_string()),
            tracking_number: Some("9400111899223344556677".to_string()),
            tracking_url: None,
            fulfillment_status: None,
            created_at: at(0),
            updated_at: at(30),
            paid_at: Some(at(5)),
            shipped_at: Some(at(20)),
            delivered_at: None,
        }
    }

    fn event(id: i32, kind: OrderEventType, minutes: i64) -> OrderEvent {
        OrderEvent {
            id: OrderEventId::new(id),
            order_id: OrderId::new(1),
            event_type: kind,
            metadata: serde_json::json!({}),
            created_at: at(minutes),
        }
    }

    #[test]
    fn test_events_sorted_ascending_and_stable() {
        let events = vec![
            event(3, OrderEventType::OrderShipped, 20),
            event(1, OrderEventType::OrderCreated, 0),
            event(2, OrderEventType::PaymentReceived, 5),
            event(4, OrderEventType::InTransit, 5),
        ];
        let kinds: Vec<_> = reconstruct(&order(), &events)
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                OrderEventType::OrderCreated,
                OrderEventType::PaymentReceived,
                OrderEventType::InTransit,
                OrderEventType::OrderShipped,
            ]
        );
    }

    #[test]
    fn test_synthesized_from_timestamps_when_no_events() {
        let entries = reconstruct(&order(), &[]);
        let kinds: Vec<_> = entries.iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                OrderEventType::OrderCreated,
                OrderEventType::PaymentReceived,
                OrderEventType::OrderShipped,
            ]
        );
        assert_eq!(entries[1].description, "Payment of $19.99 received");
        assert_eq!(
            entries[2].description,
            "Shipped with USPS, tracking 9400111899223344556677"
        );
    }

    #[test]
    fn test_exception_uses_carrier_details() {
        let mut exception = event(1, OrderEventType::DeliveryException, 0);
        exception.metadata = serde_json::json!({ "details": "Address not found" });
        let entries = reconstruct(&order(), &[exception]);
        assert_eq!(entries[0].label, OrderEventType::DeliveryException.label());
        assert_eq!(entries[0].description, "Address not found");
    }
}
