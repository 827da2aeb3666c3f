//! Status enums and their transition rules.
//!
//! Statuses are stored as upper-case `TEXT` (e.g. `PUBLISHED`) and serialized the
//! same way in JSON. Every write path asks these types whether a transition is
//! allowed; nothing moves backwards.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a stored status string is not recognised.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    kind: &'static str,
    value: String,
}

impl UnknownStatus {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Listing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    #[default]
    Draft,
    Published,
    Sold,
}

impl ListingStatus {
    /// Database/JSON representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Published => "PUBLISHED",
            Self::Sold => "SOLD",
        }
    }

    /// Only published listings can be bought.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        matches!(self, Self::Published)
    }

    /// Sold listings are frozen: price and seller never change again.
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        !matches!(self, Self::Sold)
    }

    /// Whether moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Published)
                | (Self::Published, Self::Draft | Self::Sold)
        )
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "PUBLISHED" => Ok(Self::Published),
            "SOLD" => Ok(Self::Sold),
            _ => Err(UnknownStatus::new("listing", s)),
        }
    }
}

impl_text_enum!(ListingStatus);

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Database/JSON representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    ///
    /// `PENDING -> PAID | CANCELLED`, `PAID -> REFUNDED`. Everything else,
    /// including re-applying the current status, is rejected.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Cancelled) | (Self::Paid, Self::Refunded)
        )
    }

    /// No further payment transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "CANCELLED" => Ok(Self::Cancelled),
            "REFUNDED" => Ok(Self::Refunded),
            _ => Err(UnknownStatus::new("order", s)),
        }
    }
}

impl_text_enum!(OrderStatus);

/// Shipment progress of a paid order, driven by the tracking provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    Exception,
}

impl FulfillmentStatus {
    /// Database/JSON representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Shipped => "SHIPPED",
            Self::InTransit => "IN_TRANSIT",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Exception => "EXCEPTION",
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Shipped => 0,
            Self::InTransit => 1,
            Self::OutForDelivery => 2,
            Self::Delivered => 3,
            // An exception can be raised at any point before delivery.
            Self::Exception => 0,
        }
    }

    /// Whether a tracking update to `next` should be applied.
    ///
    /// Delivered is final. An exception may interrupt any earlier state and may be
    /// cleared by later progress; otherwise updates only move forward.
    #[must_use]
    pub const fn can_advance_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Delivered, _) | (Self::Exception, Self::Exception | Self::Shipped) => false,
            (_, Self::Exception) | (Self::Exception, _) => true,
            (current, next) => next.rank() > current.rank(),
        }
    }

    /// Timeline event recorded when an order reaches this status.
    #[must_use]
    pub const fn event_type(&self) -> OrderEventType {
        match self {
            Self::Shipped => OrderEventType::OrderShipped,
            Self::InTransit => OrderEventType::InTransit,
            Self::OutForDelivery => OrderEventType::OutForDelivery,
            Self::Delivered => OrderEventType::Delivered,
            Self::Exception => OrderEventType::DeliveryException,
        }
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FulfillmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHIPPED" => Ok(Self::Shipped),
            "IN_TRANSIT" => Ok(Self::InTransit),
            "OUT_FOR_DELIVERY" => Ok(Self::OutForDelivery),
            "DELIVERED" => Ok(Self::Delivered),
            "EXCEPTION" => Ok(Self::Exception),
            _ => Err(UnknownStatus::new("fulfillment", s)),
        }
    }
}

impl_text_enum!(FulfillmentStatus);

/// Kind of entry in an order's append-only timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventType {
    OrderCreated,
    PaymentReceived,
    OrderShipped,
    InTransit,
    OutForDelivery,
    Delivered,
    DeliveryException,
    OrderCancelled,
    OrderRefunded,
}

impl OrderEventType {
    /// Database/JSON representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "ORDER_CREATED",
            Self::PaymentReceived => "PAYMENT_RECEIVED",
            Self::OrderShipped => "ORDER_SHIPPED",
            Self::InTransit => "IN_TRANSIT",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::DeliveryException => "DELIVERY_EXCEPTION",
            Self::OrderCancelled => "ORDER_CANCELLED",
            Self::OrderRefunded => "ORDER_REFUNDED",
        }
    }

    /// Short human-readable label for timelines.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::OrderCreated => "Order placed",
            Self::PaymentReceived => "Payment received",
            Self::OrderShipped => "Shipped",
            Self::InTransit => "In transit",
            Self::OutForDelivery => "Out for delivery",
            Self::Delivered => "Delivered",
            Self::DeliveryException => "Delivery exception",
            Self::OrderCancelled => "Order cancelled",
            Self::OrderRefunded => "Order refunded",
        }
    }
}

impl fmt::Display for OrderEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderEventType {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDER_CREATED" => Ok(Self::OrderCreated),
            "PAYMENT_RECEIVED" => Ok(Self::PaymentReceived),
            "ORDER_SHIPPED" => Ok(Self::OrderShipped),
            "IN_TRANSIT" => Ok(Self::InTransit),
            "OUT_FOR_DELIVERY" => Ok(Self::OutForDelivery),
            "DELIVERED" => Ok(Self::Delivered),
            "DELIVERY_EXCEPTION" => Ok(Self::DeliveryException),
            "ORDER_CANCELLED" => Ok(Self::OrderCancelled),
            "ORDER_REFUNDED" => Ok(Self::OrderRefunded),
            _ => Err(UnknownStatus::new("order event", s)),
        }
    }
}

impl_text_enum!(OrderEventType);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_only_published_is_purchasable() {
        assert!(ListingStatus::Published.is_purchasable());
        assert!(!ListingStatus::Draft.is_purchasable());
        assert!(!ListingStatus::Sold.is_purchasable());
    }

    #[test]
    fn test_sold_listing_is_frozen() {
        assert!(!ListingStatus::Sold.is_editable());
        assert!(!ListingStatus::Sold.can_transition_to(ListingStatus::Published));
        assert!(!ListingStatus::Sold.can_transition_to(ListingStatus::Draft));
        assert!(!ListingStatus::Draft.can_transition_to(ListingStatus::Sold));
    }

    #[test]
    fn test_order_never_regresses_from_paid() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn test_cancelled_and_refunded_are_terminal() {
        for status in [OrderStatus::Cancelled, OrderStatus::Refunded] {
            assert!(status.is_terminal());
            for next in [
                OrderStatus::Pending,
                OrderStatus::Paid,
                OrderStatus::Cancelled,
                OrderStatus::Refunded,
            ] {
                assert!(!status.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_fulfillment_moves_forward_only() {
        use FulfillmentStatus::*;
        assert!(Shipped.can_advance_to(InTransit));
        assert!(InTransit.can_advance_to(OutForDelivery));
        assert!(OutForDelivery.can_advance_to(Delivered));
        assert!(!OutForDelivery.can_advance_to(InTransit));
        assert!(!InTransit.can_advance_to(InTransit));
        assert!(!Delivered.can_advance_to(Exception));
        assert!(!Delivered.can_advance_to(InTransit));
    }

    #[test]
    fn test_fulfillment_exception_handling() {
        use FulfillmentStatus::*;
        assert!(InTransit.can_advance_to(Exception));
        assert!(!Exception.can_advance_to(Exception));
        assert!(Exception.can_advance_to(Delivered));
        assert!(Exception.can_advance_to(InTransit));
        assert!(!Exception.can_advance_to(Shipped));
    }

    #[test]
    fn test_status_strings_round_trip_through_from_str() {
        for status in [
            OrderEventType::OrderCreated,
            OrderEventType::DeliveryException,
            OrderEventType::OrderRefunded,
        ] {
            assert_eq!(status.as_str().parse::<OrderEventType>().unwrap(), status);
        }
        assert!("shipped".parse::<FulfillmentStatus>().is_err());
    }

    #[test]
    fn test_serde_matches_database_representation() {
        let json = serde_json::to_string(&FulfillmentStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"OUT_FOR_DELIVERY\"");
        let json = serde_json::to_string(&OrderEventType::PaymentReceived).unwrap();
        assert_eq!(json, "\"PAYMENT_RECEIVED\"");
    }
}
