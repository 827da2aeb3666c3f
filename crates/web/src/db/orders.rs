//! Order and order-event repository.
//!
//! Every status write is a compare-and-set on the current status so concurrent
//! callers cannot move an order backwards.

use sqlx::{PgConnection, PgPool};

use kado_core::{
    Carrier, FulfillmentStatus, OrderEventType, OrderId, OrderStatus, TrackingNumber, UserId,
};

use super::RepositoryError;
use crate::models::{Listing, Order, OrderEvent};

const ORDER_COLUMNS: &str = "id, buyer_id, seller_id, listing_id, listing_title, \
     listing_image_url, price_cents, status, subtotal_cents, tax_cents, shipping_cents, \
     total_cents, currency, checkout_session_id, payment_intent_id, shipping_carrier, \
     tracking_number, tracking_url, fulfillment_status, created_at, updated_at, paid_at, \
     shipped_at, delivered_at";

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM kado.orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Find the order a checkout session was created for.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM kado.orders WHERE checkout_session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Find the order a payment intent settled.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM kado.orders WHERE payment_intent_id = $1"
        ))
        .bind(payment_intent_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Find the most recent shipped order with this tracking number.
    ///
    /// The tracking provider reports test shipments under its own carrier token,
    /// so the lookup does not filter on carrier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_tracking(
        &self,
        tracking_number: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM kado.orders
            WHERE tracking_number = $1
            ORDER BY shipped_at DESC NULLS LAST, id DESC
            LIMIT 1
            "
        ))
        .bind(tracking_number.trim().to_ascii_uppercase())
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Orders where `user` is buyer or seller, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user: &UserId) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM kado.orders
            WHERE buyer_id = $1 OR seller_id = $1
            ORDER BY created_at DESC
            "
        ))
        .bind(user)
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// Insert a PENDING order snapshotting the listing, plus its ORDER_CREATED event.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either insert fails.
    pub async fn create_pending(
        &self,
        listing: &Listing,
        buyer: &UserId,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            INSERT INTO kado.orders
                (buyer_id, seller_id, listing_id, listing_title, listing_image_url,
                 price_cents, status, subtotal_cents, tax_cents, shipping_cents,
                 total_cents, currency)
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $6, 0, 0, $6, $7)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(buyer)
        .bind(&listing.seller_id)
        .bind(listing.id)
        .bind(&listing.title)
        .bind(listing.image_url.as_deref())
        .bind(listing.price_cents)
        .bind(listing.currency)
        .fetch_one(&mut *tx)
        .await?;

        insert_event(
            &mut tx,
            order.id,
            OrderEventType::OrderCreated,
            &serde_json::json!({ "listingId": listing.id, "priceCents": listing.price_cents }),
        )
        .await?;

        tx.commit().await?;
        Ok(order)
    }

    /// Store the checkout session created for an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_checkout_session(
        &self,
        id: OrderId,
        session_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE kado.orders SET checkout_session_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(session_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Record shipment of a PAID, not-yet-shipped order.
    ///
    /// Returns `None` when the guard (`status = 'PAID' AND tracking_number IS NULL`)
    /// did not match, i.e. another request shipped or changed it first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_shipped(
        &self,
        id: OrderId,
        carrier: Carrier,
        tracking_number: &TrackingNumber,
        tracking_url: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            UPDATE kado.orders
            SET shipping_carrier = $2, tracking_number = $3, tracking_url = $4,
                fulfillment_status = 'SHIPPED', shipped_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'PAID' AND tracking_number IS NULL
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(carrier.as_str())
        .bind(tracking_number.as_str())
        .bind(tracking_url)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(ref order) = order {
            insert_event(
                &mut tx,
                order.id,
                OrderEventType::OrderShipped,
                &serde_json::json!({
                    "carrier": carrier.as_str(),
                    "trackingNumber": tracking_number.as_str(),
                }),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    /// Apply a tracking update if it moves fulfillment forward from `current`.
    ///
    /// Returns `None` if the order's fulfillment status was no longer `current`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn advance_fulfillment(
        &self,
        id: OrderId,
        current: FulfillmentStatus,
        next: FulfillmentStatus,
        metadata: &serde_json::Value,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            UPDATE kado.orders
            SET fulfillment_status = $3,
                delivered_at = CASE WHEN $3 = 'DELIVERED' THEN NOW() ELSE delivered_at END,
                updated_at = NOW()
            WHERE id = $1 AND fulfillment_status = $2
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(current)
        .bind(next)
        .fetch_optional(&mut *tx)
        .await?;

        if order.is_some() {
            insert_event(&mut tx, id, next.event_type(), metadata).await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    /// Timeline of an order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_events(&self, id: OrderId) -> Result<Vec<OrderEvent>, RepositoryError> {
        let events = sqlx::query_as::<_, OrderEvent>(
            r"
            SELECT id, order_id, event_type, metadata, created_at
            FROM kado.order_events
            WHERE order_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(events)
    }
}

/// Lock an order row for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock(conn: &mut PgConnection, id: OrderId) -> Result<Option<Order>, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM kado.orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(order)
}

/// Compare-and-set the payment status. Returns whether a row changed.
///
/// `paid_at` is stamped on the transition to PAID; `payment_intent_id` is kept
/// if already known.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn transition_status(
    conn: &mut PgConnection,
    id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
    payment_intent_id: Option<&str>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE kado.orders
        SET status = $3,
            paid_at = CASE WHEN $3 = 'PAID' THEN NOW() ELSE paid_at END,
            payment_intent_id = COALESCE(payment_intent_id, $4),
            updated_at = NOW()
        WHERE id = $1 AND status = $2
        ",
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(payment_intent_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Append a timeline event.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_event(
    conn: &mut PgConnection,
    order_id: OrderId,
    event_type: OrderEventType,
    metadata: &serde_json::Value,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO kado.order_events (order_id, event_type, metadata) VALUES ($1, $2, $3)",
    )
    .bind(order_id)
    .bind(event_type)
    .bind(metadata)
    .execute(conn)
    .await?;

    Ok(())
}
