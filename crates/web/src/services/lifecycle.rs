//! Order payment-status transitions.
//!
//! [`OrderLifecycle`] is the only writer of `orders.status`. The purchase-success
//! page and the payment webhook both call [`OrderLifecycle::mark_paid`], which
//! locks the order and its listing and applies the transition at most once.

use sqlx::PgPool;

use kado_core::{ListingId, OrderEventType, OrderId, OrderStatus, UserId};

use crate::db::{AuditAction, RepositoryError, audit_log, listings, orders};
use crate::error::AppError;
use crate::models::Order;

/// Errors from a lifecycle transition.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Order not found")]
    NotFound,

    #[error("Order belongs to another buyer")]
    NotBuyer,

    #[error("Order does not match listing")]
    ListingMismatch,

    #[error("Order is {0} and cannot become {1}")]
    InvalidTransition(OrderStatus, OrderStatus),

    #[error(transparent)]
    Database(#[from] RepositoryError),
}

impl From<sqlx::Error> for LifecycleError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(RepositoryError::Database(e))
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound => Self::NotFound(err.to_string()),
            LifecycleError::NotBuyer => Self::Forbidden(err.to_string()),
            LifecycleError::ListingMismatch => Self::BadRequest(err.to_string()),
            LifecycleError::InvalidTransition(..) => Self::Conflict(err.to_string()),
            LifecycleError::Database(e) => Self::Database(e),
        }
    }
}

/// Who is confirming a payment, and what they claim about it.
#[derive(Debug, Clone, Copy)]
pub struct PaymentConfirmation<'a> {
    pub order_id: OrderId,
    /// Listing the caller believes the order is for; checked when present.
    pub listing_id: Option<ListingId>,
    /// Buyer confirming on the success page; checked when present.
    pub buyer_id: Option<&'a UserId>,
    pub payment_intent_id: Option<&'a str>,
    /// `success_page` or `webhook`, recorded in event metadata.
    pub source: &'static str,
}

/// Result of a transition attempt.
#[derive(Debug, Clone)]
pub struct Transition {
    pub order: Order,
    /// `false` when the order was already in the target state.
    pub applied: bool,
}

/// Single authority for order status changes.
pub struct OrderLifecycle<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderLifecycle<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Mark an order PAID and its listing SOLD, once.
    ///
    /// Runs in one transaction holding row locks on the order and the listing.
    /// A second call (from the other path or a retry) finds the order PAID and
    /// returns `applied: false` without writing anything.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError` if the order is missing, belongs to another
    /// buyer, is for another listing, or was cancelled or refunded.
    pub async fn mark_paid(
        &self,
        confirmation: PaymentConfirmation<'_>,
    ) -> Result<Transition, LifecycleError> {
        let mut tx = self.pool.begin().await?;

        let order = orders::lock(&mut tx, confirmation.order_id)
            .await?
            .ok_or(LifecycleError::NotFound)?;

        if let Some(buyer) = confirmation.buyer_id
            && order.buyer_id != *buyer
        {
            return Err(LifecycleError::NotBuyer);
        }
        if let Some(listing_id) = confirmation.listing_id
            && order.listing_id != listing_id
        {
            return Err(LifecycleError::ListingMismatch);
        }

        let listing = listings::lock(&mut tx, order.listing_id).await?;

        match order.status {
            OrderStatus::Paid => {
                tx.commit().await?;
                tracing::debug!(order_id = %order.id, source = confirmation.source, "Order already paid");
                return Ok(Transition {
                    order,
                    applied: false,
                });
            }
            OrderStatus::Pending => {}
            other => return Err(LifecycleError::InvalidTransition(other, OrderStatus::Paid)),
        }

        let changed = orders::transition_status(
            &mut tx,
            order.id,
            OrderStatus::Pending,
            OrderStatus::Paid,
            confirmation.payment_intent_id,
        )
        .await?;
        if !changed {
            // Unreachable while the row lock is held; treat as a no-op.
            tx.commit().await?;
            return Ok(Transition {
                order,
                applied: false,
            });
        }

        let listing_sold = match listing {
            Some(ref listing) => listings::mark_sold(&mut tx, listing.id).await?,
            None => false,
        };
        if !listing_sold {
            tracing::warn!(
                order_id = %order.id,
                listing_id = %order.listing_id,
                "Paid order's listing was not PUBLISHED; listing left unchanged"
            );
        }

        let metadata = serde_json::json!({
            "source": confirmation.source,
            "paymentIntentId": confirmation.payment_intent_id,
            "amountCents": order.total_cents,
            "currency": order.currency,
        });
        orders::insert_event(&mut tx, order.id, OrderEventType::PaymentReceived, &metadata).await?;
        audit_log::record(
            &mut tx,
            confirmation.buyer_id.or(Some(&order.buyer_id)),
            AuditAction::PaymentCompleted,
            "order",
            &order.id.to_string(),
            &metadata,
        )
        .await?;

        let order = orders::lock(&mut tx, order.id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            listing_id = %order.listing_id,
            source = confirmation.source,
            "Order marked paid"
        );
        Ok(Transition {
            order,
            applied: true,
        })
    }

    /// Cancel a PENDING order whose checkout was abandoned.
    ///
    /// No-op (`applied: false`) for orders that are no longer PENDING.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::NotFound` or a database error.
    pub async fn cancel(&self, order_id: OrderId, reason: &str) -> Result<Transition, LifecycleError> {
        self.settle(
            order_id,
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            OrderEventType::OrderCancelled,
            AuditAction::OrderCancelled,
            serde_json::json!({ "reason": reason }),
        )
        .await
    }

    /// Mark a PAID order refunded. The listing stays SOLD.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::NotFound` or a database error.
    pub async fn refund(
        &self,
        order_id: OrderId,
        amount_refunded_cents: Option<i64>,
    ) -> Result<Transition, LifecycleError> {
        self.settle(
            order_id,
            OrderStatus::Paid,
            OrderStatus::Refunded,
            OrderEventType::OrderRefunded,
            AuditAction::OrderRefunded,
            serde_json::json!({ "amountRefundedCents": amount_refunded_cents }),
        )
        .await
    }

    async fn settle(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        event: OrderEventType,
        action: AuditAction,
        metadata: serde_json::Value,
    ) -> Result<Transition, LifecycleError> {
        debug_assert!(from.can_transition_to(to));
        let mut tx = self.pool.begin().await?;

        let order = orders::lock(&mut tx, order_id)
            .await?
            .ok_or(LifecycleError::NotFound)?;

        if order.status != from
            || !orders::transition_status(&mut tx, order.id, from, to, None).await?
        {
            tx.commit().await?;
            tracing::info!(
                order_id = %order.id,
                status = %order.status,
                target = %to,
                "Order not in expected status; transition skipped"
            );
            return Ok(Transition {
                order,
                applied: false,
            });
        }

        orders::insert_event(&mut tx, order.id, event, &metadata).await?;
        audit_log::record(&mut tx, None, action, "order", &order.id.to_string(), &metadata).await?;

        let order = orders::lock(&mut tx, order.id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, status = %to, "Order status changed");
        Ok(Transition {
            order,
            applied: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_errors_map_to_http_statuses() {
        use axum::http::StatusCode;

        assert_eq!(AppError::from(LifecycleError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(LifecycleError::NotBuyer).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::from(LifecycleError::ListingMismatch).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(LifecycleError::InvalidTransition(
                OrderStatus::Cancelled,
                OrderStatus::Paid
            ))
            .status(),
            StatusCode::CONFLICT
        );
    }
}
