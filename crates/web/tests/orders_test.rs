//! Order creation, payment and shipping against a real database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

use axum::http::StatusCode;
use helpers::*;
use kado_core::{FulfillmentStatus, ListingStatus, OrderEventType, OrderStatus};
use kado_web::db::{ListingRepository, OrderRepository};
use kado_web::services::checkout::{CheckoutOptions, start_checkout};
use kado_web::services::lifecycle::{OrderLifecycle, PaymentConfirmation};
use kado_web::services::shipping::ship_order;
use sqlx::PgPool;

// ============================================================================
// Order creation
// ============================================================================

#[sqlx::test]
async fn test_pending_order_snapshots_listing_price(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let listing = published_listing(&pool, &seller, 1999).await;

    let order = pending_order(&pool, &listing, &buyer).await;

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.price_cents, 1999);
    assert_eq!(order.subtotal_cents, 1999);
    assert_eq!(order.total_cents, 1999);
    assert_eq!(order.tax_cents, 0);
    assert_eq!(order.shipping_cents, 0);
    assert_eq!(order.listing_title, listing.title);

    let events = OrderRepository::new(&pool).list_events(order.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, OrderEventType::OrderCreated);
}

#[sqlx::test]
async fn test_checkout_of_draft_listing_creates_no_order(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let listing = published_listing(&pool, &seller, 1999).await;
    ListingRepository::new(&pool)
        .transition(listing.id, &seller, ListingStatus::Published, ListingStatus::Draft)
        .await
        .unwrap();

    let state = test_state(pool.clone());
    let err = start_checkout(&state, &signed_in(&buyer), listing.id, &CheckoutOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    let orders = OrderRepository::new(&pool).list_for_user(&buyer).await.unwrap();
    assert!(orders.is_empty());
}

#[sqlx::test]
async fn test_failed_checkout_cancels_pending_order(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let listing = published_listing(&pool, &seller, 1999).await;

    // The payment processor is unreachable, so no session can be opened.
    let state = test_state(pool.clone());
    let result =
        start_checkout(&state, &signed_in(&buyer), listing.id, &CheckoutOptions::default()).await;
    assert!(result.is_err());

    let orders = OrderRepository::new(&pool).list_for_user(&buyer).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Cancelled);
    assert!(orders[0].checkout_session_id.is_none());

    let events = OrderRepository::new(&pool).list_events(orders[0].id).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == OrderEventType::OrderCancelled));

    let listing = ListingRepository::new(&pool)
        .get_by_id(listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(listing.status, ListingStatus::Published);
}

// ============================================================================
// Payment
// ============================================================================

#[sqlx::test]
async fn test_concurrent_payment_confirmations_apply_once(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let listing = published_listing(&pool, &seller, 1999).await;
    let order = pending_order(&pool, &listing, &buyer).await;

    let success_page = OrderLifecycle::new(&pool);
    let webhook = OrderLifecycle::new(&pool);
    let (a, b) = tokio::join!(
        success_page.mark_paid(PaymentConfirmation {
            order_id: order.id,
            listing_id: Some(listing.id),
            buyer_id: Some(&buyer),
            payment_intent_id: Some("pi_123"),
            source: "success_page",
        }),
        webhook.mark_paid(PaymentConfirmation {
            order_id: order.id,
            listing_id: Some(listing.id),
            buyer_id: None,
            payment_intent_id: Some("pi_123"),
            source: "webhook",
        }),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.applied ^ b.applied, "exactly one call should apply");

    let paid = helpers::order(&pool, order.id).await;
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(paid.paid_at.is_some());
    assert_eq!(paid.payment_intent_id.as_deref(), Some("pi_123"));

    assert_eq!(
        audit_count(&pool, "payment_completed", &order.id.to_string()).await,
        1
    );
    let events = OrderRepository::new(&pool).list_events(order.id).await.unwrap();
    let payments = events
        .iter()
        .filter(|e| e.event_type == OrderEventType::PaymentReceived)
        .count();
    assert_eq!(payments, 1);

    let listing = ListingRepository::new(&pool)
        .get_by_id(listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(listing.status, ListingStatus::Sold);
}

#[sqlx::test]
async fn test_repeat_confirmation_is_a_noop(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let order = paid_order(&pool, &seller, &buyer).await;

    let again = OrderLifecycle::new(&pool)
        .mark_paid(PaymentConfirmation {
            order_id: order.id,
            listing_id: None,
            buyer_id: None,
            payment_intent_id: Some("pi_other"),
            source: "webhook",
        })
        .await
        .unwrap();

    assert!(!again.applied);
    assert_eq!(again.order.status, OrderStatus::Paid);
    assert_eq!(again.order.payment_intent_id.as_deref(), Some("pi_test"));
    assert_eq!(
        audit_count(&pool, "payment_completed", &order.id.to_string()).await,
        1
    );
}

#[sqlx::test]
async fn test_cancelled_order_cannot_become_paid(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let listing = published_listing(&pool, &seller, 1999).await;
    let order = pending_order(&pool, &listing, &buyer).await;

    let lifecycle = OrderLifecycle::new(&pool);
    assert!(lifecycle.cancel(order.id, "expired").await.unwrap().applied);
    let err = lifecycle
        .mark_paid(PaymentConfirmation {
            order_id: order.id,
            listing_id: Some(listing.id),
            buyer_id: Some(&buyer),
            payment_intent_id: None,
            source: "success_page",
        })
        .await
        .unwrap_err();
    assert_eq!(
        kado_web::error::AppError::from(err).status(),
        StatusCode::CONFLICT
    );
    assert_eq!(
        helpers::order(&pool, order.id).await.status,
        OrderStatus::Cancelled
    );
}

// ============================================================================
// Shipping
// ============================================================================

async fn shipping_carrier(pool: &PgPool, order: &kado_web::models::Order) -> Option<String> {
    sqlx::query_scalar("SELECT shipping_carrier FROM kado.orders WHERE id = $1")
        .bind(order.id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test]
async fn test_unpaid_order_cannot_ship(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let listing = published_listing(&pool, &seller, 1999).await;
    let order = pending_order(&pool, &listing, &buyer).await;

    let state = test_state(pool.clone());
    let err = ship_order(&state, &seller, order.id, "usps", "9400111899223344556677")
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(shipping_carrier(&pool, &order).await, None);
}

#[sqlx::test]
async fn test_ship_paid_order(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let order = paid_order(&pool, &seller, &buyer).await;

    // Tracking registration fails and email is disabled; the shipment still stands.
    let state = test_state(pool.clone());
    let shipment = ship_order(&state, &seller, order.id, "usps", "9400 1118 9922 3344 5566 77")
        .await
        .unwrap();

    assert!(!shipment.email_sent);
    assert_eq!(shipment.order.shipping_carrier.as_deref(), Some("usps"));
    assert_eq!(
        shipment.order.tracking_number.as_deref(),
        Some("9400111899223344556677")
    );
    assert_eq!(
        shipment.order.fulfillment_status,
        Some(FulfillmentStatus::Shipped)
    );
    assert!(shipment.order.shipped_at.is_some());
    assert_eq!(
        audit_count(&pool, "order_shipped", &order.id.to_string()).await,
        1
    );

    let found = OrderRepository::new(&pool)
        .get_by_tracking("9400111899223344556677")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, order.id);
}

#[sqlx::test]
async fn test_shipped_order_cannot_ship_again(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let order = paid_order(&pool, &seller, &buyer).await;
    let state = test_state(pool.clone());

    ship_order(&state, &seller, order.id, "usps", "9400111899223344556677")
        .await
        .unwrap();
    let err = ship_order(&state, &seller, order.id, "ups", "1Z999AA10123456784")
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(shipping_carrier(&pool, &order).await.as_deref(), Some("usps"));
}

#[sqlx::test]
async fn test_concurrent_shipments_record_one(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let order = paid_order(&pool, &seller, &buyer).await;
    let state = test_state(pool.clone());

    let (a, b) = tokio::join!(
        ship_order(&state, &seller, order.id, "usps", "9400111899223344556677"),
        ship_order(&state, &seller, order.id, "usps", "9400111899223344556688"),
    );
    assert!(a.is_ok() ^ b.is_ok(), "exactly one shipment should be recorded");

    let events = OrderRepository::new(&pool).list_events(order.id).await.unwrap();
    let shipped = events
        .iter()
        .filter(|e| e.event_type == OrderEventType::OrderShipped)
        .count();
    assert_eq!(shipped, 1);
}

#[sqlx::test]
async fn test_tracking_lookup_is_indexed_by_number(pool: PgPool) {
    let definition: String = sqlx::query_scalar(
        "SELECT indexdef FROM pg_indexes WHERE schemaname = 'kado' AND indexname = 'orders_tracking_idx'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    assert!(definition.contains("(tracking_number)"), "{definition}");
    assert!(!definition.contains("shipping_carrier"), "{definition}");
}
