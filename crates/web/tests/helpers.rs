//! Fixtures for the database-backed tests.
//!
//! `#[sqlx::test]` creates a fresh database per test and runs
//! `crates/web/migrations` against it; set `DATABASE_URL` to a Postgres server
//! the tests may create databases on.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use secrecy::SecretString;
use sqlx::PgPool;

use kado_core::{CurrencyCode, InvitationCode, ListingStatus, OrderId, UserId};
use kado_web::config::{
    AppEnv, IdentityConfig, KadoConfig, MediaConfig, PaymentsConfig, TrackingConfig,
};
use kado_web::db::{InvitationCodeRepository, ListingRepository, OrderRepository, UserRepository};
use kado_web::models::{CurrentUser, Listing, ListingDraft, Order};
use kado_web::services::lifecycle::{OrderLifecycle, PaymentConfirmation};
use kado_web::state::AppState;

/// Nothing listens here, so every upstream call fails fast.
const UNREACHABLE: &str = "http://127.0.0.1:1";

pub fn test_config() -> KadoConfig {
    KadoConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: "http://kado.test".to_string(),
        session_secret: SecretString::from("database-test-session-secret-41c9e2aa"),
        env: AppEnv::Development,
        admin_user_ids: HashSet::new(),
        require_invitation: true,
        identity: IdentityConfig {
            issuer_url: UNREACHABLE.to_string(),
            client_id: "kado-test".to_string(),
            client_secret: SecretString::from("idp-secret"),
        },
        payments: PaymentsConfig {
            api_base: UNREACHABLE.to_string(),
            secret_key: SecretString::from("sk_test_database"),
            webhook_secret: SecretString::from("whsec_database"),
        },
        tracking: TrackingConfig {
            api_base: UNREACHABLE.to_string(),
            api_key: SecretString::from("shippo_test_database"),
            webhook_token: SecretString::from("tracking-token-database"),
        },
        media: MediaConfig {
            cloud_name: "kado".to_string(),
            api_key: "media-key".to_string(),
            api_secret: SecretString::from("media-secret"),
            avatar_preset: None,
            listing_preset: None,
        },
        email: None,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// App state over the test database, with email disabled.
pub fn test_state(pool: PgPool) -> AppState {
    AppState::new(test_config(), pool).expect("test state")
}

pub async fn user(pool: &PgPool, id: &str) -> UserId {
    let id = UserId::new(id);
    UserRepository::new(pool)
        .upsert(&id, Some(&format!("{id}@kado.test")), None)
        .await
        .expect("upsert user");
    id
}

pub fn signed_in(id: &UserId) -> CurrentUser {
    CurrentUser {
        id: id.clone(),
        email: Some(format!("{id}@kado.test")),
        display_name: None,
        profile_complete: true,
    }
}

/// A PUBLISHED listing priced at `price_cents` USD.
pub async fn published_listing(pool: &PgPool, seller: &UserId, price_cents: i64) -> Listing {
    let repo = ListingRepository::new(pool);
    let draft = ListingDraft {
        title: "Charizard Base Set PSA 10".to_string(),
        description: String::new(),
        image_url: None,
        price_cents,
        currency: CurrencyCode::Usd,
        card_id: None,
        certificate_id: None,
    };
    let listing = repo.create(seller, &draft).await.expect("create listing");
    repo.transition(listing.id, seller, ListingStatus::Draft, ListingStatus::Published)
        .await
        .expect("publish listing")
}

pub async fn pending_order(pool: &PgPool, listing: &Listing, buyer: &UserId) -> Order {
    OrderRepository::new(pool)
        .create_pending(listing, buyer)
        .await
        .expect("create order")
}

/// A PENDING order for a fresh listing, confirmed paid.
pub async fn paid_order(pool: &PgPool, seller: &UserId, buyer: &UserId) -> Order {
    let listing = published_listing(pool, seller, 1999).await;
    let order = pending_order(pool, &listing, buyer).await;
    OrderLifecycle::new(pool)
        .mark_paid(PaymentConfirmation {
            order_id: order.id,
            listing_id: Some(listing.id),
            buyer_id: Some(buyer),
            payment_intent_id: Some("pi_test"),
            source: "success_page",
        })
        .await
        .expect("mark paid")
        .order
}

pub async fn order(pool: &PgPool, id: OrderId) -> Order {
    OrderRepository::new(pool)
        .get_by_id(id)
        .await
        .expect("load order")
        .expect("order exists")
}

pub async fn insert_codes(pool: &PgPool, codes: &[&str]) {
    let codes: Vec<InvitationCode> = codes
        .iter()
        .map(|c| InvitationCode::parse(c).expect("valid code"))
        .collect();
    InvitationCodeRepository::new(pool)
        .insert_many(&codes, None)
        .await
        .expect("insert codes");
}

/// Audit rows for one entity and action.
pub async fn audit_count(pool: &PgPool, action: &str, entity_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM kado.audit_log WHERE action = $1 AND entity_id = $2")
        .bind(action)
        .bind(entity_id)
        .fetch_one(pool)
        .await
        .expect("count audit rows")
}
