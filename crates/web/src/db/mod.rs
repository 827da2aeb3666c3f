//! Database operations for the marketplace `PostgreSQL` database.
//!
//! ## Tables (schema `kado`)
//!
//! - `users` - Identity-provider subjects with profile and payment ids
//! - `listings` - Seller postings (DRAFT / PUBLISHED / SOLD)
//! - `orders` / `order_events` - Purchases and their append-only timeline
//! - `invitation_codes` - Single-use signup codes
//! - `cards` / `grading_certificates` / `sales_data` - Ingested reference data
//! - `audit_log` - Who did what to which entity
//! - `processed_webhook_events` - Payment webhook idempotency
//!
//! Sessions live in `tower_sessions.session`.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/web/migrations/` and run via:
//! ```bash
//! cargo run -p kado-cli -- migrate
//! ```
//!
//! Repositories borrow the pool. Operations that must run inside a caller's
//! transaction take `&mut PgConnection` instead.

pub mod audit_log;
pub mod cards;
pub mod invitation_codes;
pub mod listings;
pub mod orders;
pub mod users;
pub mod webhook_events;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use audit_log::{AuditAction, AuditLogRepository};
pub use cards::CardRepository;
pub use invitation_codes::InvitationCodeRepository;
pub use listings::ListingRepository;
pub use orders::OrderRepository;
pub use users::UserRepository;
pub use webhook_events::WebhookEventRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., taken slug).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
    pub(crate) fn from_unique(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
