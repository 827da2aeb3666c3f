//! Append-only audit log.

use sqlx::{PgConnection, PgPool};

use kado_core::UserId;

use super::RepositoryError;

/// Actions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    CheckoutCreated,
    PaymentCompleted,
    OrderShipped,
    OrderCancelled,
    OrderRefunded,
    InvitationRedeemed,
    InvitationCodesGenerated,
    ListingPublished,
    ListingUnpublished,
}

impl AuditAction {
    /// Stored action name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckoutCreated => "checkout_created",
            Self::PaymentCompleted => "payment_completed",
            Self::OrderShipped => "order_shipped",
            Self::OrderCancelled => "order_cancelled",
            Self::OrderRefunded => "order_refunded",
            Self::InvitationRedeemed => "invitation_redeemed",
            Self::InvitationCodesGenerated => "invitation_codes_generated",
            Self::ListingPublished => "listing_published",
            Self::ListingUnpublished => "listing_unpublished",
        }
    }
}

/// Repository for audit log writes.
pub struct AuditLogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AuditLogRepository<'a> {
    /// Create a new audit log repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record an action outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record(
        &self,
        actor: Option<&UserId>,
        action: AuditAction,
        entity_type: &str,
        entity_id: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        record(
            &mut *self.pool.acquire().await?,
            actor,
            action,
            entity_type,
            entity_id,
            metadata,
        )
        .await
    }
}

/// Record an action on an existing connection (usually inside a transaction).
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn record(
    conn: &mut PgConnection,
    actor: Option<&UserId>,
    action: AuditAction,
    entity_type: &str,
    entity_id: &str,
    metadata: &serde_json::Value,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO kado.audit_log (actor_id, action, entity_type, entity_id, metadata)
        VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(actor)
    .bind(action.as_str())
    .bind(entity_type)
    .bind(entity_id)
    .bind(metadata)
    .execute(conn)
    .await?;

    Ok(())
}
