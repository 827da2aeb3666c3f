//! Payment webhook idempotency records.

use sqlx::PgPool;

use super::RepositoryError;

/// Repository for processed payment webhook events.
pub struct WebhookEventRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WebhookEventRepository<'a> {
    /// Create a new webhook event repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Claim an event id. Returns `false` if it was already processed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn claim(&self, event_id: &str, event_type: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO kado.processed_webhook_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            ",
        )
        .bind(event_id)
        .bind(event_type)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Forget an event so the processor's retry is handled again.
    ///
    /// Called when handling fails after the event was claimed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn release(&self, event_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM kado.processed_webhook_events WHERE event_id = $1")
            .bind(event_id)
            .execute(self.pool)
            .await?;

        Ok(())
    }
}
