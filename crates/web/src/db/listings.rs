//! Listing repository.

use sqlx::{PgConnection, PgPool};

use kado_core::{ListingId, ListingStatus, UserId};

use super::RepositoryError;
use crate::models::{Listing, ListingDraft};

const LISTING_COLUMNS: &str = "id, seller_id, title, description, image_url, price_cents, \
     currency, status, card_id, certificate_id, created_at, updated_at, published_at";

/// Repository for listing database operations.
pub struct ListingRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ListingRepository<'a> {
    /// Create a new listing repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a listing by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ListingId) -> Result<Option<Listing>, RepositoryError> {
        let listing = sqlx::query_as::<_, Listing>(&format!(
            "SELECT {LISTING_COLUMNS} FROM kado.listings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(listing)
    }

    /// Published listings, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_published(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Listing>, RepositoryError> {
        let listings = sqlx::query_as::<_, Listing>(&format!(
            r"
            SELECT {LISTING_COLUMNS} FROM kado.listings
            WHERE status = 'PUBLISHED'
            ORDER BY published_at DESC NULLS LAST, id DESC
            LIMIT $1 OFFSET $2
            "
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(listings)
    }

    /// Every listing regardless of status, newest first (admin view).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(
        &self,
        status: Option<ListingStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Listing>, RepositoryError> {
        let listings = sqlx::query_as::<_, Listing>(&format!(
            r"
            SELECT {LISTING_COLUMNS} FROM kado.listings
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(listings)
    }

    /// A seller's own listings in every status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_seller(&self, seller: &UserId) -> Result<Vec<Listing>, RepositoryError> {
        let listings = sqlx::query_as::<_, Listing>(&format!(
            "SELECT {LISTING_COLUMNS} FROM kado.listings WHERE seller_id = $1 ORDER BY created_at DESC"
        ))
        .bind(seller)
        .fetch_all(self.pool)
        .await?;

        Ok(listings)
    }

    /// Create a DRAFT listing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        seller: &UserId,
        draft: &ListingDraft,
    ) -> Result<Listing, RepositoryError> {
        let listing = sqlx::query_as::<_, Listing>(&format!(
            r"
            INSERT INTO kado.listings
                (seller_id, title, description, image_url, price_cents, currency,
                 card_id, certificate_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {LISTING_COLUMNS}
            "
        ))
        .bind(seller)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.image_url.as_deref())
        .bind(draft.price_cents)
        .bind(draft.currency)
        .bind(draft.card_id)
        .bind(draft.certificate_id)
        .fetch_one(self.pool)
        .await?;

        Ok(listing)
    }

    /// Replace the editable fields of a listing the seller owns.
    ///
    /// The `status <> 'SOLD'` guard keeps sold listings frozen even if the caller
    /// raced a purchase.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no unsold listing matched.
    pub async fn update(
        &self,
        id: ListingId,
        seller: &UserId,
        draft: &ListingDraft,
    ) -> Result<Listing, RepositoryError> {
        sqlx::query_as::<_, Listing>(&format!(
            r"
            UPDATE kado.listings
            SET title = $3, description = $4, image_url = $5, price_cents = $6,
                currency = $7, card_id = $8, certificate_id = $9, updated_at = NOW()
            WHERE id = $1 AND seller_id = $2 AND status <> 'SOLD'
            RETURNING {LISTING_COLUMNS}
            "
        ))
        .bind(id)
        .bind(seller)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.image_url.as_deref())
        .bind(draft.price_cents)
        .bind(draft.currency)
        .bind(draft.card_id)
        .bind(draft.certificate_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Move a listing between statuses with a compare-and-set on the current status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the listing was not in `from`.
    pub async fn transition(
        &self,
        id: ListingId,
        seller: &UserId,
        from: ListingStatus,
        to: ListingStatus,
    ) -> Result<Listing, RepositoryError> {
        sqlx::query_as::<_, Listing>(&format!(
            r"
            UPDATE kado.listings
            SET status = $4,
                published_at = CASE WHEN $4 = 'PUBLISHED' THEN NOW() ELSE published_at END,
                updated_at = NOW()
            WHERE id = $1 AND seller_id = $2 AND status = $3
            RETURNING {LISTING_COLUMNS}
            "
        ))
        .bind(id)
        .bind(seller)
        .bind(from)
        .bind(to)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}

/// Lock a listing row for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock(
    conn: &mut PgConnection,
    id: ListingId,
) -> Result<Option<Listing>, RepositoryError> {
    let listing = sqlx::query_as::<_, Listing>(&format!(
        "SELECT {LISTING_COLUMNS} FROM kado.listings WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(listing)
}

/// Mark a locked PUBLISHED listing as SOLD. Returns whether a row changed.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn mark_sold(conn: &mut PgConnection, id: ListingId) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE kado.listings SET status = 'SOLD', updated_at = NOW() \
         WHERE id = $1 AND status = 'PUBLISHED'",
    )
    .bind(id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}
