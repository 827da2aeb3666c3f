//! User repository for database operations.

use sqlx::PgPool;

use kado_core::{Slug, UserId};

use super::RepositoryError;
use crate::models::User;

const USER_COLUMNS: &str = "id, email, display_name, avatar_url, slug, payments_customer_id, \
     payments_account_id, created_at, updated_at";

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by identity subject.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM kado.users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Create the user on first sight, or refresh the email from the identity provider.
    ///
    /// Display name is only filled in when the user has not chosen one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(
        &self,
        id: &UserId,
        email: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r"
            INSERT INTO kado.users (id, email, display_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET email = COALESCE(EXCLUDED.email, kado.users.email),
                display_name = COALESCE(kado.users.display_name, EXCLUDED.display_name),
                updated_at = NOW()
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(email)
        .bind(display_name)
        .fetch_one(self.pool)
        .await?;

        Ok(user)
    }

    /// Whether `slug` is free for `user` (their own current slug counts as free).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn slug_available(
        &self,
        slug: &Slug,
        user: Option<&UserId>,
    ) -> Result<bool, RepositoryError> {
        let taken: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1 FROM kado.users
                WHERE LOWER(slug) = LOWER($1) AND ($2::TEXT IS NULL OR id <> $2)
            )
            ",
        )
        .bind(slug.as_str())
        .bind(user)
        .fetch_one(self.pool)
        .await?;

        Ok(!taken)
    }

    /// Update display name and/or slug.
    ///
    /// `None` leaves a field unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken (case-insensitive),
    /// `RepositoryError::NotFound` if the user does not exist.
    pub async fn update_profile(
        &self,
        id: &UserId,
        display_name: Option<&str>,
        slug: Option<&Slug>,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            r"
            UPDATE kado.users
            SET display_name = COALESCE($2, display_name),
                slug = COALESCE($3, slug),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(display_name)
        .bind(slug.map(Slug::as_str))
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "slug is already taken"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Set the avatar URL.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_avatar_url(&self, id: &UserId, url: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE kado.users SET avatar_url = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(url)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Persist the payment processor customer id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_payments_customer_id(
        &self,
        id: &UserId,
        customer_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE kado.users SET payments_customer_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(customer_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Persist the payment processor connected account id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the account is linked to another user.
    pub async fn set_payments_account_id(
        &self,
        id: &UserId,
        account_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE kado.users SET payments_account_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(account_id)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "account already linked"))?;

        Ok(())
    }
}
