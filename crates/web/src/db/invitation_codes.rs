//! Invitation code repository.

use sqlx::{PgConnection, PgPool};

use kado_core::{InvitationCode, InvitationCodeId, UserId};

use super::RepositoryError;
use crate::models::InvitationCodeRecord;

const CODE_COLUMNS: &str = "id, code, created_by, used_by, used_at, created_at";

/// Repository for invitation code database operations.
pub struct InvitationCodeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> InvitationCodeRepository<'a> {
    /// Create a new invitation code repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Look up a code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code(
        &self,
        code: &InvitationCode,
    ) -> Result<Option<InvitationCodeRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, InvitationCodeRecord>(&format!(
            "SELECT {CODE_COLUMNS} FROM kado.invitation_codes WHERE code = $1"
        ))
        .bind(code.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// The code a user redeemed, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_user(
        &self,
        user: &UserId,
    ) -> Result<Option<InvitationCodeRecord>, RepositoryError> {
        find_by_user(&mut *self.pool.acquire().await?, user).await
    }

    /// Insert freshly generated codes, skipping any that already exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn insert_many(
        &self,
        codes: &[InvitationCode],
        created_by: Option<&UserId>,
    ) -> Result<Vec<InvitationCodeRecord>, RepositoryError> {
        let codes: Vec<&str> = codes.iter().map(InvitationCode::as_str).collect();
        let records = sqlx::query_as::<_, InvitationCodeRecord>(&format!(
            r"
            INSERT INTO kado.invitation_codes (code, created_by)
            SELECT code, $2 FROM UNNEST($1::TEXT[]) AS t(code)
            ON CONFLICT (code) DO NOTHING
            RETURNING {CODE_COLUMNS}
            "
        ))
        .bind(&codes)
        .bind(created_by)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }
}

/// The code a user redeemed, if any, on an existing connection.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn find_by_user(
    conn: &mut PgConnection,
    user: &UserId,
) -> Result<Option<InvitationCodeRecord>, RepositoryError> {
    let record = sqlx::query_as::<_, InvitationCodeRecord>(&format!(
        "SELECT {CODE_COLUMNS} FROM kado.invitation_codes WHERE used_by = $1"
    ))
    .bind(user)
    .fetch_optional(conn)
    .await?;

    Ok(record)
}

/// Lock a code row for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_by_code(
    conn: &mut PgConnection,
    code: &InvitationCode,
) -> Result<Option<InvitationCodeRecord>, RepositoryError> {
    let record = sqlx::query_as::<_, InvitationCodeRecord>(&format!(
        "SELECT {CODE_COLUMNS} FROM kado.invitation_codes WHERE code = $1 FOR UPDATE"
    ))
    .bind(code.as_str())
    .fetch_optional(conn)
    .await?;

    Ok(record)
}

/// Mark a locked, unused code as used by `user`.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` when the user already holds a code (the
/// partial unique index on `used_by`), `RepositoryError::NotFound` if the code
/// was claimed in the meantime.
pub async fn claim(
    conn: &mut PgConnection,
    id: InvitationCodeId,
    user: &UserId,
) -> Result<InvitationCodeRecord, RepositoryError> {
    sqlx::query_as::<_, InvitationCodeRecord>(&format!(
        r"
        UPDATE kado.invitation_codes
        SET used_by = $2, used_at = NOW()
        WHERE id = $1 AND used_by IS NULL
        RETURNING {CODE_COLUMNS}
        "
    ))
    .bind(id)
    .bind(user)
    .fetch_optional(conn)
    .await
    .map_err(|e| RepositoryError::from_unique(e, "user already redeemed a code"))?
    .ok_or(RepositoryError::NotFound)
}
