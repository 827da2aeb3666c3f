//! Invitation-code validation, redemption and generation.

use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;

use kado_core::{InvitationCode, UserId};

use crate::db::{AuditAction, InvitationCodeRepository, RepositoryError, audit_log, invitation_codes};
use crate::error::AppError;
use crate::models::InvitationCodeRecord;

/// Message for codes that do not exist (or are malformed).
pub const INVALID_CODE: &str = "Invalid invitation code";

/// Message for codes someone else redeemed.
pub const CODE_USED: &str = "This invitation code has already been used";

/// Redemption failures.
#[derive(Debug, thiserror::Error)]
pub enum RedeemError {
    #[error("Invalid invitation code")]
    Invalid,
    #[error("This invitation code has already been used")]
    AlreadyUsed,
    #[error(transparent)]
    Database(#[from] RepositoryError),
}

impl From<sqlx::Error> for RedeemError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(RepositoryError::Database(e))
    }
}

impl From<RedeemError> for AppError {
    fn from(err: RedeemError) -> Self {
        match err {
            RedeemError::Invalid => Self::NotFound(err.to_string()),
            RedeemError::AlreadyUsed => Self::Conflict(err.to_string()),
            RedeemError::Database(e) => Self::Database(e),
        }
    }
}

/// What redeeming a code for a user should do, given current rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemDecision {
    /// The user already holds a code; return it unchanged.
    Existing(String),
    /// Claim this unused code.
    Claim(kado_core::InvitationCodeId),
}

/// Decide a redemption from the user's current code and the requested code row.
///
/// # Errors
///
/// Returns `RedeemError::Invalid` when the code does not exist and
/// `RedeemError::AlreadyUsed` when another user holds it.
pub fn decide(
    user: &UserId,
    users_code: Option<&InvitationCodeRecord>,
    requested: Option<&InvitationCodeRecord>,
) -> Result<RedeemDecision, RedeemError> {
    if let Some(existing) = users_code {
        return Ok(RedeemDecision::Existing(existing.code.clone()));
    }
    let requested = requested.ok_or(RedeemError::Invalid)?;
    match requested.used_by {
        Some(ref holder) if holder == user => Ok(RedeemDecision::Existing(requested.code.clone())),
        Some(_) => Err(RedeemError::AlreadyUsed),
        None => Ok(RedeemDecision::Claim(requested.id)),
    }
}

/// A successful redemption.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub code: String,
    /// `true` when the user had already redeemed a code before this call.
    pub already_redeemed: bool,
}

/// Response of the public validation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Validation {
    const fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn invalid(message: &str) -> Self {
        Self {
            valid: false,
            error: Some(message.to_string()),
        }
    }
}

/// Check whether a code exists and is unused.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the lookup fails.
pub async fn validate(pool: &PgPool, raw: &str) -> Result<Validation, RepositoryError> {
    let Ok(code) = InvitationCode::parse(raw) else {
        return Ok(Validation::invalid(INVALID_CODE));
    };
    Ok(match InvitationCodeRepository::new(pool).get_by_code(&code).await? {
        None => Validation::invalid(INVALID_CODE),
        Some(record) if record.is_used() => Validation::invalid(CODE_USED),
        Some(_) => Validation::ok(),
    })
}

/// Redeem a code for `user`. Idempotent per user.
///
/// Runs in one transaction with the code row locked. If a concurrent request
/// by the same user claimed a different code first, the unique index on
/// `used_by` rejects this claim and the user's existing code is returned.
///
/// # Errors
///
/// Returns `RedeemError::Invalid`, `RedeemError::AlreadyUsed`, or a database error.
pub async fn redeem(pool: &PgPool, user: &UserId, raw: &str) -> Result<Redemption, RedeemError> {
    let code = InvitationCode::parse(raw).map_err(|_| RedeemError::Invalid)?;

    let mut tx = pool.begin().await?;
    let users_code = invitation_codes::find_by_user(&mut tx, user).await?;
    let requested = if users_code.is_some() {
        None
    } else {
        invitation_codes::lock_by_code(&mut tx, &code).await?
    };

    let id = match decide(user, users_code.as_ref(), requested.as_ref())? {
        RedeemDecision::Existing(code) => {
            tx.commit().await?;
            return Ok(Redemption {
                code,
                already_redeemed: true,
            });
        }
        RedeemDecision::Claim(id) => id,
    };

    let claimed = match invitation_codes::claim(&mut tx, id, user).await {
        Ok(record) => record,
        Err(RepositoryError::Conflict(_)) => {
            drop(tx);
            return recover_existing(pool, user).await;
        }
        Err(RepositoryError::NotFound) => return Err(RedeemError::AlreadyUsed),
        Err(e) => return Err(e.into()),
    };

    audit_log::record(
        &mut tx,
        Some(user),
        AuditAction::InvitationRedeemed,
        "invitation_code",
        &claimed.id.to_string(),
        &serde_json::json!({ "code": claimed.code }),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user, code = %claimed.code, "Invitation code redeemed");
    Ok(Redemption {
        code: claimed.code,
        already_redeemed: false,
    })
}

async fn recover_existing(pool: &PgPool, user: &UserId) -> Result<Redemption, RedeemError> {
    let existing = InvitationCodeRepository::new(pool)
        .get_by_user(user)
        .await?
        .ok_or(RedeemError::Invalid)?;
    tracing::info!(user_id = %user, "Concurrent redemption resolved to existing code");
    Ok(Redemption {
        code: existing.code,
        already_redeemed: true,
    })
}

/// Generate `count` random codes of the form `WORD-XXXX`.
#[must_use]
pub fn generate_codes(count: usize) -> Vec<InvitationCode> {
    let words = InvitationCode::WORDS;
    let alphabet = InvitationCode::SUFFIX_ALPHABET;
    let mut rng = rand::rng();
    (0..count)
        .filter_map(|_| {
            let word = words.get(rng.random_range(0..words.len()))?;
            let suffix: String = (0..InvitationCode::SUFFIX_LENGTH)
                .filter_map(|_| alphabet.get(rng.random_range(0..alphabet.len())))
                .map(|&b| char::from(b))
                .collect();
            Some(InvitationCode::from_parts(word, &suffix))
        })
        .collect()
}

/// Generate and store `count` codes. Returns the codes actually inserted
/// (collisions with existing codes are skipped, so this may be fewer).
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn create_codes(
    pool: &PgPool,
    count: usize,
    created_by: Option<&UserId>,
) -> Result<Vec<InvitationCodeRecord>, RepositoryError> {
    let codes = generate_codes(count);
    let records = InvitationCodeRepository::new(pool)
        .insert_many(&codes, created_by)
        .await?;

    let mut conn = pool.acquire().await?;
    audit_log::record(
        &mut conn,
        created_by,
        AuditAction::InvitationCodesGenerated,
        "invitation_code",
        "batch",
        &serde_json::json!({ "requested": count, "created": records.len() }),
    )
    .await?;

    tracing::info!(requested = count, created = records.len(), "Generated invitation codes");
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use kado_core::InvitationCodeId;

    use super::*;

    fn record(code: &str, used_by: Option<&str>) -> InvitationCodeRecord {
        InvitationCodeRecord {
            id: InvitationCodeId::new(1),
            code: code.to_string(),
            created_by: None,
            used_by: used_by.map(UserId::new),
            used_at: used_by.map(|_| Utc::now()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_unused_code_is_claimed() {
        let user = UserId::new("ash");
        let code = record("PIKACHU-AB12", None);
        assert_eq!(
            decide(&user, None, Some(&code)).unwrap(),
            RedeemDecision::Claim(InvitationCodeId::new(1))
        );
    }

    #[test]
    fn test_second_redemption_returns_existing_code() {
        let user = UserId::new("ash");
        let mine = record("PIKACHU-AB12", Some("ash"));
        let other = record("EEVEE-ZZ99", None);
        assert_eq!(
            decide(&user, Some(&mine), Some(&other)).unwrap(),
            RedeemDecision::Existing("PIKACHU-AB12".to_string())
        );
    }

    #[test]
    fn test_code_used_by_someone_else() {
        let user = UserId::new("ash");
        let code = record("PIKACHU-AB12", Some("gary"));
        let err = decide(&user, None, Some(&code)).unwrap_err();
        assert!(matches!(err, RedeemError::AlreadyUsed));
        assert!(err.to_string().contains("already been used"));
        assert_eq!(
            AppError::from(err).status(),
            axum::http::StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_missing_code_is_invalid() {
        let err = decide(&UserId::new("ash"), None, None).unwrap_err();
        assert_eq!(err.to_string(), INVALID_CODE);
        assert_eq!(
            AppError::from(err).status(),
            axum::http::StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_generate_codes_are_canonical() {
        let codes = generate_codes(20);
        assert_eq!(codes.len(), 20);
        for code in &codes {
            assert!(code.is_canonical(), "{code:?} should be WORD-XXXX");
        }
    }

    #[test]
    fn test_validation_serializes_without_null_error() {
        let json = serde_json::to_value(Validation::ok()).unwrap();
        assert_eq!(json, serde_json::json!({ "valid": true }));
        let json = serde_json::to_value(Validation::invalid(CODE_USED)).unwrap();
        assert_eq!(json["valid"], false);
    }
}
