//! Invitation-code redemption against a real database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

use helpers::*;
use kado_web::db::InvitationCodeRepository;
use kado_web::services::invitations::{CODE_USED, RedeemError, redeem, validate};
use sqlx::PgPool;

async fn codes_used_by(pool: &PgPool, user: &kado_core::UserId) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM kado.invitation_codes WHERE used_by = $1")
        .bind(user)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn redemption_id(pool: &PgPool, code: &str) -> String {
    let code = kado_core::InvitationCode::parse(code).unwrap();
    InvitationCodeRepository::new(pool)
        .get_by_code(&code)
        .await
        .unwrap()
        .unwrap()
        .id
        .to_string()
}

#[sqlx::test]
async fn test_redeem_then_validate_reports_used(pool: PgPool) {
    let ash = user(&pool, "ash").await;
    insert_codes(&pool, &["PIKACHU-AB12"]).await;

    assert!(validate(&pool, "pikachu-ab12").await.unwrap().valid);

    let redemption = redeem(&pool, &ash, "  pikachu-ab12 ").await.unwrap();
    assert_eq!(redemption.code, "PIKACHU-AB12");
    assert!(!redemption.already_redeemed);

    let validation = validate(&pool, "PIKACHU-AB12").await.unwrap();
    assert!(!validation.valid);
    assert_eq!(validation.error.as_deref(), Some(CODE_USED));
    assert_eq!(
        audit_count(&pool, "invitation_redeemed", &redemption_id(&pool, "PIKACHU-AB12").await)
            .await,
        1
    );
}

#[sqlx::test]
async fn test_second_redemption_returns_first_code(pool: PgPool) {
    let ash = user(&pool, "ash").await;
    insert_codes(&pool, &["PIKACHU-AB12", "EEVEE-ZZ99"]).await;

    redeem(&pool, &ash, "PIKACHU-AB12").await.unwrap();
    let again = redeem(&pool, &ash, "EEVEE-ZZ99").await.unwrap();

    assert_eq!(again.code, "PIKACHU-AB12");
    assert!(again.already_redeemed);
    assert_eq!(codes_used_by(&pool, &ash).await, 1);
    assert!(validate(&pool, "EEVEE-ZZ99").await.unwrap().valid);
}

#[sqlx::test]
async fn test_concurrent_redemptions_by_one_user_claim_one_code(pool: PgPool) {
    let ash = user(&pool, "ash").await;
    insert_codes(&pool, &["PIKACHU-AB12", "EEVEE-ZZ99"]).await;

    let (a, b) = tokio::join!(
        redeem(&pool, &ash, "PIKACHU-AB12"),
        redeem(&pool, &ash, "EEVEE-ZZ99"),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.code, b.code, "both calls should report the same code");
    assert!(a.already_redeemed ^ b.already_redeemed);
    assert_eq!(codes_used_by(&pool, &ash).await, 1);
}

#[sqlx::test]
async fn test_code_used_by_another_user_is_rejected(pool: PgPool) {
    let ash = user(&pool, "ash").await;
    let gary = user(&pool, "gary").await;
    insert_codes(&pool, &["PIKACHU-AB12"]).await;

    redeem(&pool, &ash, "PIKACHU-AB12").await.unwrap();
    let err = redeem(&pool, &gary, "PIKACHU-AB12").await.unwrap_err();

    assert!(matches!(err, RedeemError::AlreadyUsed));
    assert_eq!(codes_used_by(&pool, &gary).await, 0);
}

#[sqlx::test]
async fn test_unknown_code_is_invalid(pool: PgPool) {
    let ash = user(&pool, "ash").await;

    let err = redeem(&pool, &ash, "MEWTWO-0000").await.unwrap_err();
    assert!(matches!(err, RedeemError::Invalid));
    assert!(!validate(&pool, "MEWTWO-0000").await.unwrap().valid);
}
