//! Webhook authentication through the full router.
//!
//! Only the paths that settle before the database are exercised here.

#![allow(clippy::unwrap_used)]

use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{Request, StatusCode};

use kado_integration_tests::{
    TRACKING_WEBHOOK_TOKEN, body_string, payments_signature, send, test_app,
};

fn now() -> i64 {
    i64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs(),
    )
    .unwrap()
}

fn post(uri: &str, headers: &[(&str, &str)], body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

// =============================================================================
// Payments
// =============================================================================

#[tokio::test]
async fn test_payments_webhook_requires_signature() {
    let response = send(
        test_app(),
        post("/webhooks/payments", &[], r#"{"id":"evt_1"}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_payments_webhook_rejects_bad_signature() {
    let body = r#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{}}}"#;
    let header = format!("t={},v1={}", now(), "00".repeat(32));
    let response = send(
        test_app(),
        post("/webhooks/payments", &[("stripe-signature", &header)], body),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["error"], "Invalid signature");
}

#[tokio::test]
async fn test_payments_webhook_rejects_stale_signature() {
    let body = r#"{"id":"evt_1","type":"charge.refunded","data":{"object":{}}}"#;
    let header = payments_signature(body.as_bytes(), now() - 3600);
    let response = send(
        test_app(),
        post("/webhooks/payments", &[("stripe-signature", &header)], body),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_payments_webhook_rejects_signed_garbage() {
    let body = "not json";
    let header = payments_signature(body.as_bytes(), now());
    let response = send(
        test_app(),
        post("/webhooks/payments", &[("stripe-signature", &header)], body),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Tracking
// =============================================================================

#[tokio::test]
async fn test_tracking_webhook_requires_token() {
    let response = send(
        test_app(),
        post("/webhooks/tracking", &[], r#"{"event":"track_updated"}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tracking_webhook_rejects_wrong_token() {
    let response = send(
        test_app(),
        post(
            "/webhooks/tracking?token=guess",
            &[],
            r#"{"event":"track_updated"}"#,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tracking_webhook_accepts_header_token_and_ignores_statusless_update() {
    let body = r#"{
        "event": "track_updated",
        "data": { "carrier": "usps", "tracking_number": "9400111899223344556677" }
    }"#;
    let response = send(
        test_app(),
        post(
            "/webhooks/tracking",
            &[("x-kado-webhook-token", TRACKING_WEBHOOK_TOKEN)],
            body,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["received"], true);
}

#[tokio::test]
async fn test_tracking_webhook_rejects_malformed_body() {
    let uri = format!("/webhooks/tracking?token={TRACKING_WEBHOOK_TOKEN}");
    let response = send(test_app(), post(&uri, &[], r#"{"event": 5}"#)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
