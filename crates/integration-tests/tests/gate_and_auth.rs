//! Sign-in gate, auth redirects and rate limiting through the full router.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode, header};

use kado_integration_tests::{body_string, get, send, test_app};

fn location(response: &axum::http::Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_health_is_public() {
    let response = send(test_app(), get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_string(response).await, "ok");
}

#[tokio::test]
async fn test_upstream_request_id_is_echoed() {
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "edge-abc-123")
        .body(Body::empty())
        .unwrap();
    let response = send(test_app(), request).await;
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "edge-abc-123"
    );
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let response = send(test_app(), get("/health/ready")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_pages_redirect_signed_out_visitors_to_login() {
    let response = send(test_app(), get("/listings?page=2")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        "/auth/login?return_to=%2Flistings%3Fpage%3D2"
    );
}

#[tokio::test]
async fn test_api_rejects_signed_out_callers_with_json_401() {
    let response = send(test_app(), get("/api/orders")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"], "Authentication required");
}

#[tokio::test]
async fn test_invitation_status_is_not_public() {
    let response = send(test_app(), get("/api/invitations/status")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_onboarding_offers_sign_in_when_signed_out() {
    let response = send(test_app(), get("/onboarding?return_to=/orders/9")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("Sign in"));
    assert!(html.contains("/auth/login?return_to=%2Forders%2F9"));
}

#[tokio::test]
async fn test_identity_provider_error_returns_to_onboarding() {
    let response = send(
        test_app(),
        get("/auth/callback?error=access_denied&error_description=nope"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/onboarding?error=denied");
}

#[tokio::test]
async fn test_callback_without_code_is_rejected() {
    let response = send(test_app(), get("/auth/callback?state=abc")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/onboarding?error=missing_code");
}

#[tokio::test]
async fn test_auth_endpoints_are_rate_limited_per_client() {
    let app = test_app();
    for _ in 0..5 {
        let response = send(app.clone(), get("/auth/callback?error=access_denied")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }
    let limited = send(app.clone(), get("/auth/callback?error=access_denied")).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

    // Another client is unaffected.
    let other = Request::builder()
        .uri("/auth/callback?error=access_denied")
        .header("x-forwarded-for", "203.0.113.50")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(app, other).await.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_logout_requires_post() {
    let response = send(test_app(), get("/auth/logout")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
