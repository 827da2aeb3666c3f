//! Payment processor client (Stripe-compatible REST API, no SDK).
//!
//! Requests are form-encoded with basic auth on the secret key. Only the fields
//! the marketplace reads are deserialized.

use std::time::Duration;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use kado_core::{CurrencyCode, ListingId, OrderId, UserId};

use crate::config::PaymentsConfig;

/// Webhook timestamps older than this are rejected (replay protection).
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Errors from the payment processor.
#[derive(Debug, Error)]
pub enum PaymentsError {
    /// Transport failure.
    #[error("payment processor request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor rejected our credentials or permissions.
    #[error("payment processor rejected credentials: {0}")]
    Unauthorized(String),

    /// The processor returned an error for the request.
    #[error("{message}")]
    Api {
        /// HTTP status returned by the processor.
        status: u16,
        /// Processor's human-readable message.
        message: String,
    },
}

/// Errors verifying a webhook signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature mismatch")]
    Mismatch,
    #[error("timestamp outside tolerance")]
    Expired,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

/// A checkout session as created or retrieved.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`.
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

impl CheckoutSession {
    /// Whether the buyer's payment has gone through.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }
}

/// Connected account capabilities relevant to selling.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectedAccount {
    pub id: String,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub details_submitted: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct UrlOnly {
    url: String,
}

/// Everything needed to start a checkout for one listing.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub order_id: OrderId,
    pub listing_id: ListingId,
    pub buyer_id: &'a UserId,
    pub customer_id: &'a str,
    pub title: &'a str,
    pub image_url: Option<&'a str>,
    pub amount_cents: i64,
    pub currency: CurrencyCode,
    /// Seller's connected account; funds are transferred there when present.
    pub destination_account: Option<&'a str>,
    pub buyer_timezone: Option<&'a str>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest<'_> {
    /// Form fields for `POST /v1/checkout/sessions`.
    #[must_use]
    pub fn form(&self) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("customer".into(), self.customer_id.into()),
            ("success_url".into(), self.success_url.clone()),
            ("cancel_url".into(), self.cancel_url.clone()),
            ("line_items[0][quantity]".into(), "1".into()),
            (
                "line_items[0][price_data][currency]".into(),
                self.currency.processor_code(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                self.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                self.title.into(),
            ),
            (
                "shipping_address_collection[allowed_countries][0]".into(),
                "US".into(),
            ),
            (
                "shipping_address_collection[allowed_countries][1]".into(),
                "CA".into(),
            ),
            ("metadata[order_id]".into(), self.order_id.to_string()),
            ("metadata[listing_id]".into(), self.listing_id.to_string()),
            ("metadata[buyer_id]".into(), self.buyer_id.to_string()),
            (
                "payment_intent_data[metadata][order_id]".into(),
                self.order_id.to_string(),
            ),
        ];

        if let Some(image) = self.image_url {
            form.push((
                "line_items[0][price_data][product_data][images][0]".into(),
                image.into(),
            ));
        }
        if let Some(tz) = self.buyer_timezone {
            form.push(("metadata[buyer_timezone]".into(), tz.into()));
        }
        if let Some(account) = self.destination_account {
            form.push((
                "payment_intent_data[transfer_data][destination]".into(),
                account.into(),
            ));
        }
        form
    }
}

/// Client for the payment processor's REST API.
#[derive(Clone)]
pub struct PaymentsClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
    webhook_secret: SecretString,
}

impl PaymentsClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &PaymentsConfig) -> Result<Self, PaymentsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, PaymentsError> {
        let response = self
            .http
            .post(format!("{}{path}", self.api_base))
            .basic_auth(self.secret_key.expose_secret(), None::<&str>)
            .form(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, PaymentsError> {
        let response = self
            .http
            .get(format!("{}{path}", self.api_base))
            .basic_auth(self.secret_key.expose_secret(), None::<&str>)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, PaymentsError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let message = response
            .json::<ApiErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| format!("payment processor returned {status}"));

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(PaymentsError::Unauthorized(message));
        }
        Err(PaymentsError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Create a customer for a buyer.
    ///
    /// # Errors
    ///
    /// Returns `PaymentsError` if the processor call fails.
    pub async fn create_customer(
        &self,
        user_id: &UserId,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<String, PaymentsError> {
        let mut form = vec![("metadata[user_id]".to_string(), user_id.to_string())];
        if let Some(email) = email {
            form.push(("email".to_string(), email.to_string()));
        }
        if let Some(name) = name {
            form.push(("name".to_string(), name.to_string()));
        }
        let customer: IdOnly = self.post("/v1/customers", &form).await?;
        tracing::info!(user_id = %user_id, customer_id = %customer.id, "Created payment customer");
        Ok(customer.id)
    }

    /// Create a one-off payment checkout session.
    ///
    /// # Errors
    ///
    /// Returns `PaymentsError` if the processor call fails.
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, PaymentsError> {
        self.post("/v1/checkout/sessions", &request.form()).await
    }

    /// Retrieve a checkout session.
    ///
    /// # Errors
    ///
    /// Returns `PaymentsError` if the processor call fails.
    pub async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentsError> {
        self.get(&format!(
            "/v1/checkout/sessions/{}",
            urlencoding::encode(session_id)
        ))
        .await
    }

    /// Create an Express connected account for a seller.
    ///
    /// # Errors
    ///
    /// Returns `PaymentsError` if the processor call fails.
    pub async fn create_connected_account(
        &self,
        user_id: &UserId,
        email: Option<&str>,
    ) -> Result<String, PaymentsError> {
        let mut form = vec![
            ("type".to_string(), "express".to_string()),
            ("capabilities[card_payments][requested]".to_string(), "true".to_string()),
            ("capabilities[transfers][requested]".to_string(), "true".to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
        ];
        if let Some(email) = email {
            form.push(("email".to_string(), email.to_string()));
        }
        let account: IdOnly = self.post("/v1/accounts", &form).await?;
        tracing::info!(user_id = %user_id, account_id = %account.id, "Created connected account");
        Ok(account.id)
    }

    /// Fetch a connected account's status.
    ///
    /// # Errors
    ///
    /// Returns `PaymentsError` if the processor call fails.
    pub async fn get_connected_account(
        &self,
        account_id: &str,
    ) -> Result<ConnectedAccount, PaymentsError> {
        self.get(&format!("/v1/accounts/{}", urlencoding::encode(account_id)))
            .await
    }

    /// Create an onboarding link for a connected account.
    ///
    /// # Errors
    ///
    /// Returns `PaymentsError` if the processor call fails.
    pub async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String, PaymentsError> {
        let form = vec![
            ("account".to_string(), account_id.to_string()),
            ("refresh_url".to_string(), refresh_url.to_string()),
            ("return_url".to_string(), return_url.to_string()),
            ("type".to_string(), "account_onboarding".to_string()),
        ];
        let link: UrlOnly = self.post("/v1/account_links", &form).await?;
        Ok(link.url)
    }

    /// Create a login link to the connected account's dashboard.
    ///
    /// # Errors
    ///
    /// Returns `PaymentsError` if the processor call fails.
    pub async fn create_login_link(&self, account_id: &str) -> Result<String, PaymentsError> {
        let link: UrlOnly = self
            .post(
                &format!("/v1/accounts/{}/login_links", urlencoding::encode(account_id)),
                &[],
            )
            .await?;
        Ok(link.url)
    }

    /// Verify a webhook `Stripe-Signature`-style header against the raw body.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError` if the header is malformed, no `v1` signature
    /// matches, or the timestamp is outside the tolerance window.
    pub fn verify_webhook(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        verify_signature(
            payload,
            header,
            self.webhook_secret.expose_secret(),
            chrono::Utc::now().timestamp(),
        )
    }
}

/// Verify an HMAC-SHA256 webhook signature header (`t=<ts>,v1=<hex>[,v1=<hex>]`).
///
/// # Errors
///
/// See [`PaymentsClient::verify_webhook`].
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        if let Some(t) = part.trim().strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.trim().strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MalformedHeader)?;

    let matched = signatures.iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if !matched {
        return Err(SignatureError::Mismatch);
    }
    if (now - ts).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str, ts: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{ts}.").as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_verify_signature_accepts_valid_header() {
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = format!("t=1700000000,v1={}", sign(payload, "whsec_test", 1_700_000_000));
        assert_eq!(
            verify_signature(payload, &header, "whsec_test", 1_700_000_100),
            Ok(())
        );
    }

    #[test]
    fn test_verify_signature_accepts_any_matching_v1() {
        let payload = b"{}";
        let header = format!(
            "t=1700000000,v1=deadbeef,v1={}",
            sign(payload, "whsec_test", 1_700_000_000)
        );
        assert!(verify_signature(payload, &header, "whsec_test", 1_700_000_000).is_ok());
    }

    #[test]
    fn test_verify_signature_rejects_tampering_and_replay() {
        let payload = b"{\"amount\":100}";
        let header = format!("t=1700000000,v1={}", sign(payload, "whsec_test", 1_700_000_000));
        assert_eq!(
            verify_signature(b"{\"amount\":999}", &header, "whsec_test", 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(payload, &header, "whsec_other", 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(payload, &header, "whsec_test", 1_700_000_301),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_verify_signature_rejects_malformed_header() {
        assert_eq!(
            verify_signature(b"{}", "v1=abc", "whsec_test", 0),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            verify_signature(b"{}", "t=123", "whsec_test", 0),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn test_checkout_form_includes_metadata_and_destination() {
        let buyer = UserId::new("user_buyer");
        let request = CheckoutRequest {
            order_id: OrderId::new(42),
            listing_id: ListingId::new(7),
            buyer_id: &buyer,
            customer_id: "cus_123",
            title: "Charizard PSA 10",
            image_url: None,
            amount_cents: 1999,
            currency: CurrencyCode::Usd,
            destination_account: Some("acct_seller"),
            buyer_timezone: Some("America/Chicago"),
            success_url: "https://kado.test/purchase/success".to_string(),
            cancel_url: "https://kado.test/listings/7".to_string(),
        };
        let form = request.form();
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("1999"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("usd"));
        assert_eq!(get("metadata[order_id]"), Some("42"));
        assert_eq!(get("metadata[listing_id]"), Some("7"));
        assert_eq!(get("metadata[buyer_id]"), Some("user_buyer"));
        assert_eq!(get("metadata[buyer_timezone]"), Some("America/Chicago"));
        assert_eq!(
            get("payment_intent_data[transfer_data][destination]"),
            Some("acct_seller")
        );
        assert_eq!(get("line_items[0][price_data][product_data][images][0]"), None);
    }
}
