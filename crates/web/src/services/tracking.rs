//! Tracking provider client and status mapping.
//!
//! Shipments are registered once when the seller ships; afterwards the provider
//! pushes status changes to `/webhooks/tracking`.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use kado_core::{Carrier, FulfillmentStatus, OrderId, TrackingNumber};

use crate::config::TrackingConfig;

/// Carrier token the provider uses for its scripted test shipments.
const TEST_CARRIER: &str = "shippo";

/// Errors from the tracking provider.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Transport failure.
    #[error("tracking provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider refused the registration.
    #[error("tracking provider returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Status block of a tracking record.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingStatus {
    pub status: String,
    #[serde(default)]
    pub substatus: Option<TrackingSubstatus>,
    #[serde(default)]
    pub status_details: Option<String>,
    #[serde(default)]
    pub status_date: Option<String>,
}

/// Provider substatus, e.g. `out_for_delivery`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingSubstatus {
    pub code: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// A tracking record as returned by registration and carried by webhooks.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingRecord {
    pub carrier: String,
    pub tracking_number: String,
    #[serde(default)]
    pub tracking_status: Option<TrackingStatus>,
}

/// Webhook envelope (`{"event": "track_updated", "data": {...}}`).
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingWebhook {
    pub event: String,
    pub data: TrackingRecord,
}

impl TrackingStatus {
    /// Fulfillment status this provider status corresponds to.
    ///
    /// `None` for statuses that carry no fulfillment change (pre-transit, unknown).
    #[must_use]
    pub fn fulfillment_status(&self) -> Option<FulfillmentStatus> {
        map_status(
            &self.status,
            self.substatus.as_ref().map(|s| s.code.as_str()),
        )
    }
}

/// Map a provider status and optional substatus code to a fulfillment status.
#[must_use]
pub fn map_status(status: &str, substatus: Option<&str>) -> Option<FulfillmentStatus> {
    match status.trim().to_ascii_uppercase().as_str() {
        "TRANSIT" => {
            let out_for_delivery = substatus.is_some_and(|code| {
                code.eq_ignore_ascii_case("out_for_delivery")
                    || code.eq_ignore_ascii_case("out for delivery")
            });
            Some(if out_for_delivery {
                FulfillmentStatus::OutForDelivery
            } else {
                FulfillmentStatus::InTransit
            })
        }
        "DELIVERED" => Some(FulfillmentStatus::Delivered),
        "FAILURE" | "RETURNED" => Some(FulfillmentStatus::Exception),
        _ => None,
    }
}

/// Client for the tracking provider.
#[derive(Clone)]
pub struct TrackingClient {
    http: reqwest::Client,
    api_base: String,
    api_key: SecretString,
    webhook_token: SecretString,
}

impl TrackingClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &TrackingConfig) -> Result<Self, TrackingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            webhook_token: config.webhook_token.clone(),
        })
    }

    /// Register a shipment so the provider starts pushing updates for it.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError` if the request fails or is rejected.
    pub async fn register(
        &self,
        carrier: Carrier,
        tracking_number: &TrackingNumber,
        order_id: OrderId,
    ) -> Result<TrackingRecord, TrackingError> {
        let carrier_token = if tracking_number.is_test_number() {
            TEST_CARRIER
        } else {
            carrier.as_str()
        };
        let metadata = format!("order:{order_id}");
        let form = [
            ("carrier", carrier_token),
            ("tracking_number", tracking_number.as_str()),
            ("metadata", metadata.as_str()),
        ];

        let response = self
            .http
            .post(format!("{}/tracks/", self.api_base))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("ShippoToken {}", self.api_key.expose_secret()),
            )
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TrackingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let record: TrackingRecord = response.json().await?;
        tracing::info!(
            order_id = %order_id,
            carrier = carrier_token,
            tracking_number = %tracking_number,
            "Registered shipment with tracking provider"
        );
        Ok(record)
    }

    /// Check the shared token the provider sends with webhook calls.
    #[must_use]
    pub fn verify_webhook_token(&self, token: &str) -> bool {
        constant_time_eq(
            token.as_bytes(),
            self.webhook_token.expose_secret().as_bytes(),
        )
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
