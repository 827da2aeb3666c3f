//! Grading reference data: cards, certificates and sales history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kado_core::{CardId, CertificateId, CurrencyCode, Money};

/// A catalogued card (independent of any physical copy).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub name: String,
    pub set_name: String,
    pub card_number: String,
    pub year: Option<i32>,
    pub language: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A grading-service certificate for one physical card.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GradingCertificate {
    pub id: CertificateId,
    pub grader: String,
    pub cert_number: String,
    pub grade: String,
    pub card_id: Option<CardId>,
    pub population: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A recorded sale of a card at a given grade.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SalesRecord {
    pub grader: String,
    pub grade: String,
    pub price_cents: i64,
    pub currency: CurrencyCode,
    pub sold_at: DateTime<Utc>,
    pub source: String,
}

impl SalesRecord {
    /// Sale price with currency.
    #[must_use]
    pub const fn price(&self) -> Money {
        Money::from_cents(self.price_cents, self.currency)
    }
}

/// A certificate with its card and recent comparable sales, for listing pages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDetail {
    pub certificate: GradingCertificate,
    pub card: Option<Card>,
    pub recent_sales: Vec<SalesRecord>,
}

/// A certificate lookup response from the grading service.
///
/// ```json
/// { "PSACert": { "CertNumber": "49390123", "Year": "1999", "Brand": "POKEMON BASE SET",
///   "CardNumber": "4", "Subject": "CHARIZARD-HOLO", "CardGrade": "GEM MT 10",
///   "TotalPopulation": 121 }, "Sales": [] }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateResponse {
    #[serde(rename = "PSACert")]
    pub cert: CertificatePayload,
    #[serde(rename = "Sales", default)]
    pub sales: Vec<SalePayload>,
}

/// Certificate fields as reported by the grading service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificatePayload {
    pub cert_number: String,
    #[serde(default)]
    pub year: Option<String>,
    pub brand: String,
    #[serde(default)]
    pub card_number: Option<String>,
    pub subject: String,
    pub card_grade: String,
    #[serde(default)]
    pub total_population: Option<i32>,
}

impl CertificatePayload {
    /// Four-digit year, when the service reports one.
    #[must_use]
    pub fn year(&self) -> Option<i32> {
        self.year
            .as_deref()
            .and_then(|y| y.trim().get(..4))
            .and_then(|y| y.parse().ok())
    }
}

/// One reported sale attached to a certificate response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SalePayload {
    pub grade: String,
    pub price_cents: i64,
    #[serde(default)]
    pub currency: CurrencyCode,
    pub sold_at: DateTime<Utc>,
    pub source: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_response_parses() {
        let json = r#"{
            "PSACert": {
                "CertNumber": "49390123",
                "Year": "1999",
                "Brand": "POKEMON BASE SET",
                "CardNumber": "4",
                "Subject": "CHARIZARD-HOLO",
                "CardGrade": "GEM MT 10",
                "TotalPopulation": 121
            },
            "Sales": [
                {"Grade": "GEM MT 10", "PriceCents": 2500000, "SoldAt": "2026-01-04T18:00:00Z", "Source": "auction"}
            ]
        }"#;
        let response: CertificateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.cert.cert_number, "49390123");
        assert_eq!(response.cert.year(), Some(1999));
        assert_eq!(response.sales.len(), 1);
        assert_eq!(response.sales[0].currency, CurrencyCode::Usd);
    }

    #[test]
    fn test_year_handles_ranges_and_garbage() {
        let payload = CertificatePayload {
            cert_number: "1".to_string(),
            year: Some("2000-01".to_string()),
            brand: "NEO".to_string(),
            card_number: None,
            subject: "LUGIA".to_string(),
            card_grade: "MINT 9".to_string(),
            total_population: None,
        };
        assert_eq!(payload.year(), Some(2000));

        let payload = CertificatePayload {
            year: Some("n/a".to_string()),
            ..payload
        };
        assert_eq!(payload.year(), None);
    }
}
