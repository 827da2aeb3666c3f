//! Listing records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kado_core::{CardId, CertificateId, CurrencyCode, ListingId, ListingStatus, Money, UserId};

/// A seller's posting of a single graded card.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: UserId,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    /// Asking price in minor units.
    pub price_cents: i64,
    pub currency: CurrencyCode,
    pub status: ListingStatus,
    pub card_id: Option<CardId>,
    pub certificate_id: Option<CertificateId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Asking price with currency.
    #[must_use]
    pub const fn price(&self) -> Money {
        Money::from_cents(self.price_cents, self.currency)
    }

    /// Whether `user` is the seller.
    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.seller_id == user
    }
}

/// Fields a seller supplies when creating or editing a listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub currency: CurrencyCode,
    pub card_id: Option<CardId>,
    pub certificate_id: Option<CertificateId>,
}

/// Reasons a listing draft is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListingDraftError {
    #[error("title is required")]
    MissingTitle,
    #[error("title must be at most {0} characters")]
    TitleTooLong(usize),
    #[error("price must be greater than zero")]
    NonPositivePrice,
    #[error("price exceeds the maximum allowed")]
    PriceTooHigh,
}

impl ListingDraft {
    /// Longest accepted title.
    pub const MAX_TITLE_LENGTH: usize = 200;
    /// Highest accepted price in minor units ($1,000,000.00).
    pub const MAX_PRICE_CENTS: i64 = 100_000_000;

    /// Trim text fields and check limits.
    ///
    /// # Errors
    ///
    /// Returns the first rule the draft breaks.
    pub fn validated(mut self) -> Result<Self, ListingDraftError> {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.image_url = self
            .image_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        if self.title.is_empty() {
            return Err(ListingDraftError::MissingTitle);
        }
        if self.title.chars().count() > Self::MAX_TITLE_LENGTH {
            return Err(ListingDraftError::TitleTooLong(Self::MAX_TITLE_LENGTH));
        }
        if self.price_cents <= 0 {
            return Err(ListingDraftError::NonPositivePrice);
        }
        if self.price_cents > Self::MAX_PRICE_CENTS {
            return Err(ListingDraftError::PriceTooHigh);
        }
        Ok(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn draft(title: &str, price_cents: i64) -> ListingDraft {
        ListingDraft {
            title: title.to_string(),
            description: "  Centered, sharp corners.  ".to_string(),
            image_url: Some("   ".to_string()),
            price_cents,
            currency: CurrencyCode::Usd,
            card_id: None,
            certificate_id: None,
        }
    }

    #[test]
    fn test_validated_trims_fields() {
        let draft = draft("  Charizard PSA 10 ", 1999).validated().unwrap();
        assert_eq!(draft.title, "Charizard PSA 10");
        assert_eq!(draft.description, "Centered, sharp corners.");
        assert_eq!(draft.image_url, None);
    }

    #[test]
    fn test_validated_rejects_bad_input() {
        assert_eq!(
            draft("   ", 1999).validated().unwrap_err(),
            ListingDraftError::MissingTitle
        );
        assert_eq!(
            draft("Mew", 0).validated().unwrap_err(),
            ListingDraftError::NonPositivePrice
        );
        assert_eq!(
            draft("Mew", ListingDraft::MAX_PRICE_CENTS + 1)
                .validated()
                .unwrap_err(),
            ListingDraftError::PriceTooHigh
        );
        assert!(matches!(
            draft(&"x".repeat(201), 100).validated(),
            Err(ListingDraftError::TitleTooLong(200))
        ));
    }

    #[test]
    fn test_draft_deserializes_with_default_currency() {
        let draft: ListingDraft =
            serde_json::from_str(r#"{"title":"Lugia","priceCents":2500}"#).unwrap();
        assert_eq!(draft.currency, CurrencyCode::Usd);
        assert_eq!(draft.description, "");
    }
}
