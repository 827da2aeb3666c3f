//! Money in integer minor-currency units.
//!
//! Prices are stored and transmitted as integer minor units (cents for USD).
//! Decimal conversion only happens for display.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// ISO 4217 currency codes accepted for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyCode {
    #[default]
    Usd,
    Cad,
    Eur,
    Gbp,
    Aud,
}

/// Error returned when a currency code is not supported.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unsupported currency: {0}")]
pub struct UnknownCurrency(pub String);

impl CurrencyCode {
    /// Upper-case ISO code as stored in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Cad => "CAD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Aud => "AUD",
        }
    }

    /// Lower-case code as expected by the payment processor.
    #[must_use]
    pub fn processor_code(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }

    /// Currency symbol used for display.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Usd | Self::Cad | Self::Aud => "$",
            Self::Eur => "€",
            Self::Gbp => "£",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "CAD" => Ok(Self::Cad),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "AUD" => Ok(Self::Aud),
            _ => Err(UnknownCurrency(s.to_owned())),
        }
    }
}

impl_text_enum!(CurrencyCode);

/// An amount of money in minor units with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    /// Amount in the smallest currency unit.
    pub amount_cents: i64,
    /// Currency of the amount.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_cents(amount_cents: i64, currency: CurrencyCode) -> Self {
        Self {
            amount_cents,
            currency,
        }
    }

    /// Amount in major units as a decimal (1999 -> 19.99).
    #[must_use]
    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(self.amount_cents, 2)
    }

    /// Format for display, e.g. `$19.99`.
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}{:.2}", self.currency.symbol(), self.as_decimal())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}
