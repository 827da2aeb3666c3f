//! Carrier and tracking number validation.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reasons a carrier/tracking pair is rejected before anything is persisted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShippingInputError {
    #[error("unsupported carrier: {0}")]
    UnsupportedCarrier(String),
    #[error("tracking number is required")]
    EmptyTrackingNumber,
    #[error("tracking number is not valid for {carrier}")]
    MalformedTrackingNumber { carrier: Carrier },
    #[error("test tracking numbers cannot be used in production")]
    TestTrackingNumber,
}

/// Shipping carriers sellers can ship with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    Usps,
    Ups,
    Fedex,
    Dhl,
}

impl Carrier {
    /// All supported carriers, in display order.
    pub const ALL: [Self; 4] = [Self::Usps, Self::Ups, Self::Fedex, Self::Dhl];

    /// Token used in the database and by the tracking provider.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Usps => "usps",
            Self::Ups => "ups",
            Self::Fedex => "fedex",
            Self::Dhl => "dhl",
        }
    }

    /// Human-readable carrier name.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Usps => "USPS",
            Self::Ups => "UPS",
            Self::Fedex => "FedEx",
            Self::Dhl => "DHL Express",
        }
    }

    /// Public tracking page for a tracking number.
    #[must_use]
    pub fn tracking_url(&self, tracking: &TrackingNumber) -> String {
        let number = tracking.as_str();
        match self {
            Self::Usps => {
                format!("https://tools.usps.com/go/TrackConfirmAction?tLabels={number}")
            }
            Self::Ups => format!("https://www.ups.com/track?tracknum={number}"),
            Self::Fedex => format!("https://www.fedex.com/fedextrack/?trknbr={number}"),
            Self::Dhl => {
                format!("https://www.dhl.com/en/express/tracking.html?AWB={number}")
            }
        }
    }

    fn accepts(self, number: &str) -> bool {
        let digits = |n: &str| n.bytes().all(|b| b.is_ascii_digit());
        let len = number.len();
        match self {
            // IMpb barcodes, or the 13-character international format (EA123456789US).
            Self::Usps => {
                ((20..=22).contains(&len) && digits(number))
                    || (len == 13
                        && number.get(..2).is_some_and(|p| p.bytes().all(|b| b.is_ascii_uppercase()))
                        && number.get(2..11).is_some_and(digits)
                        && number.get(11..).is_some_and(|s| s.bytes().all(|b| b.is_ascii_uppercase())))
            }
            Self::Ups => {
                len == 18
                    && number.starts_with("1Z")
                    && number.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            }
            Self::Fedex => matches!(len, 12 | 15 | 20 | 22) && digits(number),
            Self::Dhl => (10..=11).contains(&len) && digits(number),
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Carrier {
    type Err = ShippingInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usps" => Ok(Self::Usps),
            "ups" => Ok(Self::Ups),
            "fedex" => Ok(Self::Fedex),
            "dhl" | "dhl_express" => Ok(Self::Dhl),
            _ => Err(ShippingInputError::UnsupportedCarrier(s.to_owned())),
        }
    }
}

/// A validated, normalized tracking number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingNumber(String);

impl TrackingNumber {
    /// Tracking numbers the tracking provider reserves for scripted test shipments.
    ///
    /// Each one replays a fixed status sequence. They are accepted for any carrier
    /// outside production and always rejected in production.
    pub const TEST_NUMBERS: [&'static str; 6] = [
        "SHIPPO_PRE_TRANSIT",
        "SHIPPO_TRANSIT",
        "SHIPPO_DELIVERED",
        "SHIPPO_RETURNED",
        "SHIPPO_FAILURE",
        "SHIPPO_UNKNOWN",
    ];

    /// Validate a tracking number for `carrier`.
    ///
    /// Whitespace is stripped and letters upper-cased before checking the
    /// carrier's format.
    ///
    /// # Errors
    ///
    /// Returns an error when the number is empty, does not match the carrier's
    /// format, or is a test number while `allow_test_numbers` is false.
    pub fn parse(
        carrier: Carrier,
        raw: &str,
        allow_test_numbers: bool,
    ) -> Result<Self, ShippingInputError> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        if normalized.is_empty() {
            return Err(ShippingInputError::EmptyTrackingNumber);
        }

        if Self::TEST_NUMBERS.contains(&normalized.as_str()) {
            return if allow_test_numbers {
                Ok(Self(normalized))
            } else {
                Err(ShippingInputError::TestTrackingNumber)
            };
        }

        if !carrier.accepts(&normalized) {
            return Err(ShippingInputError::MalformedTrackingNumber { carrier });
        }

        Ok(Self(normalized))
    }

    /// Whether this is one of [`Self::TEST_NUMBERS`].
    #[must_use]
    pub fn is_test_number(&self) -> bool {
        Self::TEST_NUMBERS.contains(&self.0.as_str())
    }

    /// Returns the tracking number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
