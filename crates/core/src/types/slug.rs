//! Profile slug type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Slug`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SlugError {
    /// Fewer than [`Slug::MIN_LENGTH`] characters.
    #[error("slug must be at least {min} characters")]
    TooShort {
        /// Minimum allowed length.
        min: usize,
    },
    /// More than [`Slug::MAX_LENGTH`] characters.
    #[error("slug must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// Contains something other than `a-z`, `0-9`, `-` or `_`.
    #[error("slug may only contain letters, numbers, hyphens and underscores")]
    InvalidCharacter,
    /// Starts or ends with a separator.
    #[error("slug must start and end with a letter or number")]
    EdgeSeparator,
    /// Collides with an application route or role name.
    #[error("that slug is reserved")]
    Reserved,
}

/// A user-chosen public profile identifier.
///
/// Slugs are stored lower-cased, so uniqueness is case-insensitive.
///
/// ## Constraints
///
/// - Length: 3-30 characters after trimming
/// - Characters: ASCII letters, digits, `-` and `_`
/// - Must start and end with a letter or digit
/// - Must not be a reserved word such as `admin` or `api`
///
/// ## Examples
///
/// ```
/// use kado_core::Slug;
///
/// assert_eq!(Slug::parse("Card-Shark").unwrap().as_str(), "card-shark");
/// assert!(Slug::parse("ab").is_err());
/// assert!(Slug::parse("admin").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Slug(String);

const RESERVED: &[&str] = &[
    "admin",
    "api",
    "auth",
    "checkout",
    "help",
    "kado",
    "listings",
    "login",
    "logout",
    "me",
    "onboarding",
    "orders",
    "purchase",
    "settings",
    "static",
    "support",
    "webhooks",
];

impl Slug {
    /// Minimum slug length.
    pub const MIN_LENGTH: usize = 3;
    /// Maximum slug length.
    pub const MAX_LENGTH: usize = 30;

    /// Parse and normalize a slug.
    ///
    /// # Errors
    ///
    /// Returns a [`SlugError`] describing the first rule the input breaks.
    pub fn parse(s: &str) -> Result<Self, SlugError> {
        let normalized = s.trim().to_ascii_lowercase();

        if normalized.len() < Self::MIN_LENGTH {
            return Err(SlugError::TooShort {
                min: Self::MIN_LENGTH,
            });
        }
        if normalized.len() > Self::MAX_LENGTH {
            return Err(SlugError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if !normalized
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
        {
            return Err(SlugError::InvalidCharacter);
        }
        if normalized.starts_with(['-', '_']) || normalized.ends_with(['-', '_']) {
            return Err(SlugError::EdgeSeparator);
        }
        if RESERVED.contains(&normalized.as_str()) {
            return Err(SlugError::Reserved);
        }

        Ok(Self(normalized))
    }

    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lowercases_and_trims() {
        let slug = Slug::parse("  GradedGoods_22 ").unwrap();
        assert_eq!(slug.as_str(), "gradedgoods_22");
    }

    #[test]
    fn test_length_limits() {
        assert_eq!(Slug::parse("ab"), Err(SlugError::TooShort { min: 3 }));
        assert!(Slug::parse("abc").is_ok());
        assert!(Slug::parse(&"a".repeat(30)).is_ok());
        assert_eq!(
            Slug::parse(&"a".repeat(31)),
            Err(SlugError::TooLong { max: 30 })
        );
    }

    #[test]
    fn test_rejects_bad_characters_and_edges() {
        assert_eq!(Slug::parse("card shark"), Err(SlugError::InvalidCharacter));
        assert_eq!(Slug::parse("cärd"), Err(SlugError::InvalidCharacter));
        assert_eq!(Slug::parse("-card"), Err(SlugError::EdgeSeparator));
        assert_eq!(Slug::parse("card_"), Err(SlugError::EdgeSeparator));
    }

    #[test]
    fn test_reserved_words_are_case_insensitive() {
        assert_eq!(Slug::parse("Admin"), Err(SlugError::Reserved));
        assert_eq!(Slug::parse("WEBHOOKS"), Err(SlugError::Reserved));
    }
}
