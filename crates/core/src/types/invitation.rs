//! Invitation code format.
//!
//! Codes look like `PIKACHU-AB12`: an upper-case word, a hyphen, and four
//! upper-case alphanumerics. User input is trimmed and upper-cased before lookup.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`InvitationCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvitationCodeError {
    /// Nothing left after trimming.
    #[error("invitation code is required")]
    Empty,
    /// Longer than [`InvitationCode::MAX_LENGTH`].
    #[error("invitation code is too long")]
    TooLong,
    /// Characters outside `A-Z`, `0-9` and `-`.
    #[error("invitation code may only contain letters, numbers and hyphens")]
    InvalidCharacter,
}

/// A normalized invitation code.
///
/// Parsing only normalizes and rejects obvious garbage; whether the code exists
/// is a database question. Generated codes always satisfy
/// [`InvitationCode::is_canonical`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct InvitationCode(String);

impl InvitationCode {
    /// Longest code accepted from user input.
    pub const MAX_LENGTH: usize = 64;
    /// Length of the random suffix in generated codes.
    pub const SUFFIX_LENGTH: usize = 4;
    /// Alphabet for the random suffix.
    pub const SUFFIX_ALPHABET: &'static [u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

    /// Words used as the prefix of generated codes.
    pub const WORDS: &'static [&'static str] = &[
        "PIKACHU", "CHARIZARD", "MEWTWO", "BLASTOISE", "GENGAR", "SNORLAX", "EEVEE",
        "LUGIA", "JIGGLYPUFF", "BULBASAUR", "SQUIRTLE", "DRAGONITE", "GYARADOS",
        "RAICHU", "ALAKAZAM", "UMBREON", "RAYQUAZA", "LUCARIO", "GARDEVOIR", "MEW",
    ];

    /// Normalize user input.
    ///
    /// # Errors
    ///
    /// Returns an error for empty, overly long, or non-alphanumeric input.
    pub fn parse(s: &str) -> Result<Self, InvitationCodeError> {
        let normalized = s.trim().to_ascii_uppercase();

        if normalized.is_empty() {
            return Err(InvitationCodeError::Empty);
        }
        if normalized.len() > Self::MAX_LENGTH {
            return Err(InvitationCodeError::TooLong);
        }
        if !normalized
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(InvitationCodeError::InvalidCharacter);
        }

        Ok(Self(normalized))
    }

    /// Build a code from a word and suffix. Both are upper-cased.
    #[must_use]
    pub fn from_parts(word: &str, suffix: &str) -> Self {
        Self(format!(
            "{}-{}",
            word.to_ascii_uppercase(),
            suffix.to_ascii_uppercase()
        ))
    }

    /// Whether the code has the generated `WORD-XXXX` shape.
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        let Some((word, suffix)) = self.0.split_once('-') else {
            return false;
        };
        !word.is_empty()
            && word.bytes().all(|b| b.is_ascii_uppercase())
            && suffix.len() == Self::SUFFIX_LENGTH
            && suffix
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvitationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_uppercases() {
        let code = InvitationCode::parse("  pikachu-ab12\n").unwrap();
        assert_eq!(code.as_str(), "PIKACHU-AB12");
        assert!(code.is_canonical());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(InvitationCode::parse("   "), Err(InvitationCodeError::Empty));
        assert_eq!(
            InvitationCode::parse("PIKA CHU"),
            Err(InvitationCodeError::InvalidCharacter)
        );
        assert_eq!(
            InvitationCode::parse(&"A".repeat(65)),
            Err(InvitationCodeError::TooLong)
        );
    }

    #[test]
    fn test_canonical_shape() {
        assert!(InvitationCode::from_parts("mew", "x9z2").is_canonical());
        assert!(!InvitationCode::parse("MEW").unwrap().is_canonical());
        assert!(!InvitationCode::parse("MEW-ABC").unwrap().is_canonical());
        assert!(!InvitationCode::parse("M3W-ABCD").unwrap().is_canonical());
    }

    #[test]
    fn test_suffix_alphabet_skips_ambiguous_characters() {
        for c in [b'0', b'O', b'1', b'I'] {
            assert!(!InvitationCode::SUFFIX_ALPHABET.contains(&c));
        }
    }
}
