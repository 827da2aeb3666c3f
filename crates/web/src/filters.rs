//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// First letter of a name, upper-cased, for avatar placeholders.
///
/// Usage in templates: `{{ seller_name|initial }}`
#[askama::filter_fn]
pub fn initial(name: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(initial_of(&name.to_string()))
}

fn initial_of(name: &str) -> String {
    name.trim()
        .chars()
        .next()
        .map_or_else(|| "?".to_string(), |c| c.to_uppercase().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_of() {
        assert_eq!(initial_of("  misty"), "M");
        assert_eq!(initial_of("éclair"), "É");
        assert_eq!(initial_of(""), "?");
    }
}
