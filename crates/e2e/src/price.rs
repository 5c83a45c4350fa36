//! Price extraction from scraped display text
//!
//! Storefront prices are rendered as `"$20.00"`, `"$1,234.50"` or
//! `"$5.00 USD"`. Extraction strips a fixed decoration set and parses what is
//! left as a plain decimal numeral. Nothing locale-aware happens here.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters removed before parsing, in addition to any whitespace.
/// U+FEFF is not Unicode whitespace but page text treats it as such.
const DECORATION: [char; 6] = ['$', ',', 'U', 'S', 'D', '\u{feff}'];

static DECIMAL_NUMERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)$").expect("static regex"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceParseError {
    #[error("no digits left after stripping currency decoration from {text:?}")]
    Empty { text: String },

    #[error("{cleaned:?} (from {text:?}) is not a decimal numeral")]
    NotDecimal { text: String, cleaned: String },

    #[error("{text:?} is out of range")]
    OutOfRange { text: String },
}

/// A finite, non-negative amount parsed from page text.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Price(f64);

impl Price {
    /// Returns `None` for negative, NaN or infinite values.
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value >= 0.0).then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Price {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Price::new(value).ok_or_else(|| format!("{value} is not a valid price"))
    }
}

impl From<Price> for f64 {
    fn from(price: Price) -> f64 {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

/// Parse a displayed price such as `"$1,234.50"` into a [`Price`].
pub fn extract_price(text: &str) -> Result<Price, PriceParseError> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !DECORATION.contains(c))
        .collect();

    if cleaned.is_empty() {
        return Err(PriceParseError::Empty { text: text.to_string() });
    }

    if !DECIMAL_NUMERAL.is_match(&cleaned) {
        return Err(PriceParseError::NotDecimal {
            text: text.to_string(),
            cleaned,
        });
    }

    let value: f64 = cleaned.parse().map_err(|_| PriceParseError::NotDecimal {
        text: text.to_string(),
        cleaned: cleaned.clone(),
    })?;

    Price::new(value).ok_or_else(|| PriceParseError::OutOfRange { text: text.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("$20.00", 20.0 ; "plain dollars")]
    #[test_case("$1,234.50", 1234.5 ; "thousands separator")]
    #[test_case("  $5 USD ", 5.0 ; "currency code and padding")]
    #[test_case("$15.00USD", 15.0 ; "code without space")]
    #[test_case("\u{a0}$7.25\n", 7.25 ; "non breaking space and newline")]
    #[test_case("\u{feff}$20.00", 20.0 ; "byte order mark")]
    #[test_case("$20.00\u{a0}USD", 20.0 ; "non breaking space before code")]
    #[test_case(".5", 0.5 ; "leading dot")]
    #[test_case("$0", 0.0 ; "zero")]
    fn test_extract_price(text: &str, expected: f64) {
        assert_eq!(extract_price(text).unwrap().value(), expected);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let first = extract_price("$1,999.99 USD").unwrap();
        for _ in 0..10 {
            assert_eq!(extract_price("$1,999.99 USD").unwrap(), first);
        }
    }

    #[test]
    fn test_empty_after_stripping() {
        assert_eq!(
            extract_price(" $ USD "),
            Err(PriceParseError::Empty { text: " $ USD ".to_string() })
        );
        assert!(matches!(extract_price(""), Err(PriceParseError::Empty { .. })));
    }

    #[test_case("1.2.3" ; "multiple dots")]
    #[test_case("€20.00" ; "unsupported symbol")]
    #[test_case("$20.00 usd" ; "lowercase code is not stripped")]
    #[test_case("-$5.00" ; "negative sign")]
    #[test_case("$1e3" ; "exponent")]
    #[test_case("inf" ; "infinity literal")]
    #[test_case("." ; "lone dot")]
    fn test_rejects_malformed(text: &str) {
        assert!(matches!(
            extract_price(text),
            Err(PriceParseError::NotDecimal { .. })
        ));
    }

    #[test]
    fn test_out_of_range() {
        let huge = "9".repeat(400);
        assert!(matches!(
            extract_price(&huge),
            Err(PriceParseError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_price_new_rejects_invalid() {
        assert!(Price::new(-1.0).is_none());
        assert!(Price::new(f64::NAN).is_none());
        assert!(Price::new(f64::INFINITY).is_none());
        assert_eq!(Price::new(3.5).map(Price::value), Some(3.5));
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::new(20.0).unwrap().to_string(), "$20.00");
    }

    #[test]
    fn test_deserialize_validates() {
        let price: Price = serde_json::from_str("12.5").unwrap();
        assert_eq!(price.value(), 12.5);
        assert!(serde_json::from_str::<Price>("-1.0").is_err());
    }
}
