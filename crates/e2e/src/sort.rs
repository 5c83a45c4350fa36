//! Sort-order verification for scraped price lists

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::price::Price;

/// Requested ordering of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    HighToLow,
    LowToHigh,
}

impl SortDirection {
    /// Comparator placing `a` before `b` when the listing is in this order.
    pub fn compare(self, a: &Price, b: &Price) -> Ordering {
        match self {
            SortDirection::HighToLow => b.value().total_cmp(&a.value()),
            SortDirection::LowToHigh => a.value().total_cmp(&b.value()),
        }
    }

    /// Whether an adjacent pair respects this order.
    pub fn allows(self, a: &Price, b: &Price) -> bool {
        match self {
            SortDirection::HighToLow => a.value() >= b.value(),
            SortDirection::LowToHigh => a.value() <= b.value(),
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            SortDirection::HighToLow => "high-to-low",
            SortDirection::LowToHigh => "low-to-high",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::HighToLow => f.write_str("high to low"),
            SortDirection::LowToHigh => f.write_str("low to high"),
        }
    }
}

/// Prices in document order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceList(Vec<Price>);

impl PriceList {
    pub fn new(prices: Vec<Price>) -> Self {
        Self(prices)
    }

    pub fn as_slice(&self) -> &[Price] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Price> {
        self.0.iter()
    }

    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map(|p| p.value()).collect()
    }

    pub fn first(&self) -> Option<Price> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<Price> {
        self.0.last().copied()
    }
}

impl From<Vec<Price>> for PriceList {
    fn from(prices: Vec<Price>) -> Self {
        Self(prices)
    }
}

impl FromIterator<Price> for PriceList {
    fn from_iter<I: IntoIterator<Item = Price>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for PriceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, price) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", price)?;
        }
        f.write_str("]")
    }
}

/// A listing that is not in the requested order.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("prices are not sorted {direction}: actual {actual}, expected {expected}")]
pub struct SortMismatch {
    pub direction: SortDirection,
    pub actual: PriceList,
    pub expected: PriceList,
}

impl SortMismatch {
    /// Index of the first position where actual and expected differ.
    pub fn first_divergence(&self) -> Option<usize> {
        self.actual
            .iter()
            .zip(self.expected.iter())
            .position(|(a, e)| a != e)
    }
}

/// Check that `prices` is ordered according to `direction`.
///
/// The expected order is a stable sort of a copy of the input, so equal
/// prices never produce a mismatch whatever their position.
pub fn verify(prices: &PriceList, direction: SortDirection) -> Result<(), SortMismatch> {
    let mut expected = prices.as_slice().to_vec();
    expected.sort_by(|a, b| direction.compare(a, b));

    if expected.as_slice() == prices.as_slice() {
        return Ok(());
    }

    Err(SortMismatch {
        direction,
        actual: prices.clone(),
        expected: PriceList::new(expected),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(values: &[f64]) -> PriceList {
        values.iter().map(|v| Price::new(*v).unwrap()).collect()
    }

    #[test]
    fn test_trivial_lists_pass() {
        for direction in [SortDirection::HighToLow, SortDirection::LowToHigh] {
            assert!(verify(&list(&[]), direction).is_ok());
            assert!(verify(&list(&[42.0]), direction).is_ok());
        }
    }

    #[test]
    fn test_high_to_low_mismatch_reports_expected() {
        let err = verify(&list(&[30.0, 10.0, 20.0]), SortDirection::HighToLow).unwrap_err();
        assert_eq!(err.direction, SortDirection::HighToLow);
        assert_eq!(err.actual, list(&[30.0, 10.0, 20.0]));
        assert_eq!(err.expected, list(&[30.0, 20.0, 10.0]));
        assert_eq!(err.first_divergence(), Some(1));
    }

    #[test]
    fn test_ties_are_not_violations() {
        assert!(verify(&list(&[20.0, 20.0, 10.0]), SortDirection::HighToLow).is_ok());
        assert!(verify(&list(&[10.0, 20.0, 20.0, 35.5]), SortDirection::LowToHigh).is_ok());
    }

    #[test]
    fn test_low_to_high() {
        assert!(verify(&list(&[5.0, 15.0, 15.0, 100.0]), SortDirection::LowToHigh).is_ok());
        let err = verify(&list(&[5.0, 100.0, 15.0]), SortDirection::LowToHigh).unwrap_err();
        assert_eq!(err.expected, list(&[5.0, 15.0, 100.0]));
    }

    #[test]
    fn test_verify_agrees_with_adjacent_pairs() {
        let samples: &[&[f64]] = &[
            &[1.0, 2.0, 3.0],
            &[3.0, 2.0, 1.0],
            &[2.0, 2.0, 2.0],
            &[1.0, 3.0, 2.0],
            &[0.0, 0.0, 9.99, 9.99, 0.5],
            &[120.0, 45.0, 45.0, 12.5, 0.0],
        ];

        for values in samples {
            let prices = list(values);
            for direction in [SortDirection::HighToLow, SortDirection::LowToHigh] {
                let pairwise = prices
                    .as_slice()
                    .windows(2)
                    .all(|w| direction.allows(&w[0], &w[1]));
                assert_eq!(
                    verify(&prices, direction).is_ok(),
                    pairwise,
                    "{:?} {:?}",
                    values,
                    direction
                );
            }
        }
    }

    #[test]
    fn test_mismatch_message() {
        let err = verify(&list(&[1.0, 2.0]), SortDirection::HighToLow).unwrap_err();
        assert_eq!(
            err.to_string(),
            "prices are not sorted high to low: actual [$1.00, $2.00], expected [$2.00, $1.00]"
        );
    }

    #[test]
    fn test_direction_yaml_names() {
        let d: SortDirection = serde_yaml::from_str("high_to_low").unwrap();
        assert_eq!(d, SortDirection::HighToLow);
        assert_eq!(SortDirection::LowToHigh.slug(), "low-to-high");
    }
}
