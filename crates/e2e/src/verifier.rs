//! Price sort verification against a live listing

use std::sync::Arc;

use crate::collector::{collect_all, TextSource};
use crate::error::E2eResult;
use crate::observer::{TracingObserver, VerificationObserver};
use crate::sort::{verify, PriceList, SortDirection, SortMismatch};

/// Outcome of a completed price sort check
#[derive(Debug, Clone, PartialEq)]
pub enum SortVerdict {
    Sorted(PriceList),
    Mismatch(SortMismatch),
}

impl SortVerdict {
    pub fn is_sorted(&self) -> bool {
        matches!(self, SortVerdict::Sorted(_))
    }

    pub fn into_result(self) -> Result<PriceList, SortMismatch> {
        match self {
            SortVerdict::Sorted(prices) => Ok(prices),
            SortVerdict::Mismatch(mismatch) => Err(mismatch),
        }
    }
}

/// Extracts prices from text sources and checks their order.
///
/// Screenshots and other artifacts on mismatch are left to the caller.
pub struct PriceSortVerifier {
    observer: Arc<dyn VerificationObserver>,
}

impl PriceSortVerifier {
    pub fn new(observer: Arc<dyn VerificationObserver>) -> Self {
        Self { observer }
    }

    /// Read all `sources`, then verify the resulting list against `direction`.
    ///
    /// Errors are reserved for read and parse failures; an unsorted listing is
    /// reported as [`SortVerdict::Mismatch`].
    pub async fn check<S: TextSource>(
        &self,
        sources: &[S],
        direction: SortDirection,
    ) -> E2eResult<SortVerdict> {
        self.observer.extraction_started(sources.len());
        let prices = collect_all(sources).await?;
        self.observer.extraction_finished(&prices);

        Ok(self.check_prices(prices, direction))
    }

    /// Verify an already extracted list.
    pub fn check_prices(&self, prices: PriceList, direction: SortDirection) -> SortVerdict {
        match verify(&prices, direction) {
            Ok(()) => {
                self.observer.sort_verified(direction, &prices);
                SortVerdict::Sorted(prices)
            }
            Err(mismatch) => {
                self.observer.sort_mismatch(&mismatch);
                SortVerdict::Mismatch(mismatch)
            }
        }
    }
}

impl Default for PriceSortVerifier {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::SilentObserver;

    fn quiet() -> PriceSortVerifier {
        PriceSortVerifier::new(Arc::new(SilentObserver))
    }

    #[tokio::test]
    async fn test_check_sorted() {
        let verifier = quiet();
        let verdict = verifier
            .check(&["$50.00", "$20.00", "$20.00", "$5.00"], SortDirection::HighToLow)
            .await
            .unwrap();
        assert!(verdict.is_sorted());
    }

    #[tokio::test]
    async fn test_check_mismatch() {
        let verifier = quiet();
        let verdict = verifier
            .check(&["$5.00", "$50.00"], SortDirection::HighToLow)
            .await
            .unwrap();
        let mismatch = verdict.into_result().unwrap_err();
        assert_eq!(mismatch.expected.values(), vec![50.0, 5.0]);
    }
}
