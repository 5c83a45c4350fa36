//! Hooks for reporting price verification progress

use tracing::{debug, error, info};

use crate::sort::{PriceList, SortDirection, SortMismatch};

/// Receives verification events. All methods default to no-ops.
pub trait VerificationObserver: Send + Sync {
    fn extraction_started(&self, _count: usize) {}

    fn extraction_finished(&self, _prices: &PriceList) {}

    fn sort_verified(&self, _direction: SortDirection, _prices: &PriceList) {}

    fn sort_mismatch(&self, _mismatch: &SortMismatch) {}
}

/// Logs verification events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl VerificationObserver for TracingObserver {
    fn extraction_started(&self, count: usize) {
        debug!(count, "Extracting prices");
    }

    fn extraction_finished(&self, prices: &PriceList) {
        info!(count = prices.len(), prices = %prices, "Extracted prices");
    }

    fn sort_verified(&self, direction: SortDirection, prices: &PriceList) {
        match (prices.first(), prices.last()) {
            (Some(first), Some(last)) => {
                info!(%direction, %first, %last, "Prices are correctly sorted")
            }
            _ => info!(%direction, "No prices on page, ordering holds trivially"),
        }
    }

    fn sort_mismatch(&self, mismatch: &SortMismatch) {
        error!(
            direction = %mismatch.direction,
            actual = %mismatch.actual,
            expected = %mismatch.expected,
            "Sorting verification failed"
        );
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl VerificationObserver for SilentObserver {}
