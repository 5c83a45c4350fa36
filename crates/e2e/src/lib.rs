//! Acme Store E2E Test Suite
//!
//! This crate drives a real browser against the live storefront:
//! - Controls Playwright through a long-lived Node driver speaking line-delimited JSON
//! - Parses declarative YAML test specs (navigation, search, product, cart, sorting)
//! - Extracts prices from listing text and verifies their sort order
//! - Captures a screenshot whenever a listing is out of order
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── probe_site() -> status                               │
//! │    ├── PlaywrightSession::launch() -> page                  │
//! │    ├── run_spec(spec: TestSpec) -> TestResult               │
//! │    └── verify_price_sort -> SortVerdict (+ screenshot)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PriceSortVerifier                                          │
//! │    ├── collect_all(&[impl TextSource]) -> PriceList         │
//! │    │     └── extract_price("$1,234.50 USD") -> Price        │
//! │    └── verify(PriceList, SortDirection) -> SortMismatch?    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod expect;
pub mod observer;
pub mod playwright;
pub mod price;
pub mod runner;
pub mod site;
pub mod sort;
pub mod spec;
pub mod verifier;

pub use collector::{collect_all, TextSource};
pub use error::{E2eError, E2eResult};
pub use observer::{TracingObserver, VerificationObserver};
pub use price::{extract_price, Price, PriceParseError};
pub use runner::{RunnerConfig, TestRunner};
pub use sort::{verify, PriceList, SortDirection, SortMismatch};
pub use spec::{TestSpec, TestStep};
pub use verifier::{PriceSortVerifier, SortVerdict};
