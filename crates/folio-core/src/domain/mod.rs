//! # Domain Models
//!
//! Canonical market-data types for folio.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Ticker`] | Validated, upper-cased symbol |
//! | [`PricePoint`] | One trading day's adjusted close |
//! | [`PriceSeries`] | Ordered daily closes for one ticker |
//! | [`Lookback`] | Historical window requested from the provider |
//!
//! All types enforce their invariants at construction time and return
//! [`ValidationError`](crate::ValidationError) otherwise.

mod lookback;
mod series;
mod ticker;

pub use lookback::Lookback;
pub use series::{PricePoint, PriceSeries};
pub use ticker::Ticker;
