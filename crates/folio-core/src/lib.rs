//! # Folio Core
//!
//! Market-data contracts, domain types and the price cache for the folio
//! portfolio optimizer.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (Yahoo chart API, offline mode) |
//! | [`cache`] | TTL price cache with single-flight refresh and stale fallback |
//! | [`config`] | Cache and upstream settings |
//! | [`data_source`] | Provider trait and request/error types |
//! | [`domain`] | Domain models (Ticker, PriceSeries, Lookback) |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`retry`] | Backoff policy and the retrying client |
//! | [`throttling`] | Concurrency limit and rate quota for upstream calls |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use folio_core::{CacheConfig, Lookback, PriceCache, Ticker, YahooAdapter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = PriceCache::new(Arc::new(YahooAdapter::offline()), CacheConfig::default());
//!     let tickers = Ticker::parse_all(&["AAPL", "MSFT"])?;
//!
//!     let prices = cache.fetch(&tickers, Lookback::one_year()).await?;
//!     for (ticker, series) in prices.series() {
//!         println!("{ticker}: {} closes", series.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  PriceCache     │  key = sorted tickers + lookback, TTL, single-flight
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ RetryingSource  │────▶│ UpstreamGate     │
//! │ (backoff)       │     │ (semaphore+quota)│
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ PriceSource     │────▶│ HTTP Client      │
//! │ (YahooAdapter)  │     │ (reqwest/noop)   │
//! └─────────────────┘     └──────────────────┘
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod retry;
pub mod throttling;

pub use adapters::YahooAdapter;
pub use cache::{CacheKey, CachedPrices, PriceCache};
pub use config::CacheConfig;
pub use data_source::{HistoryRequest, PriceSource, SourceError, SourceErrorKind, SourceFuture};
pub use domain::{Lookback, PricePoint, PriceSeries, Ticker};
pub use error::{CacheError, ConfigError, CoreError, ValidationError};
pub use http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient, ReqwestHttpClient,
};
pub use retry::{Backoff, RetryConfig, RetryingSource};
pub use throttling::{GatePermit, UpstreamGate};
