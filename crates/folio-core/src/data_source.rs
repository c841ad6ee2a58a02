//! Price source trait and request/error types.
//!
//! This module defines the provider contract (`PriceSource`) that the cache
//! and the resilient client sit on top of. Providers only know how to fetch
//! one ticker's daily history and how to probe whether a ticker exists; keying,
//! expiry, and retries live elsewhere.
//!
//! # Example
//!
//! ```rust,ignore
//! use folio_core::{HistoryRequest, Lookback, PriceSource, Ticker, YahooAdapter};
//!
//! async fn closes(adapter: &YahooAdapter) -> Result<(), folio_core::SourceError> {
//!     let request = HistoryRequest::new(Ticker::parse("AAPL")?, Lookback::one_year());
//!     let series = adapter.history(request).await?;
//!     println!("{} closes for {}", series.len(), series.ticker());
//!     Ok(())
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{Lookback, PriceSeries, Ticker, ValidationError};

/// Request payload for a daily history fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub ticker: Ticker,
    pub lookback: Lookback,
}

impl HistoryRequest {
    pub fn new(ticker: Ticker, lookback: Lookback) -> Self {
        Self { ticker, lookback }
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    NotFound,
    Unavailable,
    RateLimited,
    InvalidRequest,
    Internal,
}

/// Structured source error consumed by the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn not_found(ticker: &Ticker) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: format!("no price data found for '{ticker}'"),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(error: ValidationError) -> Self {
        Self::internal(error.to_string())
    }
}

/// Boxed future returned by [`PriceSource`] methods.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Market-data provider contract.
///
/// Implementations must be `Send + Sync`; the cache shares one instance across
/// every in-flight request.
pub trait PriceSource: Send + Sync {
    /// Short provider name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Fetches the daily adjusted-close history for one ticker.
    ///
    /// # Errors
    ///
    /// - [`SourceErrorKind::NotFound`] when the provider has no such ticker
    /// - [`SourceErrorKind::RateLimited`] / [`SourceErrorKind::Unavailable`] for
    ///   transient upstream failures (retryable)
    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, PriceSeries>;

    /// Short-range existence probe. `Ok(false)` means the provider answered and
    /// has no data for the ticker.
    fn probe<'a>(&'a self, ticker: Ticker) -> SourceFuture<'a, bool>;
}
