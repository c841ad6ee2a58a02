use thiserror::Error;

/// Validation and contract errors exposed by `folio-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },
    #[error("ticker must start with an ASCII letter or '^': '{ch}'")]
    TickerInvalidStart { ch: char },
    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },
    #[error("unknown ticker '{ticker}'")]
    UnknownTicker { ticker: String },
    #[error("ticker '{ticker}' appears more than once")]
    DuplicateTicker { ticker: String },

    #[error("at least {min} tickers are required, got {count}")]
    TooFewTickers { count: usize, min: usize },
    #[error("at most {max} tickers are allowed, got {count}")]
    TooManyTickers { count: usize, max: usize },

    #[error("lookback window must span at least one day")]
    EmptyLookback,
    #[error("lookback start {start} must be before end {end}")]
    InvertedLookback { start: String, end: String },
    #[error("date must be formatted as YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },

    #[error("price for '{ticker}' on {date} must be finite and positive")]
    InvalidPrice { ticker: String, date: String },
    #[error("price dates for '{ticker}' must be strictly increasing")]
    UnorderedPrices { ticker: String },

    #[error("invalid {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

/// Configuration errors raised while reading settings from the environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidValue { name: &'static str, value: String },
    #[error("setting '{name}' must be greater than zero")]
    NonPositive { name: &'static str },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure surfaced by [`PriceCache::fetch`](crate::PriceCache::fetch).
///
/// `Clone` so one single-flight outcome can be handed to every waiter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("price data unavailable for [{tickers}]: {reason}")]
    DataUnavailable { tickers: String, reason: String },
}
