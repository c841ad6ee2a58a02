use folio_core::{CacheError, ValidationError};
use thiserror::Error;

/// Failure taxonomy for portfolio operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PortfolioError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("price data unavailable for [{tickers}]: {reason}")]
    DataUnavailable { tickers: String, reason: String },

    #[error("ticker '{ticker}' has {observations} overlapping return observations, at least {required} required")]
    InsufficientData {
        ticker: String,
        observations: usize,
        required: usize,
    },

    #[error("optimization failed: {0}")]
    OptimizationFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PortfolioError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "portfolio.validation",
            Self::DataUnavailable { .. } => "portfolio.data_unavailable",
            Self::InsufficientData { .. } => "portfolio.insufficient_data",
            Self::OptimizationFailure(_) => "portfolio.optimization_failure",
            Self::Internal(_) => "portfolio.internal",
        }
    }
}

impl From<CacheError> for PortfolioError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Validation(error) => Self::Validation(error),
            CacheError::DataUnavailable { tickers, reason } => {
                Self::DataUnavailable { tickers, reason }
            }
        }
    }
}
