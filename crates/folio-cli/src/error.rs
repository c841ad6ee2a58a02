use folio_core::CoreError;
use folio_optimization::PortfolioError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("{}: {source}", .source.code())]
    Portfolio {
        #[from]
        source: PortfolioError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Core(CoreError::Validation(_) | CoreError::Config(_)) => 2,
            Self::Core(CoreError::Serialization(_)) => 4,
            Self::Portfolio { source } => match source {
                PortfolioError::Validation(_) => 2,
                PortfolioError::DataUnavailable { .. } => 3,
                PortfolioError::InsufficientData { .. } => 4,
                PortfolioError::OptimizationFailure(_) => 5,
                PortfolioError::Internal(_) => 10,
            },
            Self::Io(_) => 10,
        }
    }
}

impl From<folio_core::ValidationError> for CliError {
    fn from(error: folio_core::ValidationError) -> Self {
        Self::Core(CoreError::Validation(error))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::Core(CoreError::Serialization(error))
    }
}

impl From<folio_core::ConfigError> for CliError {
    fn from(error: folio_core::ConfigError) -> Self {
        Self::Core(CoreError::Config(error))
    }
}

#[cfg(test)]
mod tests {
    use folio_core::{ConfigError, ValidationError};

    use super::*;

    #[test]
    fn exit_codes_follow_error_category() {
        let validation = CliError::from(PortfolioError::Validation(ValidationError::EmptyTicker));
        assert_eq!(validation.exit_code(), 2);

        let data = CliError::from(PortfolioError::DataUnavailable {
            tickers: "AAPL".to_owned(),
            reason: "timeout".to_owned(),
        });
        assert_eq!(data.exit_code(), 3);

        let failure = CliError::from(PortfolioError::OptimizationFailure("no points".to_owned()));
        assert_eq!(failure.exit_code(), 5);

        let config = CliError::from(ConfigError::NonPositive { name: "ttl" });
        assert_eq!(config.exit_code(), 2);
    }

    #[test]
    fn portfolio_errors_carry_their_code() {
        let error = CliError::from(PortfolioError::internal("boom"));
        assert_eq!(error.to_string(), "portfolio.internal: internal error: boom");
    }
}
