use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_TICKER_LEN: usize = 15;

/// Normalized market ticker. Identity key for every downstream structure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    /// Parse and normalize a ticker to uppercase.
    ///
    /// Accepts the shapes Yahoo uses for equities (`BRK-B`, `RDS.A`), indices (`^GSPC`)
    /// and currency pairs (`EURUSD=X`).
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTicker);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_TICKER_LEN {
            return Err(ValidationError::TickerTooLong {
                len,
                max: MAX_TICKER_LEN,
            });
        }

        if let Some(first) = normalized.chars().next() {
            if !(first.is_ascii_alphabetic() || first == '^') {
                return Err(ValidationError::TickerInvalidStart { ch: first });
            }
        }

        for (index, ch) in normalized.chars().enumerate().skip(1) {
            let valid = ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '=');
            if !valid {
                return Err(ValidationError::TickerInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    /// Parse a basket, rejecting duplicates after normalization.
    pub fn parse_all<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Self>, ValidationError> {
        let mut tickers: Vec<Self> = Vec::with_capacity(inputs.len());
        for raw in inputs {
            let ticker = Self::parse(raw.as_ref())?;
            if tickers.contains(&ticker) {
                return Err(ValidationError::DuplicateTicker {
                    ticker: ticker.0,
                });
            }
            tickers.push(ticker);
        }
        Ok(tickers)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Ticker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Ticker {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Ticker {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Ticker> for String {
    fn from(value: Ticker) -> Self {
        value.0
    }
}
