use std::fmt::{Display, Formatter};

use time::macros::format_description;
use time::{Date, Duration};

use crate::ValidationError;

const DEFAULT_TRAILING_DAYS: u32 = 365;

/// Historical window a price request spans. Part of every cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookback {
    /// The last `days` calendar days ending today.
    Trailing { days: u32 },
    /// An explicit `[start, end)` date range.
    Between { start: Date, end: Date },
}

impl Default for Lookback {
    fn default() -> Self {
        Self::Trailing {
            days: DEFAULT_TRAILING_DAYS,
        }
    }
}

impl Lookback {
    /// One trading year, expressed as a trailing calendar window.
    pub const fn one_year() -> Self {
        Self::Trailing {
            days: DEFAULT_TRAILING_DAYS,
        }
    }

    pub fn trailing_days(days: u32) -> Result<Self, ValidationError> {
        if days == 0 {
            return Err(ValidationError::EmptyLookback);
        }
        Ok(Self::Trailing { days })
    }

    pub fn between(start: Date, end: Date) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvertedLookback {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self::Between { start, end })
    }

    /// Parse a `YYYY-MM-DD` date.
    pub fn parse_date(input: &str) -> Result<Date, ValidationError> {
        let format = format_description!("[year]-[month]-[day]");
        Date::parse(input.trim(), &format).map_err(|_| ValidationError::InvalidDate {
            value: input.to_owned(),
        })
    }

    /// Resolve to concrete `[start, end)` dates relative to `today`.
    pub fn resolve(self, today: Date) -> (Date, Date) {
        match self {
            Self::Trailing { days } => {
                let end = today.next_day().unwrap_or(today);
                (end - Duration::days(i64::from(days)), end)
            }
            Self::Between { start, end } => (start, end),
        }
    }
}

impl Display for Lookback {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trailing { days } => write!(f, "{days}d"),
            Self::Between { start, end } => write!(f, "{start}..{end}"),
        }
    }
}
