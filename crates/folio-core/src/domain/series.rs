use time::Date;

use crate::{Ticker, ValidationError};

/// One trading day's adjusted close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: Date,
    pub close: f64,
}

impl PricePoint {
    pub const fn new(date: Date, close: f64) -> Self {
        Self { date, close }
    }
}

/// Ordered daily price history for one ticker. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    ticker: Ticker,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, enforcing strictly increasing dates and finite positive closes.
    pub fn new(ticker: Ticker, points: Vec<PricePoint>) -> Result<Self, ValidationError> {
        for point in &points {
            if !point.close.is_finite() || point.close <= 0.0 {
                return Err(ValidationError::InvalidPrice {
                    ticker: ticker.to_string(),
                    date: point.date.to_string(),
                });
            }
        }

        if points.windows(2).any(|pair| pair[0].date >= pair[1].date) {
            return Err(ValidationError::UnorderedPrices {
                ticker: ticker.to_string(),
            });
        }

        Ok(Self { ticker, points })
    }

    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<Date> {
        self.points.first().map(|point| point.date)
    }

    pub fn last_date(&self) -> Option<Date> {
        self.points.last().map(|point| point.date)
    }
}
