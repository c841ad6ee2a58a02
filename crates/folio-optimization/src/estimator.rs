use std::collections::{BTreeSet, HashMap};

use folio_core::{PriceSeries, Ticker};
use ndarray::{Array1, Array2, Axis};
use time::Date;

use crate::error::PortfolioError;
use crate::linalg;

/// Trading days per year used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

const SYMMETRY_TOLERANCE: f64 = 1e-9;
const PSD_TOLERANCE: f64 = 1e-10;

/// Annualized mean returns and covariance for an ordered basket.
///
/// Index `i` of `mean_returns` and row/column `i` of `covariance` always refer
/// to `tickers[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEstimate {
    tickers: Vec<Ticker>,
    mean_returns: Array1<f64>,
    covariance: Array2<f64>,
    observations: usize,
}

impl MarketEstimate {
    /// Builds an estimate from precomputed moments.
    ///
    /// # Errors
    ///
    /// [`PortfolioError::Internal`] when dimensions disagree, an entry is not
    /// finite, or the covariance is asymmetric or not positive semidefinite.
    pub fn new(
        tickers: Vec<Ticker>,
        mean_returns: Array1<f64>,
        covariance: Array2<f64>,
        observations: usize,
    ) -> Result<Self, PortfolioError> {
        let n = tickers.len();
        if n == 0 {
            return Err(PortfolioError::internal("estimate needs at least one asset"));
        }
        if mean_returns.len() != n || covariance.dim() != (n, n) {
            return Err(PortfolioError::internal(format!(
                "moment dimensions disagree: {n} tickers, {} means, {:?} covariance",
                mean_returns.len(),
                covariance.dim()
            )));
        }
        if mean_returns.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
            return Err(PortfolioError::internal("moments contain non-finite values"));
        }

        let scale = covariance.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
        for i in 0..n {
            for j in (i + 1)..n {
                if (covariance[[i, j]] - covariance[[j, i]]).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(PortfolioError::internal(format!(
                        "covariance is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }
        if !linalg::is_positive_semidefinite(&covariance, PSD_TOLERANCE) {
            return Err(PortfolioError::internal(
                "covariance matrix is not positive semidefinite",
            ));
        }

        Ok(Self {
            tickers,
            mean_returns,
            covariance,
            observations,
        })
    }

    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn mean_returns(&self) -> &Array1<f64> {
        &self.mean_returns
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    /// Number of daily returns behind the moments.
    pub const fn observations(&self) -> usize {
        self.observations
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

/// Turns aligned price histories into annualized moments.
#[derive(Debug, Clone, Copy)]
pub struct ReturnEstimator {
    min_observations: usize,
}

impl ReturnEstimator {
    pub const fn new(min_observations: usize) -> Self {
        Self { min_observations }
    }

    /// Inner-joins `series` on date, then computes log-return moments.
    ///
    /// Asset order follows the order of `series`.
    ///
    /// # Errors
    ///
    /// [`PortfolioError::InsufficientData`] when fewer than `min_observations`
    /// daily returns (and never fewer than two) survive the join.
    pub fn estimate(&self, series: &[PriceSeries]) -> Result<MarketEstimate, PortfolioError> {
        let Some(first) = series.first() else {
            return Err(PortfolioError::internal("no price series to estimate from"));
        };

        let mut common: BTreeSet<Date> = first.points().iter().map(|p| p.date).collect();
        for other in &series[1..] {
            let dates: BTreeSet<Date> = other.points().iter().map(|p| p.date).collect();
            common.retain(|date| dates.contains(date));
        }

        let observations = common.len().saturating_sub(1);
        let required = self.min_observations.max(2);
        if observations < required {
            let shortest = series
                .iter()
                .min_by_key(|s| s.len())
                .unwrap_or(first);
            return Err(PortfolioError::InsufficientData {
                ticker: shortest.ticker().to_string(),
                observations,
                required,
            });
        }

        let mut returns = Array2::<f64>::zeros((observations, series.len()));
        for (col, s) in series.iter().enumerate() {
            let by_date: HashMap<Date, f64> =
                s.points().iter().map(|p| (p.date, p.close)).collect();
            let mut previous: Option<f64> = None;
            let mut row = 0;
            for date in &common {
                let close = by_date[date];
                if let Some(prev) = previous {
                    returns[[row, col]] = (close / prev).ln();
                    row += 1;
                }
                previous = Some(close);
            }
        }

        let (mean_returns, covariance) = annualized_moments(&returns);
        let tickers = series.iter().map(|s| s.ticker().clone()).collect();

        MarketEstimate::new(tickers, mean_returns, covariance, observations)
    }
}

/// Column means and sample covariance of `returns`, scaled by 252.
fn annualized_moments(returns: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let t = returns.nrows() as f64;
    let means = returns.sum_axis(Axis(0)) / t;
    let centered = returns - &means;
    let mut covariance = centered.t().dot(&centered) / (t - 1.0);

    // Force exact symmetry so later checks see rounding-free input.
    let n = covariance.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (covariance[[i, j]] + covariance[[j, i]]);
            covariance[[i, j]] = avg;
            covariance[[j, i]] = avg;
        }
    }

    (means * TRADING_DAYS_PER_YEAR, covariance * TRADING_DAYS_PER_YEAR)
}
