use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::estimator::MarketEstimate;

/// Risk below this is treated as zero when forming a Sharpe ratio.
pub const RISK_EPSILON: f64 = 1e-8;

/// Stand-alone figures for one asset of the basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetrics {
    pub ticker: String,
    pub risk: f64,
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub sharpe: f64,
}

/// Expected return, volatility, and Sharpe ratio of a weight vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioPerformance {
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsCalculator {
    risk_free_rate: f64,
}

impl MetricsCalculator {
    pub const fn new(risk_free_rate: f64) -> Self {
        Self { risk_free_rate }
    }

    pub const fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    pub fn asset_metrics(&self, estimate: &MarketEstimate) -> Vec<AssetMetrics> {
        estimate
            .tickers()
            .iter()
            .enumerate()
            .map(|(i, ticker)| {
                let expected_return = estimate.mean_returns()[i];
                let risk = estimate.covariance()[[i, i]].max(0.0).sqrt();
                AssetMetrics {
                    ticker: ticker.to_string(),
                    risk,
                    expected_return,
                    sharpe: self.sharpe_ratio(expected_return, risk),
                }
            })
            .collect()
    }

    pub fn portfolio_performance(
        &self,
        estimate: &MarketEstimate,
        weights: &Array1<f64>,
    ) -> PortfolioPerformance {
        let expected_return = weights.dot(estimate.mean_returns());
        let variance = weights.dot(&estimate.covariance().dot(weights));
        let risk = variance.max(0.0).sqrt();

        PortfolioPerformance {
            expected_return,
            risk,
            sharpe: self.sharpe_ratio(expected_return, risk),
        }
    }

    /// `(return - r_f) / risk`, or 0 when risk is below [`RISK_EPSILON`].
    pub fn sharpe_ratio(&self, expected_return: f64, risk: f64) -> f64 {
        if risk < RISK_EPSILON {
            return 0.0;
        }
        (expected_return - self.risk_free_rate) / risk
    }
}

#[cfg(test)]
mod tests {
    use folio_core::Ticker;
    use ndarray::array;

    use super::*;

    fn estimate() -> MarketEstimate {
        MarketEstimate::new(
            Ticker::parse_all(&["AAA", "BBB"]).expect("valid tickers"),
            array![0.10, 0.06],
            array![[0.04, 0.0], [0.0, 0.02]],
            252,
        )
        .expect("valid moments")
    }

    #[test]
    fn per_asset_sharpe_uses_own_volatility() {
        let metrics = MetricsCalculator::new(0.02).asset_metrics(&estimate());
        assert_eq!(metrics[0].ticker, "AAA");
        assert!((metrics[0].risk - 0.2).abs() < 1e-12);
        assert!((metrics[0].sharpe - 0.4).abs() < 1e-12);
    }

    #[test]
    fn portfolio_figures_follow_weights() {
        let calculator = MetricsCalculator::new(0.0);
        let weights = array![1.0 / 3.0, 2.0 / 3.0];
        let performance = calculator.portfolio_performance(&estimate(), &weights);

        assert!((performance.expected_return - 0.22 / 3.0).abs() < 1e-12);
        assert!((performance.risk - (0.04_f64 / 3.0).sqrt()).abs() < 1e-12);
        let expected_sharpe = performance.expected_return / performance.risk;
        assert!((performance.sharpe - expected_sharpe).abs() < 1e-12);
    }

    #[test]
    fn zero_risk_gives_zero_sharpe() {
        let calculator = MetricsCalculator::new(0.0);
        assert_eq!(calculator.sharpe_ratio(0.05, 0.0), 0.0);
        assert_eq!(calculator.sharpe_ratio(0.05, 1e-12), 0.0);
    }
}
