//! Constrained mean-variance solvers.
//!
//! | Method | Problem | Solver |
//! |--------|---------|--------|
//! | [`Method::MinVariance`] | `min wᵀΣw` (optionally with `wᵀμ = t`) | primal active-set QP |
//! | [`Method::MaxSharpe`] | `max (wᵀμ - r_f) / √(wᵀΣw)` | spectral projected gradient |
//!
//! Both keep `Σ w_i = 1` and `lower ≤ w_i ≤ upper`. Both are bounded by
//! [`SolverConfig`]; running out of budget is reported through
//! `success = false`, never as an error.

mod active_set;
mod projected_gradient;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use folio_core::ValidationError;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PortfolioError;
use crate::estimator::MarketEstimate;
use crate::metrics::{AssetMetrics, MetricsCalculator, RISK_EPSILON};
use crate::settings::{EngineSettings, FallbackPolicy, SolverConfig, WeightBounds};

use active_set::BoxQp;

/// Allocation objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    MinVariance,
    MaxSharpe,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MinVariance => "min_variance",
            Self::MaxSharpe => "max_sharpe",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "min_variance" => Ok(Self::MinVariance),
            "max_sharpe" => Ok(Self::MaxSharpe),
            other => Err(ValidationError::InvalidArgument {
                name: "method",
                reason: format!("expected 'min_variance' or 'max_sharpe', got '{other}'"),
            }),
        }
    }
}

/// Raw solver output, indexed like the estimate's tickers.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub weights: Array1<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Point solution handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub method: Method,
    pub weights: BTreeMap<String, f64>,
    pub exp_return: f64,
    pub exp_risk: f64,
    pub sharpe: f64,
    pub success: bool,
    pub message: String,
    pub iterations: usize,
    /// Daily returns behind the estimate.
    pub observations: usize,
    /// Prices came from an expired cache entry after a failed refresh.
    pub stale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual_assets: Option<Vec<AssetMetrics>>,
}

#[derive(Debug, Clone)]
pub struct Optimizer {
    bounds: WeightBounds,
    solver: SolverConfig,
    fallback: FallbackPolicy,
    metrics: MetricsCalculator,
}

impl Optimizer {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            bounds: settings.bounds,
            solver: settings.solver,
            fallback: settings.fallback,
            metrics: MetricsCalculator::new(settings.risk_free_rate),
        }
    }

    pub const fn bounds(&self) -> WeightBounds {
        self.bounds
    }

    pub const fn metrics(&self) -> &MetricsCalculator {
        &self.metrics
    }

    /// Solves `method` and packages weights with their performance figures.
    pub fn solve(
        &self,
        method: Method,
        estimate: &MarketEstimate,
    ) -> Result<OptimizationResult, PortfolioError> {
        let (weights, iterations, success, message) = match method {
            Method::MinVariance => {
                let allocation = self.minimize_variance(estimate, None)?;
                let message = if allocation.converged {
                    "Optimization terminated successfully".to_owned()
                } else {
                    format!(
                        "minimum-variance solve stopped after {} iterations without converging",
                        allocation.iterations
                    )
                };
                (allocation.weights, allocation.iterations, allocation.converged, message)
            }
            Method::MaxSharpe => {
                let allocation = self.maximize_sharpe(estimate);
                if allocation.converged {
                    (
                        allocation.weights,
                        allocation.iterations,
                        true,
                        "Optimization terminated successfully".to_owned(),
                    )
                } else {
                    match self.fallback {
                        FallbackPolicy::Report => (
                            allocation.weights,
                            allocation.iterations,
                            false,
                            format!(
                                "maximum-Sharpe solve did not converge within {} iterations; best feasible iterate returned",
                                allocation.iterations
                            ),
                        ),
                        FallbackPolicy::EqualWeight => (
                            equal_weights(estimate.len()),
                            allocation.iterations,
                            false,
                            format!(
                                "maximum-Sharpe solve did not converge within {} iterations; equal-weight allocation returned as requested",
                                allocation.iterations
                            ),
                        ),
                    }
                }
            }
        };

        if weights.iter().any(|w| !w.is_finite()) {
            return Err(PortfolioError::internal("solver produced non-finite weights"));
        }
        if !success {
            warn!(method = %method, iterations, "optimizer did not converge");
        }

        let performance = self.metrics.portfolio_performance(estimate, &weights);
        debug!(
            method = %method,
            iterations,
            exp_return = performance.expected_return,
            exp_risk = performance.risk,
            "optimization finished"
        );

        Ok(OptimizationResult {
            method,
            weights: estimate
                .tickers()
                .iter()
                .map(|t| t.to_string())
                .zip(weights.iter().copied())
                .collect(),
            exp_return: performance.expected_return,
            exp_risk: performance.risk,
            sharpe: performance.sharpe,
            success,
            message,
            iterations,
            observations: estimate.observations(),
            stale: false,
            individual_assets: None,
        })
    }

    /// Minimum-variance weights, optionally pinned to `target` expected return.
    ///
    /// # Errors
    ///
    /// [`PortfolioError::OptimizationFailure`] when no weight vector within the
    /// bounds reaches `target`.
    pub fn minimize_variance(
        &self,
        estimate: &MarketEstimate,
        target: Option<f64>,
    ) -> Result<Allocation, PortfolioError> {
        let n = estimate.len();
        let mu = estimate.mean_returns();
        let WeightBounds { lower, upper } = self.bounds;

        let (equalities, start) = match target {
            None => (Array2::<f64>::ones((1, n)), equal_weights(n)),
            Some(t) => {
                if !t.is_finite() {
                    return Err(PortfolioError::OptimizationFailure(format!(
                        "target return {t} is not finite"
                    )));
                }
                let low = extreme_portfolio(mu, lower, upper, false);
                let high = extreme_portfolio(mu, lower, upper, true);
                let (r_low, r_high) = (low.dot(mu), high.dot(mu));
                let slack = 1e-12 * (1.0 + t.abs());
                if t < r_low - slack || t > r_high + slack {
                    return Err(PortfolioError::OptimizationFailure(format!(
                        "target return {t:.6} is outside the attainable range [{r_low:.6}, {r_high:.6}]"
                    )));
                }

                if r_high - r_low <= 1e-12 * (1.0 + r_high.abs()) {
                    // Every feasible portfolio has the same return.
                    (Array2::<f64>::ones((1, n)), equal_weights(n))
                } else {
                    let alpha = ((t - r_low) / (r_high - r_low)).clamp(0.0, 1.0);
                    let mut rows = Array2::<f64>::ones((2, n));
                    rows.row_mut(1).assign(mu);
                    (rows, &high * alpha + &low * (1.0 - alpha))
                }
            }
        };

        let covariance = estimate.covariance();
        let trace: f64 = covariance.diag().sum();
        let ridge = 1e-10 * trace / n as f64 + 1e-14;
        let hessian = covariance * 2.0 + Array2::<f64>::eye(n) * ridge;

        let outcome = BoxQp {
            hessian: &hessian,
            equalities: &equalities,
            lower,
            upper,
        }
        .solve(start, &self.solver);

        Ok(Allocation {
            weights: clean_weights(outcome.weights, lower, upper),
            iterations: outcome.iterations,
            converged: outcome.converged,
        })
    }

    /// Maximum-Sharpe weights searched from the equal-weight portfolio.
    pub fn maximize_sharpe(&self, estimate: &MarketEstimate) -> Allocation {
        let n = estimate.len();
        if n == 1 {
            return Allocation {
                weights: equal_weights(1),
                iterations: 0,
                converged: true,
            };
        }

        if let Some(riskless) = self.riskless_allocation(estimate) {
            debug!("riskless portfolio beats the risk-free rate; Sharpe is unbounded");
            return riskless;
        }

        let mu = estimate.mean_returns();
        let covariance = estimate.covariance();
        let risk_free = self.metrics.risk_free_rate();

        let negative_sharpe = |w: &Array1<f64>| -> (f64, Array1<f64>) {
            let sigma_w = covariance.dot(w);
            let risk = w.dot(&sigma_w).max(0.0).sqrt();
            let excess = w.dot(mu) - risk_free;
            let value = -self.metrics.sharpe_ratio(w.dot(mu), risk);

            let r = risk.max(RISK_EPSILON);
            let gradient = mu / r - &sigma_w * (excess / (r * r * r));
            (value, -gradient)
        };

        let outcome = projected_gradient::minimize(
            negative_sharpe,
            equal_weights(n),
            self.bounds.lower,
            self.bounds.upper,
            &self.solver,
        );

        Allocation {
            weights: clean_weights(outcome.weights, self.bounds.lower, self.bounds.upper),
            iterations: outcome.iterations,
            converged: outcome.converged,
        }
    }

    /// Minimum-variance portfolio when its risk is numerically zero and its
    /// return still clears the risk-free rate.
    fn riskless_allocation(&self, estimate: &MarketEstimate) -> Option<Allocation> {
        let gmv = self.minimize_variance(estimate, None).ok()?;
        if !gmv.converged {
            return None;
        }
        let performance = self.metrics.portfolio_performance(estimate, &gmv.weights);
        let riskless = performance.risk < RISK_EPSILON
            && performance.expected_return > self.metrics.risk_free_rate();
        riskless.then_some(gmv)
    }
}

pub(crate) fn equal_weights(n: usize) -> Array1<f64> {
    Array1::from_elem(n, 1.0 / n as f64)
}

/// Fully invested vertex that fills assets in order of (descending if
/// `highest`) expected return, starting from every weight at `lower`.
fn extreme_portfolio(mu: &Array1<f64>, lower: f64, upper: f64, highest: bool) -> Array1<f64> {
    let n = mu.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let ordering = mu[a].total_cmp(&mu[b]);
        if highest {
            ordering.reverse()
        } else {
            ordering
        }
    });

    let mut weights = Array1::from_elem(n, lower);
    let mut remaining = 1.0 - lower * n as f64;
    for i in order {
        if remaining <= 0.0 {
            break;
        }
        let add = (upper - lower).min(remaining);
        weights[i] += add;
        remaining -= add;
    }
    weights
}

/// Weights this close to a bound are treated as sitting on it.
const BOUND_SNAP: f64 = 1e-9;

/// Clamps rounding drift back into the bounds and restores the budget.
fn clean_weights(mut weights: Array1<f64>, lower: f64, upper: f64) -> Array1<f64> {
    weights.mapv_inplace(|w| {
        if w - lower <= BOUND_SNAP {
            lower
        } else if upper - w <= BOUND_SNAP {
            upper
        } else {
            w
        }
    });
    let total = weights.sum();
    if total.abs() > f64::EPSILON {
        weights /= total;
    }
    weights
}
