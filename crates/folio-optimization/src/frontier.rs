use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PortfolioError;
use crate::estimator::MarketEstimate;
use crate::optimizer::Optimizer;
use crate::settings::FrontierBranch;

/// One solved target-return level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub risk: f64,
    #[serde(rename = "return")]
    pub expected_return: f64,
    #[serde(skip)]
    pub weights: Vec<f64>,
}

/// Sweeps minimum-variance solves across evenly spaced target returns.
#[derive(Debug, Clone, Copy)]
pub struct FrontierGenerator<'a> {
    optimizer: &'a Optimizer,
    branch: FrontierBranch,
}

impl<'a> FrontierGenerator<'a> {
    pub const fn new(optimizer: &'a Optimizer, branch: FrontierBranch) -> Self {
        Self { optimizer, branch }
    }

    /// Points sorted by ascending risk. Targets that cannot be solved are
    /// skipped, so the result may hold fewer than `steps` points.
    pub fn generate(
        &self,
        estimate: &MarketEstimate,
        steps: usize,
    ) -> Result<Vec<FrontierPoint>, PortfolioError> {
        let targets = target_returns(estimate, steps);
        let metrics = self.optimizer.metrics();

        let mut points: Vec<FrontierPoint> = targets
            .par_iter()
            .filter_map(|&target| match self.optimizer.minimize_variance(estimate, Some(target)) {
                Ok(allocation) if allocation.converged => {
                    let performance = metrics.portfolio_performance(estimate, &allocation.weights);
                    Some(FrontierPoint {
                        risk: performance.risk,
                        expected_return: performance.expected_return,
                        weights: allocation.weights.to_vec(),
                    })
                }
                Ok(allocation) => {
                    warn!(
                        target,
                        iterations = allocation.iterations,
                        "frontier target did not converge, skipping"
                    );
                    None
                }
                Err(error) => {
                    warn!(target, error = %error, "frontier target infeasible, skipping");
                    None
                }
            })
            .collect();

        if self.branch == FrontierBranch::Efficient {
            if let Some(floor) = self.efficient_floor(estimate)? {
                let slack = 1e-9 * (1.0 + floor.abs());
                points.retain(|point| point.expected_return >= floor - slack);
            }
        }

        points.sort_by(|a, b| {
            a.risk
                .total_cmp(&b.risk)
                .then(a.expected_return.total_cmp(&b.expected_return))
        });

        debug!(requested = steps, generated = points.len(), "frontier sweep finished");
        Ok(points)
    }

    /// Return of the global minimum-variance portfolio, or `None` when that
    /// solve ran out of budget and its weights cannot bound the branch.
    fn efficient_floor(&self, estimate: &MarketEstimate) -> Result<Option<f64>, PortfolioError> {
        let gmv = self.optimizer.minimize_variance(estimate, None)?;
        if !gmv.converged {
            warn!(
                iterations = gmv.iterations,
                "minimum-variance solve did not converge, keeping the full frontier"
            );
            return Ok(None);
        }
        Ok(Some(gmv.weights.dot(estimate.mean_returns())))
    }
}

/// `steps` evenly spaced levels from min(μ) to max(μ), inclusive.
pub fn target_returns(estimate: &MarketEstimate, steps: usize) -> Vec<f64> {
    let mu = estimate.mean_returns();
    let low = mu.iter().copied().fold(f64::INFINITY, f64::min);
    let high = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    match steps {
        0 => Vec::new(),
        1 => vec![low],
        _ => {
            let width = (high - low) / (steps - 1) as f64;
            (0..steps)
                .map(|i| if i == steps - 1 { high } else { low + width * i as f64 })
                .collect()
        }
    }
}
