//! Request-level façade: ticker checks, cached price retrieval, estimation,
//! and optimization, in that order.
//!
//! CPU-bound work runs on the blocking pool so a large frontier sweep never
//! stalls the async runtime.

use std::sync::Arc;

use folio_core::{Lookback, PriceCache, PriceSeries, Ticker, ValidationError};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::error::PortfolioError;
use crate::estimator::{MarketEstimate, ReturnEstimator};
use crate::frontier::{FrontierGenerator, FrontierPoint};
use crate::metrics::AssetMetrics;
use crate::optimizer::{Method, OptimizationResult, Optimizer};
use crate::settings::EngineSettings;

const MIN_TICKERS: usize = 2;

/// Basket, objective, and price window for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRequest {
    pub tickers: Vec<String>,
    #[serde(default)]
    pub method: Method,
    #[serde(skip, default)]
    pub lookback: Lookback,
}

impl PortfolioRequest {
    pub fn new<S: Into<String>>(tickers: impl IntoIterator<Item = S>, method: Method) -> Self {
        Self {
            tickers: tickers.into_iter().map(Into::into).collect(),
            method,
            lookback: Lookback::default(),
        }
    }

    pub fn with_lookback(mut self, lookback: Lookback) -> Self {
        self.lookback = lookback;
        self
    }
}

/// Frontier curve plus the requested method's own optimum for reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierResponse {
    pub points: Vec<FrontierPoint>,
    pub method: Method,
    pub optimal: FrontierPoint,
    pub stale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual_assets: Option<Vec<AssetMetrics>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerValidation {
    pub ticker: String,
    pub valid: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}

/// Entry point for optimize, frontier, and ticker validation calls.
pub struct PortfolioService {
    cache: Arc<PriceCache>,
    settings: EngineSettings,
}

impl PortfolioService {
    pub fn new(cache: Arc<PriceCache>, settings: EngineSettings) -> Self {
        Self { cache, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    /// Optimal weights for `request.method`, with per-asset figures attached.
    pub async fn optimize(
        &self,
        request: &PortfolioRequest,
    ) -> Result<OptimizationResult, PortfolioError> {
        let (estimate, stale) = self.prepare(request).await?;
        info!(
            tickers = ?estimate.tickers().iter().map(Ticker::as_str).collect::<Vec<_>>(),
            method = %request.method,
            "optimizing portfolio"
        );

        let optimizer = Optimizer::new(&self.settings);
        let method = request.method;
        let mut result = run_blocking(move || {
            let mut result = optimizer.solve(method, &estimate)?;
            result.individual_assets = Some(optimizer.metrics().asset_metrics(&estimate));
            Ok(result)
        })
        .await?;

        result.stale = stale;
        Ok(result)
    }

    /// Efficient frontier for the basket.
    ///
    /// # Errors
    ///
    /// [`PortfolioError::OptimizationFailure`] when no target produced a point.
    pub async fn frontier(
        &self,
        request: &PortfolioRequest,
    ) -> Result<FrontierResponse, PortfolioError> {
        let (estimate, stale) = self.prepare(request).await?;
        info!(
            tickers = ?estimate.tickers().iter().map(Ticker::as_str).collect::<Vec<_>>(),
            steps = self.settings.frontier_steps,
            "generating efficient frontier"
        );

        let optimizer = Optimizer::new(&self.settings);
        let branch = self.settings.frontier_branch;
        let steps = self.settings.frontier_steps;
        let method = request.method;

        let response = run_blocking(move || {
            let points = FrontierGenerator::new(&optimizer, branch).generate(&estimate, steps)?;
            if points.is_empty() {
                return Err(PortfolioError::OptimizationFailure(
                    "Unable to generate efficient frontier".to_owned(),
                ));
            }

            let best = optimizer.solve(method, &estimate)?;
            let optimal = FrontierPoint {
                risk: best.exp_risk,
                expected_return: best.exp_return,
                weights: estimate
                    .tickers()
                    .iter()
                    .map(|t| best.weights.get(t.as_str()).copied().unwrap_or(0.0))
                    .collect(),
            };

            Ok(FrontierResponse {
                points,
                method,
                optimal,
                stale,
                individual_assets: Some(optimizer.metrics().asset_metrics(&estimate)),
            })
        })
        .await?;

        info!(points = response.points.len(), "generated efficient frontier");
        Ok(response)
    }

    /// Existence probe for a single symbol. Never fails; problems are
    /// reported through `valid` and `message`.
    pub async fn validate_ticker(&self, raw: &str) -> TickerValidation {
        let ticker = match Ticker::parse(raw) {
            Ok(ticker) => ticker,
            Err(_) => {
                return TickerValidation {
                    ticker: raw.trim().to_ascii_uppercase(),
                    valid: false,
                    message: "Invalid or unavailable ticker".to_owned(),
                }
            }
        };

        let (valid, message) = match self.cache.validate(&ticker).await {
            Ok(true) => (true, "Valid ticker"),
            Ok(false) => (false, "Invalid or unavailable ticker"),
            Err(error) => {
                warn!(ticker = %ticker, error = %error, "ticker validation failed");
                (false, "Error validating ticker")
            }
        };

        TickerValidation {
            ticker: ticker.to_string(),
            valid,
            message: message.to_owned(),
        }
    }

    pub fn health(&self) -> HealthStatus {
        let now = OffsetDateTime::now_utc();
        HealthStatus {
            status: "healthy".to_owned(),
            timestamp: now
                .format(&Rfc3339)
                .unwrap_or_else(|_| now.unix_timestamp().to_string()),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }

    fn basket(&self, raw: &[String]) -> Result<Vec<Ticker>, PortfolioError> {
        let tickers = Ticker::parse_all(raw)?;
        if tickers.len() < MIN_TICKERS {
            return Err(ValidationError::TooFewTickers {
                count: tickers.len(),
                min: MIN_TICKERS,
            }
            .into());
        }
        if tickers.len() > self.settings.max_tickers {
            return Err(ValidationError::TooManyTickers {
                count: tickers.len(),
                max: self.settings.max_tickers,
            }
            .into());
        }
        Ok(tickers)
    }

    /// Validated basket -> cached prices -> moments, in request order.
    async fn prepare(
        &self,
        request: &PortfolioRequest,
    ) -> Result<(MarketEstimate, bool), PortfolioError> {
        let tickers = self.basket(&request.tickers)?;
        let prices = self.cache.fetch(&tickers, request.lookback).await?;
        if prices.is_stale() {
            warn!(lookback = %request.lookback, "estimating from stale prices");
        }

        let series: Vec<PriceSeries> = tickers
            .iter()
            .map(|ticker| {
                prices.get(ticker).cloned().ok_or_else(|| {
                    PortfolioError::internal(format!("cache returned no series for '{ticker}'"))
                })
            })
            .collect::<Result<_, _>>()?;

        let estimator = ReturnEstimator::new(self.settings.min_observations);
        let estimate = run_blocking(move || estimator.estimate(&series)).await?;
        Ok((estimate, prices.is_stale()))
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, PortfolioError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PortfolioError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PortfolioError::internal(format!("compute task failed: {e}")))?
}
