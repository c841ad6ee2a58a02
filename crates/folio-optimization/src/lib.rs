//! # Folio Optimization
//!
//! Mean-variance engine for folio: turns cached price histories into
//! annualized moments, solves minimum-variance and maximum-Sharpe allocations,
//! and sweeps the efficient frontier.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`estimator`] | Date alignment, log returns, annualized μ and Σ |
//! | [`optimizer`] | Constrained solvers and [`OptimizationResult`] |
//! | [`frontier`] | Target-return sweep over minimum-variance solves |
//! | [`metrics`] | Per-asset and per-portfolio risk, return, Sharpe |
//! | [`settings`] | Engine knobs (bounds, solver budget, fallback, branch) |
//! | [`service`] | [`PortfolioService`] tying the cache to the engine |
//! | [`error`] | [`PortfolioError`] taxonomy |
//!
//! Everything except [`service`] is synchronous and free of I/O.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use folio_core::{CacheConfig, PriceCache, YahooAdapter};
//! use folio_optimization::{EngineSettings, Method, PortfolioRequest, PortfolioService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = PriceCache::new(Arc::new(YahooAdapter::offline()), CacheConfig::default());
//!     let service = PortfolioService::new(Arc::new(cache), EngineSettings::default());
//!
//!     let result = service
//!         .optimize(&PortfolioRequest::new(["AAPL", "TLT"], Method::MaxSharpe))
//!         .await?;
//!     println!("{:?}", result.weights);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod estimator;
pub mod frontier;
mod linalg;
pub mod metrics;
pub mod optimizer;
pub mod service;
pub mod settings;

pub use error::PortfolioError;
pub use estimator::{MarketEstimate, ReturnEstimator, TRADING_DAYS_PER_YEAR};
pub use frontier::{target_returns, FrontierGenerator, FrontierPoint};
pub use metrics::{AssetMetrics, MetricsCalculator, PortfolioPerformance, RISK_EPSILON};
pub use optimizer::{Allocation, Method, OptimizationResult, Optimizer};
pub use service::{
    FrontierResponse, HealthStatus, PortfolioRequest, PortfolioService, TickerValidation,
};
pub use settings::{EngineSettings, FallbackPolicy, FrontierBranch, SolverConfig, WeightBounds};
