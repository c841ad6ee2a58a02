//! CLI argument definitions for folio.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `optimize` | Optimal weights for a basket (min-variance or max-Sharpe) |
//! | `frontier` | Efficient frontier for a basket |
//! | `validate` | Check whether tickers exist upstream |
//! | `health` | Liveness report with version and timestamp |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--mock` | `false` | Use the deterministic offline price catalog |
//! | `--timeout-ms` | `30000` | Per-request budget for upstream fetches |
//!
//! # Examples
//!
//! ```bash
//! folio optimize AAPL MSFT GOOGL --method max-sharpe --pretty
//! folio frontier SPY TLT GLD --steps 20 --mock
//! folio validate AAPL ZZZZ
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use folio_optimization::{FallbackPolicy, FrontierBranch, Method};

/// Mean-variance portfolio optimizer over daily closing prices.
#[derive(Debug, Parser)]
#[command(
    name = "folio",
    author,
    version,
    about = "Mean-variance portfolio optimization CLI"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Serve prices from the built-in offline catalog instead of Yahoo.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    /// Upstream request budget in milliseconds. Overrides FOLIO_REQUEST_TIMEOUT_SECS.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Optimal portfolio weights for a basket.
    ///
    /// # Examples
    ///
    ///   folio optimize AAPL MSFT
    ///   folio optimize AAPL MSFT GOOGL --method max-sharpe --risk-free-rate 0.04
    ///   folio optimize SPY TLT --allow-short 0.5
    Optimize(OptimizeArgs),

    /// Efficient frontier sweep for a basket.
    ///
    /// # Examples
    ///
    ///   folio frontier AAPL MSFT GOOGL
    ///   folio frontier SPY TLT GLD --steps 20 --branch full
    Frontier(FrontierArgs),

    /// Check that one or more tickers exist upstream.
    ///
    /// # Examples
    ///
    ///   folio validate AAPL
    ///   folio validate AAPL ZZZZ --pretty
    Validate(ValidateArgs),

    /// Service liveness report.
    Health,
}

/// Basket, window, and engine overrides shared by `optimize` and `frontier`.
#[derive(Debug, Args)]
pub struct BasketArgs {
    /// Ticker symbols (2 to 20, e.g. AAPL MSFT GOOGL).
    #[arg(required = true, num_args = 1..)]
    pub tickers: Vec<String>,

    /// Optimization objective.
    #[arg(long, value_enum, default_value_t = MethodArg::MinVariance)]
    pub method: MethodArg,

    /// Trailing window in calendar days. Ignored when --start is given.
    #[arg(long, default_value_t = 365)]
    pub lookback_days: u32,

    /// Window start (YYYY-MM-DD). Requires --end.
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// Window end, exclusive (YYYY-MM-DD). Requires --start.
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Annual risk-free rate used for Sharpe ratios. Overrides FOLIO_RISK_FREE_RATE.
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// Allow short positions down to -LIMIT per asset.
    #[arg(long, value_name = "LIMIT")]
    pub allow_short: Option<f64>,

    /// What max-Sharpe returns when the solver does not converge.
    #[arg(long, value_enum, default_value_t = FallbackArg::Report)]
    pub fallback: FallbackArg,
}

#[derive(Debug, Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub basket: BasketArgs,
}

#[derive(Debug, Args)]
pub struct FrontierArgs {
    #[command(flatten)]
    pub basket: BasketArgs,

    /// Number of target returns to solve. Overrides FOLIO_FRONTIER_STEPS.
    #[arg(long)]
    pub steps: Option<usize>,

    /// Keep only the efficient branch, or every solved point.
    #[arg(long, value_enum, default_value_t = BranchArg::Efficient)]
    pub branch: BranchArg,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// One or more ticker symbols.
    #[arg(required = true, num_args = 1..)]
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    /// Global minimum variance.
    MinVariance,
    /// Tangency portfolio (maximum Sharpe ratio).
    MaxSharpe,
}

impl From<MethodArg> for Method {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::MinVariance => Method::MinVariance,
            MethodArg::MaxSharpe => Method::MaxSharpe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FallbackArg {
    /// Best iterate found, flagged unsuccessful.
    Report,
    /// Equal weights, flagged unsuccessful.
    EqualWeight,
}

impl From<FallbackArg> for FallbackPolicy {
    fn from(value: FallbackArg) -> Self {
        match value {
            FallbackArg::Report => FallbackPolicy::Report,
            FallbackArg::EqualWeight => FallbackPolicy::EqualWeight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BranchArg {
    /// Points at or above the minimum-variance return.
    Efficient,
    /// Every solved point.
    Full,
}

impl From<BranchArg> for FrontierBranch {
    fn from(value: BranchArg) -> Self {
        match value {
            BranchArg::Efficient => FrontierBranch::Efficient,
            BranchArg::Full => FrontierBranch::Full,
        }
    }
}
