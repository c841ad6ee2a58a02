use std::str::FromStr;
use std::time::Duration;

use folio_core::{ConfigError, ValidationError};
use serde::{Deserialize, Serialize};

/// Per-asset weight limits shared by every asset in the basket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self::long_only()
    }
}

impl WeightBounds {
    /// `0 <= w_i <= 1`: no shorting, no leverage.
    pub const fn long_only() -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
        }
    }

    /// Allows each asset to go short by up to `limit` and long by up to `1 + limit`.
    pub fn with_shorts(limit: f64) -> Result<Self, ValidationError> {
        Self::new(-limit, 1.0 + limit)
    }

    /// Bounds must admit every fully invested long-only portfolio.
    pub fn new(lower: f64, upper: f64) -> Result<Self, ValidationError> {
        if !lower.is_finite() || !upper.is_finite() || lower > 0.0 || upper < 1.0 {
            return Err(ValidationError::InvalidArgument {
                name: "weight bounds",
                reason: format!("need lower <= 0 and upper >= 1, got [{lower}, {upper}]"),
            });
        }
        Ok(Self { lower, upper })
    }

    pub fn is_long_only(&self) -> bool {
        self.lower == 0.0 && self.upper == 1.0
    }
}

/// Iteration and time caps for the iterative solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    pub max_iterations: usize,
    pub time_budget: Duration,
    /// Stationarity tolerance (projected gradient, KKT step norm).
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1_000,
            time_budget: Duration::from_secs(2),
            tolerance: 1e-9,
        }
    }
}

/// What max-Sharpe returns when the solver stops before converging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Best feasible iterate found, flagged `success = false`.
    #[default]
    Report,
    /// Equal weights, flagged `success = false`. Must be requested explicitly.
    EqualWeight,
}

impl FromStr for FallbackPolicy {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "equal_weight" | "equal-weight" => Ok(Self::EqualWeight),
            other => Err(ValidationError::InvalidArgument {
                name: "fallback policy",
                reason: format!("expected 'report' or 'equal_weight', got '{other}'"),
            }),
        }
    }
}

/// Which part of the mean-variance boundary a frontier sweep keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontierBranch {
    /// Points at or above the global minimum-variance return.
    #[default]
    Efficient,
    /// Every solved target, lower branch included.
    Full,
}

impl FromStr for FrontierBranch {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "efficient" | "upper" => Ok(Self::Efficient),
            "full" | "both" => Ok(Self::Full),
            other => Err(ValidationError::InvalidArgument {
                name: "frontier branch",
                reason: format!("expected 'efficient' or 'full', got '{other}'"),
            }),
        }
    }
}

/// Engine-wide knobs for estimation, optimization, and frontier sweeps.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub risk_free_rate: f64,
    /// Minimum number of overlapping daily returns per ticker.
    pub min_observations: usize,
    pub frontier_steps: usize,
    pub max_tickers: usize,
    pub solver: SolverConfig,
    pub bounds: WeightBounds,
    pub fallback: FallbackPolicy,
    pub frontier_branch: FrontierBranch,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            min_observations: 30,
            frontier_steps: 50,
            max_tickers: 20,
            solver: SolverConfig::default(),
            bounds: WeightBounds::long_only(),
            fallback: FallbackPolicy::Report,
            frontier_branch: FrontierBranch::Efficient,
        }
    }
}

impl EngineSettings {
    /// Defaults overridden by `FOLIO_RISK_FREE_RATE`, `FOLIO_MIN_OBSERVATIONS`
    /// and `FOLIO_FRONTIER_STEPS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(rate) = parse_var::<f64, _>(&lookup, "FOLIO_RISK_FREE_RATE")? {
            if !rate.is_finite() {
                return Err(ConfigError::InvalidValue {
                    name: "FOLIO_RISK_FREE_RATE",
                    value: rate.to_string(),
                });
            }
            settings.risk_free_rate = rate;
        }
        if let Some(count) = parse_var::<usize, _>(&lookup, "FOLIO_MIN_OBSERVATIONS")? {
            if count == 0 {
                return Err(ConfigError::NonPositive {
                    name: "FOLIO_MIN_OBSERVATIONS",
                });
            }
            settings.min_observations = count;
        }
        if let Some(steps) = parse_var::<usize, _>(&lookup, "FOLIO_FRONTIER_STEPS")? {
            if steps == 0 {
                return Err(ConfigError::NonPositive {
                    name: "FOLIO_FRONTIER_STEPS",
                });
            }
            settings.frontier_steps = steps;
        }

        Ok(settings)
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidValue { name, value: raw })
        })
        .transpose()
}
