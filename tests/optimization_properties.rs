//! Property checks for the optimizer, metrics, and frontier sweep.
//!
//! These tests verify WHAT every returned allocation satisfies, independent of
//! where the moments came from.

use std::collections::BTreeMap;

use folio_optimization::{
    FrontierBranch, FrontierGenerator, Method, MetricsCalculator, OptimizationResult, Optimizer,
    PortfolioError, ReturnEstimator, WeightBounds,
};
use folio_tests::*;
use ndarray::{array, Array1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WEIGHT_TOLERANCE: f64 = 1e-6;

fn four_asset() -> MarketEstimate {
    estimate(
        &["AAA", "BBB", "CCC", "DDD"],
        array![0.14, 0.10, 0.06, 0.03],
        array![
            [0.090, 0.018, 0.006, 0.000],
            [0.018, 0.050, 0.010, 0.002],
            [0.006, 0.010, 0.030, 0.004],
            [0.000, 0.002, 0.004, 0.010]
        ],
    )
}

fn ordered_weights(result: &OptimizationResult, estimate: &MarketEstimate) -> Array1<f64> {
    estimate
        .tickers()
        .iter()
        .map(|t| result.weights[t.as_str()])
        .collect()
}

fn assert_valid_weights(weights: &BTreeMap<String, f64>, bounds: WeightBounds) {
    let total: f64 = weights.values().sum();
    assert!((total - 1.0).abs() < WEIGHT_TOLERANCE, "weights sum to {total}");
    for (ticker, &w) in weights {
        assert!(
            w >= bounds.lower - WEIGHT_TOLERANCE && w <= bounds.upper + WEIGHT_TOLERANCE,
            "{ticker} weight {w} outside [{}, {}]",
            bounds.lower,
            bounds.upper
        );
    }
}

// =============================================================================
// Optimizer: Known answers
// =============================================================================

#[test]
fn when_assets_are_uncorrelated_system_weights_min_variance_by_inverse_variance() {
    // Given: Two uncorrelated assets with variances 0.04 and 0.02
    let estimate = estimate(&["AAA", "BBB"], array![0.10, 0.06], array![[0.04, 0.0], [0.0, 0.02]]);
    let optimizer = Optimizer::new(&EngineSettings::default());

    // When: The minimum-variance portfolio is solved
    let result = optimizer.solve(Method::MinVariance, &estimate).expect("solvable");

    // Then: Weights are proportional to inverse variance
    assert!(result.success);
    assert_eq!(result.message, "Optimization terminated successfully");
    assert!((result.weights["AAA"] - 1.0 / 3.0).abs() < 1e-6);
    assert!((result.weights["BBB"] - 2.0 / 3.0).abs() < 1e-6);
    assert!((result.exp_return - 0.22 / 3.0).abs() < 1e-6);
    assert!((result.exp_risk - (0.04_f64 / 3.0).sqrt()).abs() < 1e-6);
}

#[test]
fn when_risk_free_rate_is_set_system_targets_the_tangency_portfolio() {
    // Given: Uncorrelated assets and r_f = 0.02, so Σ⁻¹(μ - r_f) is proportional to [1, 1]
    let estimate = estimate(&["AAA", "BBB"], array![0.10, 0.06], array![[0.04, 0.0], [0.0, 0.02]]);
    let settings = EngineSettings {
        risk_free_rate: 0.02,
        ..EngineSettings::default()
    };
    let optimizer = Optimizer::new(&settings);

    // When: The maximum-Sharpe portfolio is solved
    let result = optimizer.solve(Method::MaxSharpe, &estimate).expect("solvable");

    // Then: The allocation is split evenly
    assert!(result.success);
    assert!((result.weights["AAA"] - 0.5).abs() < 1e-5);
    assert!((result.weights["BBB"] - 0.5).abs() < 1e-5);
}

// =============================================================================
// Optimizer: Invariants
// =============================================================================

#[test]
fn when_any_method_succeeds_system_returns_weights_on_the_simplex() {
    // Given: A correlated four-asset market
    let estimate = four_asset();
    let optimizer = Optimizer::new(&EngineSettings::default());

    for method in [Method::MinVariance, Method::MaxSharpe] {
        // When: Each method is solved
        let result = optimizer.solve(method, &estimate).expect("solvable");

        // Then: Weights are long-only and fully invested
        assert_valid_weights(&result.weights, WeightBounds::long_only());
        assert_eq!(result.weights.len(), 4);
        assert_eq!(result.method, method);
    }
}

#[test]
fn when_shorting_is_allowed_system_respects_the_wider_bounds() {
    // Given: Bounds that permit shorting each asset by up to 50%
    let bounds = WeightBounds::with_shorts(0.5).expect("valid bounds");
    let settings = EngineSettings {
        bounds,
        ..EngineSettings::default()
    };
    let optimizer = Optimizer::new(&settings);
    let long_only = Optimizer::new(&EngineSettings::default());

    // When: The minimum-variance portfolio is solved both ways
    let short = optimizer.solve(Method::MinVariance, &four_asset()).expect("solvable");
    let long = long_only.solve(Method::MinVariance, &four_asset()).expect("solvable");

    // Then: The short-enabled result stays within its bounds and is no riskier
    assert_valid_weights(&short.weights, bounds);
    assert!(short.exp_risk <= long.exp_risk + 1e-9);
}

#[test]
fn when_min_variance_is_solved_system_beats_random_feasible_portfolios() {
    // Given: A four-asset market and a thousand random long-only portfolios
    let estimate = four_asset();
    let optimizer = Optimizer::new(&EngineSettings::default());
    let metrics = MetricsCalculator::new(0.0);
    let mut rng = StdRng::seed_from_u64(20_240_101);

    // When: The minimum-variance portfolio is solved
    let result = optimizer.solve(Method::MinVariance, &estimate).expect("solvable");

    // Then: No sampled portfolio has lower risk
    for _ in 0..1_000 {
        let raw: Array1<f64> = (0..estimate.len()).map(|_| rng.gen::<f64>()).collect();
        let sample = &raw / raw.sum();
        let risk = metrics.portfolio_performance(&estimate, &sample).risk;
        assert!(
            result.exp_risk <= risk + 1e-9,
            "sample {sample:?} has risk {risk} below optimum {}",
            result.exp_risk
        );
    }
}

#[test]
fn when_result_is_returned_system_reports_sharpe_consistent_with_its_weights() {
    // Given: A four-asset market and a non-zero risk-free rate
    let estimate = four_asset();
    let settings = EngineSettings {
        risk_free_rate: 0.015,
        ..EngineSettings::default()
    };
    let optimizer = Optimizer::new(&settings);
    let metrics = MetricsCalculator::new(settings.risk_free_rate);

    for method in [Method::MinVariance, Method::MaxSharpe] {
        // When: The result's weights are re-scored independently
        let result = optimizer.solve(method, &estimate).expect("solvable");
        let weights = ordered_weights(&result, &estimate);
        let rescored = metrics.portfolio_performance(&estimate, &weights);

        // Then: Every reported figure matches
        assert!((rescored.sharpe - result.sharpe).abs() < 1e-6);
        assert!((rescored.risk - result.exp_risk).abs() < 1e-6);
        assert!((rescored.expected_return - result.exp_return).abs() < 1e-6);
    }
}

#[test]
fn when_max_sharpe_is_solved_system_is_not_beaten_by_min_variance() {
    // Given: A four-asset market
    let estimate = four_asset();
    let optimizer = Optimizer::new(&EngineSettings::default());

    // When: Both methods are solved
    let sharpe = optimizer.solve(Method::MaxSharpe, &estimate).expect("solvable");
    let min_var = optimizer.solve(Method::MinVariance, &estimate).expect("solvable");

    // Then: The max-Sharpe portfolio has the higher ratio
    assert!(sharpe.sharpe >= min_var.sharpe - 1e-9);
}

#[test]
fn when_covariance_is_singular_system_still_finds_a_feasible_minimum() {
    // Given: Two identical assets and one independent asset
    let estimate = estimate(
        &["AAA", "BBB", "CCC"],
        array![0.08, 0.08, 0.05],
        array![[0.04, 0.04, 0.0], [0.04, 0.04, 0.0], [0.0, 0.0, 0.01]],
    );
    let optimizer = Optimizer::new(&EngineSettings::default());

    // When: The minimum-variance portfolio is solved
    let result = optimizer.solve(Method::MinVariance, &estimate).expect("solvable");

    // Then: The duplicate pair is treated as one asset with variance 0.04
    assert_valid_weights(&result.weights, WeightBounds::long_only());
    let pair = result.weights["AAA"] + result.weights["BBB"];
    assert!((pair - 0.2).abs() < 1e-5);
    assert!((result.exp_risk - 0.008_f64.sqrt()).abs() < 1e-5);
}

// =============================================================================
// Frontier
// =============================================================================

#[test]
fn when_frontier_is_sorted_by_return_system_risk_never_decreases() {
    // Given: A four-asset market
    let estimate = four_asset();
    let optimizer = Optimizer::new(&EngineSettings::default());

    // When: The efficient branch is swept
    let mut points = FrontierGenerator::new(&optimizer, FrontierBranch::Efficient)
        .generate(&estimate, 25)
        .expect("sweep succeeds");
    points.sort_by(|a, b| a.expected_return.total_cmp(&b.expected_return));

    // Then: Risk is non-decreasing in return above the minimum-variance point
    assert!(!points.is_empty());
    assert!(points
        .windows(2)
        .all(|pair| pair[1].risk >= pair[0].risk - 1e-9));
    for point in &points {
        assert!((point.weights.iter().sum::<f64>() - 1.0).abs() < WEIGHT_TOLERANCE);
        let range = -WEIGHT_TOLERANCE..=1.0 + WEIGHT_TOLERANCE;
        assert!(point.weights.iter().all(|w| range.contains(w)));
    }
}

#[test]
fn when_frontier_is_swept_system_never_beats_the_minimum_variance_risk() {
    // Given: A four-asset market and its global minimum-variance risk
    let estimate = four_asset();
    let optimizer = Optimizer::new(&EngineSettings::default());
    let floor = optimizer
        .solve(Method::MinVariance, &estimate)
        .expect("solvable")
        .exp_risk;

    // When: The full frontier is swept
    let points = FrontierGenerator::new(&optimizer, FrontierBranch::Full)
        .generate(&estimate, 15)
        .expect("sweep succeeds");

    // Then: No point is less risky than the global minimum
    assert_eq!(points.len(), 15);
    assert!(points.iter().all(|p| p.risk >= floor - 1e-7));
}

// =============================================================================
// Estimation
// =============================================================================

#[tokio::test]
async fn when_history_is_too_short_system_reports_insufficient_data() {
    // Given: A provider that only has ten trading days
    let source = Arc::new(ScriptedSource::healthy().with_days(10));
    let cache = cache_over(source, std::time::Duration::from_secs(60));
    let prices = cache
        .fetch(&tickers(&["AAPL", "MSFT"]), Lookback::one_year())
        .await
        .expect("fetch succeeds");
    let series: Vec<PriceSeries> = prices.series().values().cloned().collect();

    // When: Moments are estimated with the default minimum of 30 returns
    let error = ReturnEstimator::new(30)
        .estimate(&series)
        .expect_err("too few returns");

    // Then: The error reports the shortfall
    assert_eq!(
        error,
        PortfolioError::InsufficientData {
            ticker: "AAPL".to_owned(),
            observations: 9,
            required: 30,
        }
    );
}

#[tokio::test]
async fn when_history_is_long_enough_system_estimates_valid_moments() {
    // Given: A year of scripted prices for three tickers
    let source = Arc::new(ScriptedSource::healthy());
    let cache = cache_over(source, std::time::Duration::from_secs(60));
    let basket = tickers(&["AAPL", "MSFT", "TLT"]);
    let prices = cache.fetch(&basket, Lookback::one_year()).await.expect("fetch succeeds");
    let series: Vec<PriceSeries> = basket
        .iter()
        .map(|t| prices.get(t).cloned().expect("series present"))
        .collect();

    // When: Moments are estimated
    let estimate = ReturnEstimator::new(30).estimate(&series).expect("enough data");

    // Then: Dimensions follow the basket and variances are positive
    assert_eq!(estimate.tickers(), basket.as_slice());
    assert_eq!(estimate.observations(), 259);
    assert_eq!(estimate.covariance().dim(), (3, 3));
    assert!(estimate.covariance().diag().iter().all(|&v| v > 0.0));
}

#[test]
fn when_basket_holds_a_riskless_asset_system_reports_a_bounded_sharpe() {
    // Given: A cash-like series compounding at a fixed daily rate and a volatile equity
    let start = time::macros::date!(2024 - 01 - 01);
    let build = |symbol: &str, close: &dyn Fn(usize) -> f64| {
        let points = (0..120)
            .map(|i| PricePoint::new(start + time::Duration::days(i as i64), close(i)))
            .collect();
        let ticker = Ticker::parse(symbol).expect("valid ticker");
        PriceSeries::new(ticker, points).expect("valid series")
    };
    let cash = build("CASH", &|i| 100.0 * 1.0001_f64.powi(i as i32));
    let equity = build("EQ", &|i| 100.0 + 0.2 * i as f64 + if i % 2 == 0 { 1.5 } else { -1.5 });
    let estimate = ReturnEstimator::new(30).estimate(&[cash, equity]).expect("enough data");

    // When: The maximum-Sharpe portfolio is solved
    let result = Optimizer::new(&EngineSettings::default())
        .solve(Method::MaxSharpe, &estimate)
        .expect("solvable");

    // Then: The riskless asset is held and the reported ratio stays finite and small
    assert!(result.success, "{}", result.message);
    assert!(result.weights["CASH"] > 1.0 - WEIGHT_TOLERANCE);
    assert!(result.sharpe.is_finite());
    assert!(result.sharpe.abs() < 1e3, "sharpe {}", result.sharpe);
}
