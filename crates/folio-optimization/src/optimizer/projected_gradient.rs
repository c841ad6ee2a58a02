//! Spectral projected gradient (Birgin, Martínez & Raydan) on the budget box
//! `{ w : Σ w_i = 1, lower ≤ w_i ≤ upper }`, with a non-monotone Armijo search.

use std::time::Instant;

use ndarray::Array1;

use crate::settings::SolverConfig;

const STEP_MIN: f64 = 1e-10;
const STEP_MAX: f64 = 1e10;
const HISTORY: usize = 10;
const SUFFICIENT_DECREASE: f64 = 1e-4;
const MIN_BACKTRACK: f64 = 1e-16;

#[derive(Debug, Clone)]
pub(crate) struct SpgOutcome {
    /// Best (lowest objective) iterate seen.
    pub weights: Array1<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Euclidean projection onto the budget box, by bisection on the shift `τ`
/// in `clamp(v - τ, lower, upper)`.
pub(crate) fn project(v: &Array1<f64>, lower: f64, upper: f64) -> Array1<f64> {
    let total = |tau: f64| -> f64 { v.iter().map(|&x| (x - tau).clamp(lower, upper)).sum() };

    let mut lo = v.iter().fold(f64::INFINITY, |acc, &x| acc.min(x - upper));
    let mut hi = v.iter().fold(f64::NEG_INFINITY, |acc, &x| acc.max(x - lower));
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if total(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-15 * (1.0 + hi.abs()) {
            break;
        }
    }

    let tau = 0.5 * (lo + hi);
    v.mapv(|x| (x - tau).clamp(lower, upper))
}

/// Minimizes `objective` from `start`.
///
/// `objective` returns the value and gradient at a point.
pub(crate) fn minimize<F>(
    objective: F,
    start: Array1<f64>,
    lower: f64,
    upper: f64,
    config: &SolverConfig,
) -> SpgOutcome
where
    F: Fn(&Array1<f64>) -> (f64, Array1<f64>),
{
    let started = Instant::now();
    let mut w = project(&start, lower, upper);
    let (mut f, mut g) = objective(&w);

    let mut best = (f, w.clone());
    let mut history = vec![f];

    let initial_pg = sup_norm(&(project(&(&w - &g), lower, upper) - &w));
    let mut step = if initial_pg > 0.0 {
        (1.0 / initial_pg).clamp(STEP_MIN, STEP_MAX)
    } else {
        1.0
    };

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iterations && started.elapsed() < config.time_budget {
        let projected_gradient = project(&(&w - &g), lower, upper) - &w;
        if sup_norm(&projected_gradient) < config.tolerance {
            converged = true;
            break;
        }
        iterations += 1;

        let direction = project(&(&w - &(&g * step)), lower, upper) - &w;
        let slope = g.dot(&direction);
        let reference = history.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut alpha = 1.0_f64;
        let (candidate, f_new, g_new) = loop {
            let candidate = &w + &(&direction * alpha);
            let (f_new, g_new) = objective(&candidate);
            if f_new <= reference + SUFFICIENT_DECREASE * alpha * slope || alpha < MIN_BACKTRACK {
                break (candidate, f_new, g_new);
            }
            alpha *= 0.5;
        };

        if alpha < MIN_BACKTRACK {
            // No descent left at machine precision.
            converged = sup_norm(&projected_gradient) < config.tolerance.sqrt();
            break;
        }

        let s = &candidate - &w;
        let y = &g_new - &g;
        let sy = s.dot(&y);
        step = if sy > 0.0 {
            (s.dot(&s) / sy).clamp(STEP_MIN, STEP_MAX)
        } else {
            STEP_MAX
        };

        w = candidate;
        f = f_new;
        g = g_new;

        if f < best.0 {
            best = (f, w.clone());
        }
        history.push(f);
        if history.len() > HISTORY {
            history.remove(0);
        }
    }

    SpgOutcome {
        weights: best.1,
        iterations,
        converged,
    }
}

fn sup_norm(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn projection_lands_on_budget_box() {
        let projected = project(&array![0.9, 0.6, -0.2], 0.0, 1.0);
        assert!((projected.sum() - 1.0).abs() < 1e-12);
        assert!((projected[0] - 0.65).abs() < 1e-12);
        assert!((projected[1] - 0.35).abs() < 1e-12);
        assert_eq!(projected[2], 0.0);
    }

    #[test]
    fn projection_keeps_feasible_points() {
        let point = array![0.2, 0.3, 0.5];
        let projected = project(&point, 0.0, 1.0);
        for (a, b) in projected.iter().zip(point.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn minimizes_separable_quadratic() {
        // min (w0 - 0.8)² + (w1 - 0.6)² on the simplex -> (0.6, 0.4).
        let objective = |w: &Array1<f64>| {
            let target = array![0.8, 0.6];
            let diff = w - &target;
            (diff.dot(&diff), diff * 2.0)
        };

        let outcome = minimize(objective, array![0.5, 0.5], 0.0, 1.0, &SolverConfig::default());
        assert!(outcome.converged);
        assert!((outcome.weights[0] - 0.6).abs() < 1e-8);
        assert!((outcome.weights[1] - 0.4).abs() < 1e-8);
    }
}
