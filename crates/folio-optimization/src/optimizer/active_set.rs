//! Primal active-set method for the box- and equality-constrained QP
//!
//! ```text
//! minimize  ½ wᵀ G w
//! subject   A w = b,   lower ≤ w ≤ upper
//! ```
//!
//! where `G` is positive definite and `A` has one or two rows. The iterate
//! stays feasible throughout; each step solves an equality-constrained QP on
//! the free variables, moves to the first blocking bound, or releases the
//! bound with the most negative multiplier.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use crate::linalg;
use crate::settings::SolverConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Lower,
    Upper,
}

/// Feasible QP instance.
pub(crate) struct BoxQp<'a> {
    pub hessian: &'a Array2<f64>,
    /// Equality rows; `equalities.nrows()` is 1 or 2.
    pub equalities: &'a Array2<f64>,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct QpOutcome {
    pub weights: Array1<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl BoxQp<'_> {
    /// Runs from a point that already satisfies every constraint.
    pub fn solve(&self, start: Array1<f64>, config: &SolverConfig) -> QpOutcome {
        let n = start.len();
        let started = Instant::now();
        let mut w = start;
        let mut working: Vec<Option<Bound>> = vec![None; n];

        let mut iterations = 0;
        while iterations < config.max_iterations && started.elapsed() < config.time_budget {
            iterations += 1;

            let gradient = self.hessian.dot(&w);
            let free: Vec<usize> = (0..n).filter(|&i| working[i].is_none()).collect();

            let Some((step, multipliers)) = self.equality_step(&free, &gradient) else {
                // Singular reduced KKT: release a bound so the system regains rank.
                match working.iter().position(Option::is_some) {
                    Some(i) => {
                        working[i] = None;
                        continue;
                    }
                    None => break,
                }
            };

            let step_norm = sup_norm(&step);
            if step_norm <= config.tolerance * (1.0 + sup_norm(&w)) {
                let scale = gradient.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
                let constraint_force = self.equalities.t().dot(&multipliers);

                let mut worst: Option<(usize, f64)> = None;
                for (i, bound) in working.iter().enumerate() {
                    let Some(bound) = bound else { continue };
                    let residual = gradient[i] - constraint_force[i];
                    let multiplier = match bound {
                        Bound::Lower => residual,
                        Bound::Upper => -residual,
                    };
                    if multiplier < -config.tolerance * scale
                        && worst.map_or(true, |(_, m)| multiplier < m)
                    {
                        worst = Some((i, multiplier));
                    }
                }

                match worst {
                    Some((i, _)) => working[i] = None,
                    None => {
                        return QpOutcome {
                            weights: w,
                            iterations,
                            converged: true,
                        }
                    }
                }
                continue;
            }

            let mut alpha = 1.0_f64;
            let mut blocking: Option<(usize, Bound)> = None;
            for &i in &free {
                let p = step[i];
                let candidate = if p < 0.0 {
                    Some(((self.lower - w[i]) / p, Bound::Lower))
                } else if p > 0.0 {
                    Some(((self.upper - w[i]) / p, Bound::Upper))
                } else {
                    None
                };
                if let Some((limit, bound)) = candidate {
                    let limit = limit.max(0.0);
                    if limit < alpha {
                        alpha = limit;
                        blocking = Some((i, bound));
                    }
                }
            }

            for &i in &free {
                w[i] += alpha * step[i];
            }
            if let Some((i, bound)) = blocking {
                w[i] = match bound {
                    Bound::Lower => self.lower,
                    Bound::Upper => self.upper,
                };
                working[i] = Some(bound);
            }
        }

        QpOutcome {
            weights: w,
            iterations,
            converged: false,
        }
    }

    /// Step `p` (zero on fixed variables) and equality multipliers `λ` from
    ///
    /// ```text
    /// [ G_FF  A_Fᵀ ] [  p_F ]   [ -g_F ]
    /// [ A_F   0    ] [ -λ   ] = [  0   ]
    /// ```
    ///
    /// Rows of `A_F` that are linearly dependent on the free set are dropped
    /// and their multipliers reported as zero.
    fn equality_step(
        &self,
        free: &[usize],
        gradient: &Array1<f64>,
    ) -> Option<(Array1<f64>, Array1<f64>)> {
        let n = gradient.len();
        let rows = self.independent_rows(free);
        let k = free.len();
        let m = rows.len();
        let size = k + m;

        let mut step = Array1::<f64>::zeros(n);
        let mut multipliers = Array1::<f64>::zeros(self.equalities.nrows());
        if k == 0 {
            return Some((step, multipliers));
        }

        let kkt = DMatrix::from_fn(size, size, |a, b| match (a < k, b < k) {
            (true, true) => self.hessian[[free[a], free[b]]],
            (true, false) => self.equalities[[rows[b - k], free[a]]],
            (false, true) => self.equalities[[rows[a - k], free[b]]],
            (false, false) => 0.0,
        });
        let rhs = DVector::from_fn(size, |a, _| if a < k { -gradient[free[a]] } else { 0.0 });

        let solution = linalg::solve(kkt, rhs)?;
        for (a, &i) in free.iter().enumerate() {
            step[i] = solution[a];
        }
        for (r, &row) in rows.iter().enumerate() {
            multipliers[row] = -solution[k + r];
        }
        Some((step, multipliers))
    }

    fn independent_rows(&self, free: &[usize]) -> Vec<usize> {
        let mut kept: Vec<usize> = Vec::with_capacity(self.equalities.nrows());
        for row in 0..self.equalities.nrows() {
            let candidate: Vec<f64> = free.iter().map(|&i| self.equalities[[row, i]]).collect();
            let norm = candidate.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm <= f64::EPSILON {
                continue;
            }

            // Residual of `candidate` after projecting out each kept row.
            let mut residual = candidate.clone();
            for &kept_row in &kept {
                let basis: Vec<f64> =
                    free.iter().map(|&i| self.equalities[[kept_row, i]]).collect();
                let bb: f64 = basis.iter().map(|v| v * v).sum();
                let rb: f64 = residual.iter().zip(&basis).map(|(r, b)| r * b).sum();
                for (r, b) in residual.iter_mut().zip(&basis) {
                    *r -= rb / bb * b;
                }
            }
            let residual_norm = residual.iter().map(|v| v * v).sum::<f64>().sqrt();
            if residual_norm > 1e-10 * norm {
                kept.push(row);
            }
        }
        kept
    }
}

fn sup_norm(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}
