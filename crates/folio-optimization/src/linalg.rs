//! Dense kernels on nalgebra. Matrices here are at most `max_tickers + 2` wide.

use nalgebra::{DMatrix, DVector};
use ndarray::Array2;

/// Pivots smaller than this fraction of the largest entry count as zero.
const PIVOT_TOLERANCE: f64 = 1e-13;

pub(crate) fn to_dmatrix(m: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[[i, j]])
}

/// Solves `a x = b` through an LU factorization with partial pivoting.
///
/// Returns `None` when `U` has a pivot below `PIVOT_TOLERANCE` of the largest
/// entry of `a`, so rank-deficient systems are reported instead of amplified.
pub(crate) fn solve(a: DMatrix<f64>, b: DVector<f64>) -> Option<DVector<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return None;
    }
    if n == 0 {
        return Some(b);
    }

    let scale = a.amax().max(f64::MIN_POSITIVE);
    let lu = a.lu();
    if lu
        .u()
        .diagonal()
        .iter()
        .any(|pivot| pivot.abs() <= PIVOT_TOLERANCE * scale)
    {
        return None;
    }

    lu.solve(&b).filter(|x| x.iter().all(|v| v.is_finite()))
}

/// Cholesky test on `m + δI`, with `δ = tolerance * max(1, max diag)`.
///
/// Accepts singular matrices (duplicate assets) and rejects matrices with a
/// materially negative eigenvalue.
pub(crate) fn is_positive_semidefinite(m: &Array2<f64>, tolerance: f64) -> bool {
    let n = m.nrows();
    if m.ncols() != n {
        return false;
    }

    let max_diag = (0..n).fold(1.0_f64, |acc, i| acc.max(m[[i, i]].abs()));
    let shifted = to_dmatrix(m) + DMatrix::<f64>::identity(n, n) * (tolerance * max_diag);
    shifted.cholesky().is_some()
}

#[cfg(test)]
mod tests {
    use nalgebra::{dmatrix, dvector};
    use ndarray::array;

    use super::*;

    #[test]
    fn solves_system_needing_a_pivot_swap() {
        let x = solve(dmatrix![0.0, 2.0; 3.0, 1.0], dvector![4.0, 5.0]).expect("non-singular");
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn singular_system_returns_none() {
        assert!(solve(dmatrix![1.0, 2.0; 2.0, 4.0], dvector![1.0, 2.0]).is_none());
    }

    #[test]
    fn converts_row_major_arrays() {
        let m = to_dmatrix(&array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m[(0, 2)], 3.0);
        assert_eq!(m[(1, 0)], 4.0);
    }

    #[test]
    fn psd_check_accepts_singular_and_rejects_indefinite() {
        let duplicate = array![[0.04, 0.04], [0.04, 0.04]];
        assert!(is_positive_semidefinite(&duplicate, 1e-10));

        let indefinite = array![[0.04, 0.10], [0.10, 0.04]];
        assert!(!is_positive_semidefinite(&indefinite, 1e-10));
    }
}
