//! Small dense linear-algebra helpers for Stokes-sized matrices.

use nalgebra::{DMatrix, DVector};

use crate::error::{MonteCarloError, MonteCarloResult};

/// Order of the Padé approximant used by [`matrix_exp`].
const PADE_ORDER: usize = 6;

/// Matrix exponential by Padé approximation with scaling and squaring.
///
/// The matrix is scaled by 2^-j until its infinity norm is below 1/2, the
/// diagonal Padé approximant of order [`PADE_ORDER`] is evaluated and the
/// result is squared j times (Golub & Van Loan, Algorithm 11.3.1). Diagonal
/// input is exponentiated element-wise, which covers unpolarized extinction.
pub fn matrix_exp(a: &DMatrix<f64>) -> MonteCarloResult<DMatrix<f64>> {
    if !a.is_square() {
        return Err(MonteCarloError::inconsistency(format!(
            "matrix exponential of a non-square {}x{} matrix",
            a.nrows(),
            a.ncols()
        )));
    }
    if a.iter().any(|x| !x.is_finite()) {
        return Err(MonteCarloError::inconsistency(
            "matrix exponential of a matrix with non-finite entries",
        ));
    }
    let n = a.nrows();
    if is_diagonal(a) {
        return Ok(DMatrix::from_diagonal(&a.diagonal().map(f64::exp)));
    }

    let norm = infinity_norm(a);
    let j = if norm > 0.0 {
        (norm.log2().floor() as i32 + 2).max(0)
    } else {
        0
    };
    let scaled = a / 2f64.powi(j);

    let q = PADE_ORDER;
    let mut c = 1.0;
    let mut x = DMatrix::<f64>::identity(n, n);
    let mut numerator = DMatrix::<f64>::identity(n, n);
    let mut denominator = DMatrix::<f64>::identity(n, n);
    for k in 1..=q {
        c *= (q - k + 1) as f64 / (k * (2 * q - k + 1)) as f64;
        x = &scaled * &x;
        numerator += c * &x;
        if k % 2 == 0 {
            denominator += c * &x;
        } else {
            denominator -= c * &x;
        }
    }

    let mut result = denominator.lu().solve(&numerator).ok_or_else(|| {
        MonteCarloError::inconsistency("singular Padé denominator in matrix exponential")
    })?;
    for _ in 0..j {
        result = &result * &result;
    }
    Ok(result)
}

/// Largest absolute row sum.
pub fn infinity_norm(a: &DMatrix<f64>) -> f64 {
    a.row_iter()
        .map(|row| row.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

pub fn is_diagonal(a: &DMatrix<f64>) -> bool {
    for (i, j) in (0..a.nrows()).flat_map(|i| (0..a.ncols()).map(move |j| (i, j))) {
        if i != j && a[(i, j)] != 0.0 {
            return false;
        }
    }
    true
}

/// Fail with an inconsistency error if any entry is NaN or infinite.
pub fn ensure_finite_vector(v: &DVector<f64>, what: &str) -> MonteCarloResult<()> {
    if v.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(MonteCarloError::inconsistency(format!("{} contains non-finite values: {:?}", what, v.as_slice())))
    }
}

pub fn ensure_finite_matrix(m: &DMatrix<f64>, what: &str) -> MonteCarloResult<()> {
    if m.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(MonteCarloError::inconsistency(format!("{} contains non-finite values", what)))
    }
}
