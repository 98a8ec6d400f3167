//! Small dense complex linear algebra used by the Fisher assembly.
//!
//! Every k-space cell needs `inverse(WᴴW + R)` for a 3×3 or 4×4 system:
//!
//! - the system is first equilibrated to a unit diagonal and inverted exactly
//!   through a Cholesky factorization, so a huge regularization entry on one
//!   parameter leaves the others untouched and a tiny one on an unmeasured
//!   parameter still yields `1/reg`
//! - singular systems (an empty cell with zero regularization, a cell holding
//!   a single row) get the Moore–Penrose inverse instead of garbage pivots
//! - an infinite regularization entry removes that parameter exactly: its
//!   row and column of the result are zero

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::error::AppError;

pub type CMatrix = DMatrix<Complex64>;

/// Singular values below `RCOND * σ_max` are treated as zero. An
/// unregularized system whose equilibrated Cholesky pivots fall below it is
/// treated as singular.
const RCOND: f64 = 1e-12;

/// Stack equal-length rows into a matrix, keeping the first `cols` columns.
pub fn rows_to_matrix<'a>(rows: impl ExactSizeIterator<Item = &'a [Complex64]>, cols: usize) -> CMatrix {
    let n = rows.len();
    let mut m = CMatrix::zeros(n, cols);
    for (i, row) in rows.enumerate() {
        for j in 0..cols.min(row.len()) {
            m[(i, j)] = row[j];
        }
    }
    m
}

/// `WᴴW`.
pub fn gram(w: &CMatrix) -> CMatrix {
    w.adjoint() * w
}

/// `inverse(gram + diag(reg))`, see the module docs for the singular cases.
pub fn regularized_inverse(gram: &CMatrix, reg: &[f64]) -> Result<CMatrix, AppError> {
    let n = gram.nrows();
    if gram.ncols() != n || reg.len() != n {
        return Err(AppError::new(
            4,
            format!(
                "Regularization shape mismatch: gram is {}x{}, regularization has {} entries.",
                gram.nrows(),
                gram.ncols(),
                reg.len()
            ),
        ));
    }

    let keep: Vec<usize> = (0..n).filter(|&i| reg[i].is_finite()).collect();
    let mut sub = CMatrix::from_fn(keep.len(), keep.len(), |i, j| gram[(keep[i], keep[j])]);
    for (i, &k) in keep.iter().enumerate() {
        sub[(i, i)] += Complex64::new(reg[k], 0.0);
    }

    if sub.iter().any(|v| !(v.re.is_finite() && v.im.is_finite())) {
        return Err(AppError::new(4, "Non-finite entry in matrix to invert."));
    }

    // Gram plus a positive diagonal is positive definite whatever its scale.
    let regularized = keep.iter().all(|&k| reg[k] > 0.0);
    let inv_sub = match cholesky_inverse(&sub, !regularized) {
        Some(inv) => inv,
        None => pseudo_inverse(sub)?,
    };
    if keep.len() == n {
        return Ok(inv_sub);
    }

    let mut out = CMatrix::zeros(n, n);
    for (i, &ki) in keep.iter().enumerate() {
        for (j, &kj) in keep.iter().enumerate() {
            out[(ki, kj)] = inv_sub[(i, j)];
        }
    }
    Ok(out)
}

/// Inverse of a Hermitian positive definite matrix, or `None` when it is not
/// (numerically) positive definite.
///
/// The matrix is scaled to a unit diagonal `S = D·A·D` before factoring and
/// the result scaled back, `A⁻¹ = D·S⁻¹·D`. With `check_pivots`, a squared
/// pivot of `S` below `RCOND` counts as singular.
fn cholesky_inverse(a: &CMatrix, check_pivots: bool) -> Option<CMatrix> {
    let n = a.nrows();
    if n == 0 {
        return Some(a.clone());
    }

    let mut scale = Vec::with_capacity(n);
    for i in 0..n {
        let d = a[(i, i)].re;
        if d <= 0.0 || !d.is_finite() {
            return None;
        }
        scale.push(d.sqrt().recip());
    }

    let s = CMatrix::from_fn(n, n, |i, j| a[(i, j)] * (scale[i] * scale[j]));
    let chol = s.cholesky()?;
    if check_pivots {
        let min_pivot = chol.l_dirty().diagonal().iter().map(|v| v.norm_sqr()).fold(f64::INFINITY, f64::min);
        if min_pivot < RCOND {
            return None;
        }
    }

    let inv = chol.inverse();
    let out = CMatrix::from_fn(n, n, |i, j| inv[(i, j)] * (scale[i] * scale[j]));
    out.iter().all(|v| v.re.is_finite() && v.im.is_finite()).then_some(out)
}

/// Moore–Penrose inverse with a relative singular-value cutoff.
pub fn pseudo_inverse(m: CMatrix) -> Result<CMatrix, AppError> {
    if m.is_empty() {
        return Ok(m);
    }
    if m.iter().any(|v| !(v.re.is_finite() && v.im.is_finite())) {
        return Err(AppError::new(4, "Non-finite entry in matrix to invert."));
    }

    let svd = m.svd(true, true);
    let sigma_max = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    svd.pseudo_inverse(sigma_max * RCOND)
        .map_err(|e| AppError::new(4, format!("SVD pseudo-inverse failed: {e}")))
}
