//! Canonical correlation analysis of two band sets
//!
//! Solves the pair of generalized symmetric eigenproblems
//!
//! ```text
//! (S12 S22⁻¹ S21) a = λ S11 a
//! (S21 S11⁻¹ S12) b = λ S22 b
//! ```
//!
//! Both right-hand matrices are covariance blocks and therefore symmetric
//! positive definite for non-degenerate input. Each problem is reduced to
//! an ordinary symmetric one through the Cholesky factor `S = L Lᵗ`:
//! `(L⁻¹ M L⁻ᵗ) y = λ y` with `x = L⁻ᵗ y`. The reduced matrix is symmetric,
//! so its eigenvalues are real and no imaginary residue has to be dropped.
//!
//! The columns of `b` are then paired with those of `a` through
//! `b ∝ S22⁻¹ S21 a`, which satisfies the second problem with the same
//! eigenvalue. Solving the two problems independently is not enough when
//! eigenvalues are tied: each solver may pick a different basis of the
//! shared eigenspace, and a pure gain/offset between dates (every
//! correlation equal to 1) would then show up as change.
//!
//! Eigenpairs are ordered by ascending eigenvalue with a stable sort, so
//! exactly tied eigenvalues keep the column order reported by
//! `nalgebra::SymmetricEigen`. Which eigenvector ends up first among ties
//! is therefore a property of the eigensolver, not of the data.

use madchange_core::{Error, Result};
use nalgebra::{Cholesky, DMatrix, Dyn, SymmetricEigen};
use ndarray::{Array1, Array2};

/// Sweep limit handed to the symmetric eigensolver
const MAX_EIGEN_SWEEPS: usize = 1000;

/// Cross-correlations with magnitude at or below this are treated as zero
/// when fixing signs: the column sign is left unchanged.
const SIGN_TOLERANCE: f64 = 1e-12;

/// Squared correlation below which a projected `b` column is considered
/// empty and the eigensolver's own vector is kept.
const MIN_PAIRED_VARIANCE: f64 = 1e-12;

/// Canonical correlations and the transforms that produce them
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalCorrelation {
    /// Canonical correlations, ascending, one per band, in `[0, 1]`
    pub rho: Array1<f64>,
    /// Pre-image transform (`B x B`), one canonical vector per column
    pub a: Array2<f64>,
    /// Post-image transform (`B x B`), one canonical vector per column
    pub b: Array2<f64>,
}

/// Canonical correlation structure between the pre bands (`S11`) and the
/// post bands (`S22`) of a partitioned covariance matrix.
///
/// The columns of `a` and `b` are scaled to unit variance
/// (`diag(aᵗ S11 a) = diag(bᵗ S22 b) = 1`) and the columns of `b` are
/// signed so that every canonical pair is positively correlated
/// (`diag(aᵗ S12 b) >= 0`).
///
/// # Errors
/// `Error::LinearAlgebra` when `S11` or `S22` is not positive definite,
/// the eigensolver does not converge, or a non-finite value appears.
/// Inputs are only borrowed; nothing is modified on failure.
pub fn canonical_correlation(
    s11: &Array2<f64>,
    s12: &Array2<f64>,
    s21: &Array2<f64>,
    s22: &Array2<f64>,
) -> Result<CanonicalCorrelation> {
    let bands = s11.nrows();
    for (name, m) in [("S11", s11), ("S12", s12), ("S21", s21), ("S22", s22)] {
        if m.dim() != (bands, bands) {
            return Err(Error::LinearAlgebra(format!(
                "{} is {}x{}, expected {}x{}",
                name,
                m.nrows(),
                m.ncols(),
                bands,
                bands
            )));
        }
        if m.iter().any(|v| !v.is_finite()) {
            return Err(Error::LinearAlgebra(format!("{} has non-finite entries", name)));
        }
    }

    let s11 = to_dmatrix(s11);
    let s12 = to_dmatrix(s12);
    let s21 = to_dmatrix(s21);
    let s22 = to_dmatrix(s22);

    let chol11 = cholesky(&s11, "S11")?;
    let chol22 = cholesky(&s22, "S22")?;

    let m_a = &s12 * chol22.solve(&s21);
    let m_b = &s21 * chol11.solve(&s12);

    let (lambda_a, a) = generalized_eigen(&m_a, &chol11, "a")?;
    let (lambda_b, b) = generalized_eigen(&m_b, &chol22, "b")?;

    let a = sorted_columns(&a, &ascending_order(&lambda_a));
    let order_b = ascending_order(&lambda_b);
    let b = paired_columns(&a, &sorted_columns(&b, &order_b), &s21, &s22, &chol22);

    let rho: Vec<f64> = order_b
        .iter()
        .map(|&i| lambda_b[i].clamp(0.0, 1.0).sqrt())
        .collect();

    let a = unit_variance(a, &s11, "a")?;
    let mut b = unit_variance(b, &s22, "b")?;

    let cross = a.transpose() * &s12 * &b;
    for j in 0..bands {
        if cross[(j, j)] < -SIGN_TOLERANCE {
            b.column_mut(j).neg_mut();
        }
    }

    Ok(CanonicalCorrelation {
        rho: Array1::from_vec(rho),
        a: to_array(&a),
        b: to_array(&b),
    })
}

fn cholesky(m: &DMatrix<f64>, name: &str) -> Result<Cholesky<f64, Dyn>> {
    Cholesky::new(m.clone())
        .ok_or_else(|| Error::LinearAlgebra(format!("{} is singular or not positive definite", name)))
}

/// Solve `m x = λ s x` for symmetric `m` given the Cholesky factor of `s`.
/// Eigenvalues come back in the solver's native order.
fn generalized_eigen(
    m: &DMatrix<f64>,
    chol: &Cholesky<f64, Dyn>,
    label: &str,
) -> Result<(Vec<f64>, DMatrix<f64>)> {
    let l = chol.l();
    let singular = || Error::LinearAlgebra(format!("triangular solve failed for transform {}", label));

    // L⁻¹ M, then L⁻¹ (L⁻¹ M)ᵗ = L⁻¹ M L⁻ᵗ since M is symmetric
    let half = l.solve_lower_triangular(m).ok_or_else(singular)?;
    let reduced = l.solve_lower_triangular(&half.transpose()).ok_or_else(singular)?;
    let reduced = (&reduced + reduced.transpose()) * 0.5;

    let eigen = SymmetricEigen::try_new(reduced, f64::EPSILON, MAX_EIGEN_SWEEPS).ok_or_else(|| {
        Error::LinearAlgebra(format!("eigensolver did not converge for transform {}", label))
    })?;

    if eigen.eigenvalues.iter().any(|v| !v.is_finite()) {
        return Err(Error::LinearAlgebra(format!(
            "non-finite eigenvalue for transform {}",
            label
        )));
    }

    let vectors = l
        .transpose()
        .solve_upper_triangular(&eigen.eigenvectors)
        .ok_or_else(singular)?;

    Ok((eigen.eigenvalues.iter().copied().collect(), vectors))
}

/// Pair the post transform with `a` column by column: `b_j = S22⁻¹ S21 a_j`.
/// Since `aᵗ S11 a = 1`, the projection has variance `λ_j`; columns of
/// uncorrelated pairs project to zero and keep `fallback`'s vector.
fn paired_columns(
    a: &DMatrix<f64>,
    fallback: &DMatrix<f64>,
    s21: &DMatrix<f64>,
    s22: &DMatrix<f64>,
    chol22: &Cholesky<f64, Dyn>,
) -> DMatrix<f64> {
    let projected = chol22.solve(&(s21 * a));
    let mut b = fallback.clone();
    for j in 0..a.ncols() {
        let column = projected.column(j);
        let variance = column.dot(&(s22 * &column));
        if variance.is_finite() && variance > MIN_PAIRED_VARIANCE {
            b.set_column(j, &column);
        }
    }
    b
}

/// Indices that sort `values` ascending; ties keep their input order
fn ascending_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
    order
}

fn sorted_columns(m: &DMatrix<f64>, order: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), order.len(), |i, j| m[(i, order[j])])
}

/// Scale each column `x` so that `xᵗ s x = 1`
fn unit_variance(mut x: DMatrix<f64>, s: &DMatrix<f64>, label: &str) -> Result<DMatrix<f64>> {
    let dispersion = x.transpose() * s * &x;
    for j in 0..x.ncols() {
        let var = dispersion[(j, j)];
        if !(var.is_finite() && var > 0.0) {
            return Err(Error::LinearAlgebra(format!(
                "canonical variate {} of transform {} has variance {}",
                j, label, var
            )));
        }
        x.column_mut(j).scale_mut(1.0 / var.sqrt());
    }
    Ok(x)
}

fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn to_array(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}
