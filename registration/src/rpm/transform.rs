//! Least-squares fit of the spline parameters in the null-space basis.

use nalgebra::DMatrix;

use rpm_core::{Error, Result};

use super::config::RpmConfig;
use super::thin_plate::ThinPlateSpline;

/// Map the target set through a correspondence: each output row is the
/// M-weighted combination of target rows. Under `both_side_outlier` the rows
/// are divided by their correspondence mass (floored at the mass epsilon) so
/// source outliers stop dragging the fit.
pub fn apply_correspondence(
    target: &DMatrix<f64>,
    correspondence: &DMatrix<f64>,
    config: &RpmConfig,
) -> DMatrix<f64> {
    let mut mapped = correspondence * target;
    if config.both_side_outlier {
        for r in 0..correspondence.nrows() {
            let mass = correspondence.row(r).sum().max(config.mass_epsilon);
            mapped.row_mut(r).apply(|v| *v /= mass);
        }
    }
    mapped
}

/// Solve the bending-energy-regularized least squares for the non-affine
/// part w and the affine part d, updating `params` in place.
///
/// The non-affine solve runs in the null-space basis: with w = Q₂·γ the side
/// condition Xᵀ·w = 0 holds by construction, and
/// L = Q₂ᵀ·Φ·Q₂ + (K·λ)·I is turned into the normal equations (LᵀL)·γ = LᵀB,
/// positive definite for λ > 0. The affine solve uses the R factor of the
/// reference set, optionally ridged toward the identity with
/// λ_d = 0.01·K·λ.
pub fn estimate_transform(
    target: &DMatrix<f64>,
    correspondence: &DMatrix<f64>,
    lambda: f64,
    config: &RpmConfig,
    params: &mut ThinPlateSpline,
) -> Result<()> {
    let k = params.reference().nrows();
    let dim = params.reference().ncols();
    if correspondence.nrows() != k || correspondence.ncols() != target.nrows() {
        return Err(Error::InvalidInput(format!(
            "correspondence is {}x{}, expected {}x{}",
            correspondence.nrows(),
            correspondence.ncols(),
            k,
            target.nrows()
        )));
    }

    let mapped = apply_correspondence(target, correspondence, config);

    let phi = params.phi();
    let q1 = params.q1();
    let q2 = params.q2();
    let r1 = params.r1();

    let l = q2.transpose() * phi * q2
        + DMatrix::<f64>::identity(k - dim, k - dim) * (k as f64 * lambda);
    let b = q2.transpose() * &mapped;
    let gamma = solve_normal_equations(&l, &b, "non-affine")?;
    let w = q2 * gamma;

    let residual = q1.transpose() * (&mapped - phi * &w);
    let d = if config.affine_regularization {
        let lambda_d = 0.01 * k as f64 * lambda;
        let ridge = DMatrix::<f64>::identity(dim, dim) * lambda_d;
        let mut l2 = DMatrix::<f64>::zeros(2 * dim, dim);
        l2.view_mut((0, 0), (dim, dim)).copy_from(r1);
        l2.view_mut((dim, 0), (dim, dim)).copy_from(&ridge);
        let mut b2 = DMatrix::<f64>::zeros(2 * dim, dim);
        b2.view_mut((0, 0), (dim, dim)).copy_from(&residual);
        b2.view_mut((dim, 0), (dim, dim)).copy_from(&ridge);
        solve_normal_equations(&l2, &b2, "affine")?
    } else {
        solve_normal_equations(r1, &residual, "affine")?
    };

    params.w = w;
    params.d = d;
    Ok(())
}

/// Solve (LᵀL)·X = Lᵀ·B through a Cholesky factorization of the normal
/// equations.
fn solve_normal_equations(
    l: &DMatrix<f64>,
    b: &DMatrix<f64>,
    what: &str,
) -> Result<DMatrix<f64>> {
    let lt_l = l.transpose() * l;
    let lt_b = l.transpose() * b;
    let factor = lt_l.cholesky().ok_or_else(|| {
        Error::NumericInstability(format!("{what} normal equations are not positive definite"))
    })?;
    Ok(factor.solve(&lt_b))
}
