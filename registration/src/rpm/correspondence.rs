//! Correspondence estimation at a given annealing temperature.

use nalgebra::DMatrix;
use rayon::prelude::*;

use rpm_core::{Error, Result};

use super::config::RpmConfig;
use super::softassign::soft_assign;
use super::thin_plate::ThinPlateSpline;

/// Estimate the soft correspondence between the warped source and the
/// target at temperature `temperature`.
///
/// Builds the (K+1) x (N+1) affinity matrix with Gibbs weights
/// exp((α − ‖y − f(x)‖²) / T) over the non-slack block, applies pinned
/// pairs, seeds the slack line, runs SoftAssign and returns the K x N trim.
/// Pinned pairs override the Gibbs weights: their row and column are zeroed,
/// the entry is set to 1 and both lines are excluded from normalization so
/// the forced assignment survives every sweep. Out-of-range pins are
/// silently skipped.
///
/// # Arguments
///
/// * `target` - Homogeneous target set (N x 3).
/// * `params` - Current spline; the warped source is derived from it.
/// * `pinned` - Caller-forced (source, target) index pairs.
/// * `temperature` - Current annealing temperature.
/// * `config` - Solver configuration (α, sweep count, mass floor).
pub fn estimate_correspondence(
    target: &DMatrix<f64>,
    params: &ThinPlateSpline,
    pinned: &[(usize, usize)],
    temperature: f64,
    config: &RpmConfig,
) -> Result<DMatrix<f64>> {
    let k = params.reference().nrows();
    let n = target.nrows();
    let beta = 1.0 / temperature;
    let alpha = config.alpha;

    let cells = (k + 1).checked_mul(n + 1).ok_or_else(|| {
        Error::ResourceExhaustion(format!("{}x{} assignment matrix", k + 1, n + 1))
    })?;

    let warped = params.transform_all(false);

    // Row-major assembly: each task owns one source row and applies its own
    // overflow shift before exponentiation. The shift cancels in the first
    // row normalization because the row's slack entry is co-scaled, so the
    // converged matrix matches the unshifted arithmetic.
    let row_slack = 1.0 / (n as f64 + 1.0);
    let col_slack = 1.0 / (k as f64 + 1.0);
    let mut buffer = vec![0.0f64; cells];
    buffer
        .par_chunks_mut(n + 1)
        .enumerate()
        .for_each(|(r, row)| {
            if r == k {
                // Slack row; the corner takes the slack-column constant.
                for value in row[..n].iter_mut() {
                    *value = row_slack;
                }
                row[n] = col_slack;
                return;
            }
            let (wx, wy, wh) = (warped[(r, 0)], warped[(r, 1)], warped[(r, 2)]);
            let mut max_exponent = f64::NEG_INFINITY;
            for (c, value) in row[..n].iter_mut().enumerate() {
                let dx = target[(c, 0)] - wx;
                let dy = target[(c, 1)] - wy;
                let dh = target[(c, 2)] - wh;
                let exponent = beta * (alpha - (dx * dx + dy * dy + dh * dh));
                *value = exponent;
                max_exponent = max_exponent.max(exponent);
            }
            let shift = max_exponent.max(0.0);
            for value in row[..n].iter_mut() {
                *value = (*value - shift).exp();
            }
            row[n] = col_slack * (-shift).exp();
        });

    let mut assignment = DMatrix::from_row_slice(k + 1, n + 1, &buffer);

    let mut pinned_rows = vec![false; k + 1];
    let mut pinned_cols = vec![false; n + 1];
    for &(source_index, target_index) in pinned {
        if source_index >= k || target_index >= n {
            continue;
        }
        for c in 0..n {
            assignment[(source_index, c)] = 0.0;
        }
        for r in 0..k {
            assignment[(r, target_index)] = 0.0;
        }
        assignment[(source_index, target_index)] = 1.0;
        pinned_rows[source_index] = true;
        pinned_cols[target_index] = true;
    }

    soft_assign(
        &mut assignment,
        config.softassign_iterations,
        config.mass_epsilon,
        &pinned_rows,
        &pinned_cols,
    );

    let correspondence = assignment.view((0, 0), (k, n)).into_owned();
    if correspondence.iter().any(|v| !v.is_finite()) {
        return Err(Error::NumericInstability(
            "correspondence matrix contains non-finite entries".to_string(),
        ));
    }
    Ok(correspondence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corners() -> DMatrix<f64> {
        DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0])
    }

    fn homogeneous_corners() -> DMatrix<f64> {
        rpm_core::homogenize(&corners()).unwrap()
    }

    #[test]
    fn test_identical_sets_sharpen_to_diagonal() {
        let params = ThinPlateSpline::new(&corners()).unwrap();
        let y = homogeneous_corners();
        let config = RpmConfig::default();

        let m = estimate_correspondence(&y, &params, &[], 1e-3, &config).unwrap();
        assert_eq!(m.shape(), (4, 4));
        for kk in 0..4 {
            assert!(m[(kk, kk)] > 0.9, "diagonal entry {} was {}", kk, m[(kk, kk)]);
        }
    }

    #[test]
    fn test_rows_and_columns_substochastic() {
        let params = ThinPlateSpline::new(&corners()).unwrap();
        let y = homogeneous_corners();
        let config = RpmConfig::default();

        let m = estimate_correspondence(&y, &params, &[], 0.5, &config).unwrap();
        for r in 0..4 {
            assert!(m.row(r).sum() <= 1.0 + 1e-6);
        }
        for c in 0..4 {
            assert!(m.column(c).sum() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn test_pinned_pair_is_exact() {
        let params = ThinPlateSpline::new(&corners()).unwrap();
        let y = homogeneous_corners();
        let config = RpmConfig::default();

        // Pin against the geometric evidence to prove the override.
        let m = estimate_correspondence(&y, &params, &[(0, 3)], 0.05, &config).unwrap();
        assert_eq!(m[(0, 3)], 1.0);
        for c in 0..3 {
            assert_eq!(m[(0, c)], 0.0);
        }
        for r in 1..4 {
            assert_eq!(m[(r, 3)], 0.0);
        }
    }

    #[test]
    fn test_out_of_range_pins_are_ignored() {
        let params = ThinPlateSpline::new(&corners()).unwrap();
        let y = homogeneous_corners();
        let config = RpmConfig::default();

        let pinned = estimate_correspondence(&y, &params, &[(9, 0), (0, 9)], 1.0, &config).unwrap();
        let free = estimate_correspondence(&y, &params, &[], 1.0, &config).unwrap();
        assert!((pinned - free).amax() < 1e-15);
    }

    #[test]
    fn test_extreme_temperatures_stay_finite() {
        let params = ThinPlateSpline::new(&corners()).unwrap();
        let y = homogeneous_corners();
        let config = RpmConfig::default();

        // Unshifted arithmetic would overflow exp(alpha / T) here.
        for t in [1e-6, 1e-9] {
            let m = estimate_correspondence(&y, &params, &[], t, &config).unwrap();
            assert!(m.iter().all(|v| v.is_finite()));
            for kk in 0..4 {
                assert!(m[(kk, kk)] > 0.9);
            }
        }
    }

    #[test]
    fn test_distant_sets_leak_mass_to_slack() {
        let params = ThinPlateSpline::new(&corners()).unwrap();
        let far = DMatrix::from_row_slice(4, 2, &[5.0, 5.0, 6.0, 5.0, 5.0, 6.0, 6.0, 6.0]);
        let y = rpm_core::homogenize(&far).unwrap();
        let config = RpmConfig::default();

        let m = estimate_correspondence(&y, &params, &[], 0.05, &config).unwrap();
        for r in 0..4 {
            assert!(
                m.row(r).sum() < 0.1,
                "row {} kept mass {}",
                r,
                m.row(r).sum()
            );
        }
    }
}
