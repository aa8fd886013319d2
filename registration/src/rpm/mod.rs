//! TPS-RPM: thin-plate spline robust point matching.
//!
//! Deterministic annealing drives two alternating sub-solvers: SoftAssign
//! correspondence estimation over a slack-augmented assignment matrix, and a
//! bending-energy-regularized least-squares fit of the thin-plate spline.
//! The temperature starts at the mean squared pairwise distance of the
//! normalized inputs and cools geometrically; the bending weight follows the
//! same schedule, so early iterations are near-affine and late iterations
//! sharpen both the correspondence and the warp.

pub mod config;
pub mod correspondence;
pub mod softassign;
pub mod thin_plate;
pub mod transform;

use std::time::Instant;

use nalgebra::{DMatrix, Matrix3};
use rayon::prelude::*;

use rpm_core::{homogenize, normalize_pair, point_set::DIM, Error, Result};

use self::config::RpmConfig;
use self::correspondence::estimate_correspondence;
use self::thin_plate::ThinPlateSpline;
use self::transform::estimate_transform;

/// Result of a TPS-RPM estimate.
///
/// Both the correspondence and the spline live in the unit-normalized frame;
/// `normalization` is the homogeneous transform that was applied to the
/// inputs, so callers invert it to map warped points back.
#[derive(Debug, Clone)]
pub struct RpmResult {
    /// Soft correspondence between source and target rows (K x N). Every
    /// row and column sums to at most 1; missing mass went to the outlier
    /// slack line.
    pub correspondence: DMatrix<f64>,
    /// Fitted spline parameters in the normalized frame.
    pub params: ThinPlateSpline,
    /// Transform that mapped both inputs into the unit square.
    pub normalization: Matrix3<f64>,
}

/// Geometric cooling schedule: yields T, r·T, r²·T, … while the value stays
/// at or above the floor.
#[derive(Debug, Clone)]
pub struct TemperatureSchedule {
    current: f64,
    floor: f64,
    ratio: f64,
}

impl TemperatureSchedule {
    pub fn new(start: f64, floor: f64, ratio: f64) -> Self {
        Self {
            current: start,
            floor,
            ratio,
        }
    }
}

impl Iterator for TemperatureSchedule {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.current < self.floor {
            return None;
        }
        let temperature = self.current;
        self.current *= self.ratio;
        Some(temperature)
    }
}

/// Register a source point set against a target point set.
///
/// Runs the full deterministic-annealing loop: joint unit-square
/// normalization, temperature schedule derivation, and per-temperature
/// alternation of correspondence and transform estimation. Point counts need
/// not match and neither set has to be a permutation of the other; unmatched
/// points shed their correspondence mass into the outlier slack line.
///
/// # Arguments
///
/// * `source` - Source points (K x 2), K >= 4.
/// * `target` - Target points (N x 2), N >= 4.
/// * `pinned` - (source, target) index pairs forced to correspond;
///   out-of-range pairs are ignored.
/// * `config` - Schedule and solver configuration.
///
/// # Returns
///
/// * `Ok(RpmResult)` - Correspondence, spline parameters and the
///   normalization transform.
/// * `Err(_)` - Invalid inputs or a sub-solver failure; no partial result
///   is produced.
pub fn estimate(
    source: &DMatrix<f64>,
    target: &DMatrix<f64>,
    pinned: &[(usize, usize)],
    config: &RpmConfig,
) -> Result<RpmResult> {
    let started = Instant::now();

    config.validate()?;
    validate_points(source, "source")?;
    validate_points(target, "target")?;

    let mut x = source.clone();
    let mut y = target.clone();
    let normalization = normalize_pair(&mut x, &mut y)?;

    let x = homogenize(&x)?;
    let y = homogenize(&y)?;

    let t_start = match config.t_start {
        Some(t) => t,
        None => mean_squared_distance(&x, &y),
    };
    if !t_start.is_finite() || t_start <= 0.0 {
        return Err(Error::InvalidInput(format!(
            "derived starting temperature {t_start} is not usable"
        )));
    }
    let t_end = t_start * config.t_end_ratio;
    let mut lambda = config.lambda_start.unwrap_or(t_start);

    log::debug!(
        "annealing schedule: T {t_start:.6} -> {t_end:.6} (ratio {}), lambda {lambda:.6}",
        config.annealing_ratio
    );

    let mut params = ThinPlateSpline::new(&x)?;
    let mut correspondence = DMatrix::<f64>::zeros(x.nrows(), y.nrows());

    let schedule = TemperatureSchedule::new(t_start, t_end, config.annealing_ratio);
    for (step, temperature) in schedule.enumerate() {
        for inner in 0..config.inner_iterations {
            correspondence = estimate_correspondence(&y, &params, pinned, temperature, config)?;
            estimate_transform(&y, &correspondence, lambda, config, &mut params)?;
            log::trace!("step {step} inner {inner}: T {temperature:.6} lambda {lambda:.6}");
        }
        log::debug!("annealing step {step}: T {temperature:.6}");
        lambda *= config.annealing_ratio;
    }

    log::debug!("estimate finished in {:.3?}", started.elapsed());

    Ok(RpmResult {
        correspondence,
        params,
        normalization,
    })
}

fn validate_points(points: &DMatrix<f64>, name: &str) -> Result<()> {
    if points.ncols() != DIM {
        return Err(Error::InvalidInput(format!(
            "{name} points must be Nx{DIM}, got {}x{}",
            points.nrows(),
            points.ncols()
        )));
    }
    if points.nrows() < DIM + 2 {
        return Err(Error::InvalidInput(format!(
            "{name} needs at least {} points to fit an affine map, got {}",
            DIM + 2,
            points.nrows()
        )));
    }
    if points.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(format!(
            "{name} contains non-finite coordinates"
        )));
    }
    Ok(())
}

/// Mean squared pairwise distance between the two sets, reduced over source
/// rows in parallel.
fn mean_squared_distance(x: &DMatrix<f64>, y: &DMatrix<f64>) -> f64 {
    let k = x.nrows();
    let n = y.nrows();
    let total: f64 = (0..k)
        .into_par_iter()
        .map(|a| {
            let (ax, ay) = (x[(a, 0)], x[(a, 1)]);
            let mut acc = 0.0;
            for b in 0..n {
                let dx = y[(b, 0)] - ax;
                let dy = y[(b, 1)] - ay;
                acc += dx * dx + dy * dy;
            }
            acc
        })
        .sum();
    total / (k as f64 * n as f64)
}

mod mod_test;
