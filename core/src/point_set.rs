//! 2D point sets and homogeneous-coordinate utilities.
//!
//! A point set is a dense `DMatrix<f64>` with one point per row: (count, 2)
//! in Cartesian form, (count, 3) in homogeneous form with the third column
//! identically 1 for finite points.

use nalgebra::DMatrix;

use crate::{Error, Result};

/// Spatial dimension of the point sets handled by this workspace.
pub const DIM: usize = 2;

/// Append a unit third coordinate so affine maps become plain matrix
/// products. Homogeneous inputs pass through unchanged.
pub fn homogenize(points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    match points.ncols() {
        n if n == DIM + 1 => Ok(points.clone()),
        n if n == DIM => {
            let mut out = DMatrix::<f64>::from_element(points.nrows(), DIM + 1, 1.0);
            out.view_mut((0, 0), (points.nrows(), DIM)).copy_from(points);
            Ok(out)
        }
        n => Err(Error::InvalidInput(format!(
            "cannot homogenize a point set with {n} columns"
        ))),
    }
}

/// Divide each row by its third coordinate and strip it. Cartesian inputs
/// pass through unchanged.
pub fn hnormalize(points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    match points.ncols() {
        n if n == DIM => Ok(points.clone()),
        n if n == DIM + 1 => {
            let mut out = DMatrix::<f64>::zeros(points.nrows(), DIM);
            for i in 0..points.nrows() {
                let h = points[(i, DIM)];
                out[(i, 0)] = points[(i, 0)] / h;
                out[(i, 1)] = points[(i, 1)] / h;
            }
            Ok(out)
        }
        n => Err(Error::InvalidInput(format!(
            "cannot hnormalize a point set with {n} columns"
        ))),
    }
}

/// Thin a point set down to roughly `target` rows by keeping every
/// ceil(count / target)-th point. Sets already small enough are returned
/// unchanged.
pub fn subsample(points: &DMatrix<f64>, target: usize) -> DMatrix<f64> {
    if target == 0 || points.nrows() <= target {
        return points.clone();
    }
    let interval = points.nrows().div_ceil(target);
    let rows: Vec<usize> = (0..points.nrows()).step_by(interval).collect();
    points.select_rows(rows.iter())
}

/// Drop the inclusive row range `start..=end`. Out-of-range requests leave
/// the set unchanged.
pub fn remove_rows(points: &DMatrix<f64>, start: usize, end: usize) -> DMatrix<f64> {
    if start > end || end >= points.nrows() {
        return points.clone();
    }
    points.clone().remove_rows(start, end - start + 1)
}
