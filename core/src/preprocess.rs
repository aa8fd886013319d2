//! Joint normalization of a source/target pair into the unit square.

use nalgebra::{DMatrix, Matrix3, Vector2, Vector3};

use crate::{point_set::DIM, Error, Result};

/// Translate and uniformly scale two point sets so their combined bounding
/// box fits inside the unit square.
///
/// Both sets are transformed in place by the same map T = scale(1/L) ∘
/// translate(-min), where L is the larger extent of the joint bounding box.
/// The 3x3 homogeneous matrix T is returned so callers can invert it to map
/// results back into the original frame.
pub fn normalize_pair(x: &mut DMatrix<f64>, y: &mut DMatrix<f64>) -> Result<Matrix3<f64>> {
    for (points, name) in [(&*x, "source"), (&*y, "target")] {
        if points.ncols() != DIM {
            return Err(Error::InvalidInput(format!(
                "{name} points must have {DIM} columns, got {}",
                points.ncols()
            )));
        }
        if points.nrows() == 0 {
            return Err(Error::InvalidInput(format!("{name} point set is empty")));
        }
    }

    let min_x = x.column(0).min().min(y.column(0).min());
    let max_x = x.column(0).max().max(y.column(0).max());
    let min_y = x.column(1).min().min(y.column(1).min());
    let max_y = x.column(1).max().max(y.column(1).max());

    let max_len = (max_x - min_x).max(max_y - min_y);
    if !max_len.is_finite() || max_len <= 0.0 {
        return Err(Error::InvalidInput(format!(
            "joint bounding box extent {max_len} cannot be normalized"
        )));
    }

    let translate = Matrix3::new(1.0, 0.0, -min_x, 0.0, 1.0, -min_y, 0.0, 0.0, 1.0);
    let inv_len = 1.0 / max_len;
    let scale = Matrix3::new(inv_len, 0.0, 0.0, 0.0, inv_len, 0.0, 0.0, 0.0, 1.0);
    let transform = scale * translate;

    apply_transform(x, &transform)?;
    apply_transform(y, &transform)?;

    Ok(transform)
}

/// Apply a 3x3 homogeneous transform to a (count, 2) point set in place.
pub fn apply_transform(points: &mut DMatrix<f64>, transform: &Matrix3<f64>) -> Result<()> {
    if points.ncols() != DIM {
        return Err(Error::InvalidInput(format!(
            "transform expects {DIM}-column points, got {}",
            points.ncols()
        )));
    }
    for i in 0..points.nrows() {
        let p = transform * Vector3::new(points[(i, 0)], points[(i, 1)], 1.0);
        points[(i, 0)] = p.x / p.z;
        points[(i, 1)] = p.y / p.z;
    }
    Ok(())
}

/// Single-point form of [`apply_transform`].
pub fn apply_transform_point(point: &Vector2<f64>, transform: &Matrix3<f64>) -> Vector2<f64> {
    let p = transform * Vector3::new(point.x, point.y, 1.0);
    Vector2::new(p.x / p.z, p.y / p.z)
}
