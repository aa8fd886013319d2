//! Thin-plate spline warp parameters.

use nalgebra::{DMatrix, Vector2};
use rayon::prelude::*;

use rpm_core::{homogenize, point_set::DIM, Error, Result};

/// Distances at or below this are treated as coincident when evaluating the
/// radial kernel, where r² ln r tends to zero anyway.
const KERNEL_EPS: f64 = 1e-5;

/// Thin-plate radial basis in 2D: r² ln r.
#[inline]
fn kernel(dist: f64) -> f64 {
    if dist <= KERNEL_EPS {
        0.0
    } else {
        dist * dist * dist.ln()
    }
}

/// Parameters of a 2D thin-plate spline anchored at a reference point set.
///
/// The warp of a homogeneous point p̃ is f(p) = p̃·d + φ(p)·w, where d is the
/// affine part and w weights the radial kernel centered at each reference
/// point. The reference set, its kernel matrix and its QR factors are fixed
/// at construction; only d and w evolve during estimation.
///
/// Invariant: `q2` is an orthonormal basis of the null space of Xᵀ, so any
/// w of the form Q₂·γ satisfies the side condition Xᵀ·w = 0 that separates
/// the affine and non-affine parts.
#[derive(Debug, Clone)]
pub struct ThinPlateSpline {
    /// Reference source points, homogeneous (K x 3).
    x: DMatrix<f64>,
    /// Radial kernel matrix over the reference points (K x K).
    phi: DMatrix<f64>,
    /// Thin QR factors of the reference set (K x 3 and 3 x 3).
    q1: DMatrix<f64>,
    r: DMatrix<f64>,
    /// Orthonormal basis of the null space of Xᵀ (K x (K - 3)).
    q2: DMatrix<f64>,
    /// Affine part ((D+1) x (D+1)), initialized to the identity.
    pub d: DMatrix<f64>,
    /// Non-affine part (K x (D+1)), initialized to zero.
    pub w: DMatrix<f64>,
}

impl ThinPlateSpline {
    /// Build spline parameters anchored at a (K, 2) source set (a (K, 3)
    /// homogeneous set is also accepted).
    pub fn new(source: &DMatrix<f64>) -> Result<Self> {
        let x = homogenize(source)?;
        let k = x.nrows();
        let dim = DIM + 1;
        if k < dim + 1 {
            return Err(Error::InvalidInput(format!(
                "thin-plate spline needs at least {} reference points, got {k}",
                dim + 1
            )));
        }
        k.checked_mul(k).ok_or_else(|| {
            Error::ResourceExhaustion(format!("{k}x{k} kernel matrix does not fit in memory"))
        })?;

        let phi = kernel_matrix(&x);

        let qr = x.clone().qr();
        let q1 = qr.q();
        let r = qr.r();

        // nalgebra's QR is thin, so the null-space block of the full Q is
        // recovered from a column-pivoted QR of the complement projector.
        // Any orthonormal basis of null(Xᵀ) yields the same w: the solve and
        // the ridge on γ are invariant under a basis rotation.
        let projector = DMatrix::<f64>::identity(k, k) - &q1 * q1.transpose();
        let q2 = projector.col_piv_qr().q().columns(0, k - dim).into_owned();

        Ok(Self {
            x,
            phi,
            q1,
            r,
            q2,
            d: DMatrix::identity(dim, dim),
            w: DMatrix::zeros(k, dim),
        })
    }

    /// Warp the reference set by the current parameters.
    pub fn transform_all(&self, hnormalize: bool) -> DMatrix<f64> {
        let xt = &self.x * &self.d + &self.phi * &self.w;
        if hnormalize {
            hnormalized(&xt)
        } else {
            xt
        }
    }

    /// Warp an arbitrary (N, 2) point batch through the spline.
    pub fn transform_points(&self, points: &DMatrix<f64>, hnormalize: bool) -> Result<DMatrix<f64>> {
        let p = homogenize(points)?;
        let n = p.nrows();
        let k = self.x.nrows();
        if n == 0 {
            return Ok(DMatrix::zeros(0, if hnormalize { DIM } else { DIM + 1 }));
        }

        let mut phi_px = DMatrix::<f64>::zeros(n, k);
        phi_px
            .as_mut_slice()
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(x_i, col)| {
                let (cx, cy) = (self.x[(x_i, 0)], self.x[(x_i, 1)]);
                for (p_i, value) in col.iter_mut().enumerate() {
                    let dx = p[(p_i, 0)] - cx;
                    let dy = p[(p_i, 1)] - cy;
                    *value = kernel((dx * dx + dy * dy).sqrt());
                }
            });

        let pt = &p * &self.d + phi_px * &self.w;
        Ok(if hnormalize { hnormalized(&pt) } else { pt })
    }

    /// Warp a single 2D point, hnormalized.
    pub fn transform_point(&self, point: &Vector2<f64>) -> Vector2<f64> {
        let mut out = [0.0f64; 3];
        for (c, acc) in out.iter_mut().enumerate() {
            *acc = point.x * self.d[(0, c)] + point.y * self.d[(1, c)] + self.d[(2, c)];
        }
        for x_i in 0..self.x.nrows() {
            let dx = point.x - self.x[(x_i, 0)];
            let dy = point.y - self.x[(x_i, 1)];
            let g = kernel((dx * dx + dy * dy).sqrt());
            if g != 0.0 {
                out[0] += g * self.w[(x_i, 0)];
                out[1] += g * self.w[(x_i, 1)];
                out[2] += g * self.w[(x_i, 2)];
            }
        }
        Vector2::new(out[0] / out[2], out[1] / out[2])
    }

    /// Reference source points, homogeneous (K x 3).
    pub fn reference(&self) -> &DMatrix<f64> {
        &self.x
    }

    pub fn phi(&self) -> &DMatrix<f64> {
        &self.phi
    }

    pub fn q1(&self) -> &DMatrix<f64> {
        &self.q1
    }

    pub fn q2(&self) -> &DMatrix<f64> {
        &self.q2
    }

    pub fn r1(&self) -> &DMatrix<f64> {
        &self.r
    }
}

/// Kernel matrix over the reference set: Φ[b, a] = ‖X_b − X_a‖² ln ‖X_b − X_a‖,
/// zero on the diagonal. Columns are filled in parallel.
fn kernel_matrix(x: &DMatrix<f64>) -> DMatrix<f64> {
    let k = x.nrows();
    let mut phi = DMatrix::<f64>::zeros(k, k);
    phi.as_mut_slice()
        .par_chunks_mut(k)
        .enumerate()
        .for_each(|(a, col)| {
            let (ax, ay) = (x[(a, 0)], x[(a, 1)]);
            for (b, value) in col.iter_mut().enumerate() {
                if b == a {
                    continue;
                }
                let dx = x[(b, 0)] - ax;
                let dy = x[(b, 1)] - ay;
                *value = kernel((dx * dx + dy * dy).sqrt());
            }
        });
    phi
}

/// Divide each row of a homogeneous (N, 3) batch by its third coordinate.
fn hnormalized(points: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = DMatrix::<f64>::zeros(points.nrows(), DIM);
    for i in 0..points.nrows() {
        let h = points[(i, DIM)];
        out[(i, 0)] = points[(i, 0)] / h;
        out[(i, 1)] = points[(i, 1)] / h;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square_corners() -> DMatrix<f64> {
        DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0])
    }

    fn scattered_points() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            6,
            2,
            &[0.1, 0.2, 0.9, 0.1, 0.4, 0.8, 0.7, 0.6, 0.2, 0.9, 0.55, 0.35],
        )
    }

    #[test]
    fn test_kernel_matrix_symmetric_zero_diagonal() {
        let params = ThinPlateSpline::new(&scattered_points()).unwrap();
        let phi = params.phi();
        for a in 0..phi.nrows() {
            assert_eq!(phi[(a, a)], 0.0);
            for b in 0..phi.nrows() {
                assert_eq!(phi[(a, b)], phi[(b, a)]);
            }
        }
    }

    #[test]
    fn test_null_space_basis_annihilates_reference() {
        let params = ThinPlateSpline::new(&scattered_points()).unwrap();
        let residual = params.q2().transpose() * params.reference();
        assert!(residual.amax() < 1e-10);

        // Orthonormal columns.
        let gram = params.q2().transpose() * params.q2();
        let eye = DMatrix::<f64>::identity(gram.nrows(), gram.ncols());
        assert!((gram - eye).amax() < 1e-10);
    }

    #[test]
    fn test_identity_parameters_reproduce_reference() {
        let source = square_corners();
        let params = ThinPlateSpline::new(&source).unwrap();
        let warped = params.transform_all(true);
        assert!((warped - source).amax() < 1e-12);
    }

    #[test]
    fn test_transform_points_matches_transform_all() {
        let source = scattered_points();
        let mut params = ThinPlateSpline::new(&source).unwrap();
        // Perturb the parameters so the comparison is not trivially identity.
        params.d[(2, 0)] = 0.05;
        params.d[(2, 1)] = -0.03;
        params.w[(0, 0)] = 0.02;
        params.w[(3, 1)] = -0.04;

        let all = params.transform_all(true);
        let batch = params.transform_points(&source, true).unwrap();
        assert!((all - batch).amax() < 1e-12);
    }

    #[test]
    fn test_transform_point_matches_batch() {
        let source = scattered_points();
        let mut params = ThinPlateSpline::new(&source).unwrap();
        params.d[(2, 0)] = 0.1;
        params.w[(1, 1)] = 0.03;

        let probe = DMatrix::from_row_slice(1, 2, &[0.33, 0.66]);
        let batch = params.transform_points(&probe, true).unwrap();
        let single = params.transform_point(&Vector2::new(0.33, 0.66));
        assert_abs_diff_eq!(single.x, batch[(0, 0)], epsilon = 1e-12);
        assert_abs_diff_eq!(single.y, batch[(0, 1)], epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_too_few_points() {
        let tiny = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        assert!(ThinPlateSpline::new(&tiny).is_err());
    }
}
