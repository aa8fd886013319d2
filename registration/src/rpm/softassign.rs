//! Sinkhorn-style alternating row/column normalization.

use nalgebra::DMatrix;
use rayon::prelude::*;

/// Drive the non-slack block of an assignment matrix toward a doubly
/// substochastic matrix by alternating row and column normalization.
///
/// `matrix` is (K+1) x (N+1) with the outlier slack line in the last row and
/// column. Slack entries take part in the sums and are divided when a
/// crossing line is normalized, but the slack lines themselves are never
/// normalized; mass pushed into them is how outlierness is expressed. Rows
/// and columns flagged in `pinned_rows` / `pinned_cols` are left untouched
/// so forced assignments keep their exact value. Lines whose mass falls
/// below `epsilon` are skipped as already empty.
///
/// Runs a fixed number of sweeps; no convergence test.
pub fn soft_assign(
    matrix: &mut DMatrix<f64>,
    sweeps: usize,
    epsilon: f64,
    pinned_rows: &[bool],
    pinned_cols: &[bool],
) {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    if rows < 2 || cols < 2 {
        return;
    }

    let pinned_row = |r: usize| pinned_rows.get(r).copied().unwrap_or(false);
    let pinned_col = |c: usize| pinned_cols.get(c).copied().unwrap_or(false);

    for _ in 0..sweeps {
        // Row pass. Rows normalize independently, so the sums are gathered
        // column-major and the divisions fan out over disjoint columns.
        let mut row_sums = vec![0.0f64; rows - 1];
        for c in 0..cols {
            let col = matrix.column(c);
            for (r, sum) in row_sums.iter_mut().enumerate() {
                *sum += col[r];
            }
        }
        matrix
            .as_mut_slice()
            .par_chunks_mut(rows)
            .for_each(|col| {
                for (r, sum) in row_sums.iter().enumerate() {
                    if !pinned_row(r) && *sum >= epsilon {
                        col[r] /= sum;
                    }
                }
            });

        // Column pass: every non-slack column normalizes on its own.
        let body_len = rows * (cols - 1);
        let (body, _slack) = matrix.as_mut_slice().split_at_mut(body_len);
        body.par_chunks_mut(rows).enumerate().for_each(|(c, col)| {
            if pinned_col(c) {
                return;
            }
            let sum: f64 = col.iter().sum();
            if sum >= epsilon {
                for value in col.iter_mut() {
                    *value /= sum;
                }
            }
        });
    }
}
