//! Dense linear-system solve via LU decomposition with partial pivoting.
//!
//! The solve is a single numeric step, so progress is reported at fixed
//! checkpoints rather than continuously.

use super::{CancelSignal, ComputeError, ProgressSink};
use crate::job_input::LinearSystemInput;

/// Progress once the input has been checked and copied.
pub const PROGRESS_INPUT_PARSED: u8 = 5;

/// Progress once the solution vector has been computed.
pub const PROGRESS_SOLVED: u8 = 50;

/// A pivot smaller than this fraction of the largest coefficient is treated
/// as zero.
const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Solve `matrix * x = vector` for `x`.
pub fn solve(
    input: &LinearSystemInput,
    progress: &mut dyn ProgressSink,
    cancel: &dyn CancelSignal,
) -> Result<Vec<f64>, ComputeError> {
    if cancel.is_cancelled() {
        return Err(ComputeError::Cancelled);
    }

    let n = check_shape(input)?;
    let mut lu: Vec<Vec<f64>> = input.matrix.clone();
    progress.report(PROGRESS_INPUT_PARSED);

    let scale = lu
        .iter()
        .flatten()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return Err(ComputeError::SingularMatrix);
    }
    let tolerance = SINGULARITY_TOLERANCE * scale;

    // Row permutation applied during elimination.
    let mut perm: Vec<usize> = (0..n).collect();

    for col in 0..n {
        if cancel.is_cancelled() {
            return Err(ComputeError::Cancelled);
        }

        let pivot_row = (col..n)
            .max_by(|&a, &b| lu[a][col].abs().total_cmp(&lu[b][col].abs()))
            .unwrap_or(col);
        if lu[pivot_row][col].abs() < tolerance {
            return Err(ComputeError::SingularMatrix);
        }
        lu.swap(col, pivot_row);
        perm.swap(col, pivot_row);

        let pivot = lu[col][col];
        for row in (col + 1)..n {
            let factor = lu[row][col] / pivot;
            lu[row][col] = factor;
            if factor == 0.0 {
                continue;
            }
            for k in (col + 1)..n {
                let upper = lu[col][k];
                lu[row][k] -= factor * upper;
            }
        }
    }

    // Forward substitution: L y = P b (L has an implicit unit diagonal).
    let mut x: Vec<f64> = perm.iter().map(|&p| input.vector[p]).collect();
    for row in 0..n {
        let sum: f64 = (0..row).map(|k| lu[row][k] * x[k]).sum();
        x[row] -= sum;
    }

    // Back substitution: U x = y.
    for row in (0..n).rev() {
        let sum: f64 = ((row + 1)..n).map(|k| lu[row][k] * x[k]).sum();
        x[row] = (x[row] - sum) / lu[row][row];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(ComputeError::SingularMatrix);
    }

    progress.report(PROGRESS_SOLVED);
    Ok(x)
}

/// Return `n` for a well-formed `n x n` system.
fn check_shape(input: &LinearSystemInput) -> Result<usize, ComputeError> {
    let n = input.matrix.len();
    if n == 0 {
        return Err(ComputeError::InvalidInput("matrix is empty".to_string()));
    }
    if let Some(i) = input.matrix.iter().position(|row| row.len() != n) {
        return Err(ComputeError::InvalidInput(format!(
            "matrix row {i} has {} entries, expected {n}",
            input.matrix[i].len()
        )));
    }
    if input.vector.len() != n {
        return Err(ComputeError::InvalidInput(format!(
            "vector has {} entries, expected {n}",
            input.vector.len()
        )));
    }
    if input
        .matrix
        .iter()
        .flatten()
        .chain(input.vector.iter())
        .any(|v| !v.is_finite())
    {
        return Err(ComputeError::InvalidInput(
            "matrix and vector entries must be finite".to_string(),
        ));
    }
    Ok(n)
}
