//! Job input shapes and their submission-time validation.
//!
//! A job's `kind` selects the computation strategy and `input` carries its
//! parameters as JSON. Both are fixed at creation. [`JobInput`] is the typed
//! view over the pair; the store keeps them in separate columns.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::CoreError;

/// `kind` column value for a linear-system solve.
pub const KIND_LINEAR_SYSTEM: &str = "linear_system";

/// `kind` column value for an N-Queens solution count.
pub const KIND_N_QUEENS: &str = "n_queens";

/// Largest accepted N-Queens board. Counting 18+ takes hours.
pub const MAX_BOARD_SIZE: u32 = 17;

/// Largest accepted coefficient matrix dimension.
pub const MAX_LINEAR_SYSTEM_SIZE: usize = 500;

// ---------------------------------------------------------------------------
// Input shapes
// ---------------------------------------------------------------------------

/// Solve `A x = b` for a square `A`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_linear_system"))]
pub struct LinearSystemInput {
    /// Row-major `n x n` coefficient matrix.
    #[validate(length(min = 1, max = 500))]
    pub matrix: Vec<Vec<f64>>,
    /// Right-hand side of length `n`.
    #[validate(length(min = 1, max = 500))]
    pub vector: Vec<f64>,
}

/// Count every placement of `n` non-attacking queens on an `n x n` board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NQueensInput {
    #[validate(range(min = 1, max = 17))]
    pub n: u32,
}

/// Typed job input; serializes as `{"kind": ..., "input": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "input")]
pub enum JobInput {
    #[serde(rename = "linear_system")]
    LinearSystem(LinearSystemInput),
    #[serde(rename = "n_queens")]
    NQueens(NQueensInput),
}

impl JobInput {
    /// Rebuild the typed input from the stored `kind` and `input` columns.
    pub fn from_parts(kind: &str, input: &serde_json::Value) -> Result<Self, CoreError> {
        let malformed =
            |e: serde_json::Error| CoreError::Validation(format!("Malformed {kind} input: {e}"));
        match kind {
            KIND_LINEAR_SYSTEM => serde_json::from_value(input.clone())
                .map(Self::LinearSystem)
                .map_err(malformed),
            KIND_N_QUEENS => serde_json::from_value(input.clone())
                .map(Self::NQueens)
                .map_err(malformed),
            other => Err(CoreError::Validation(format!("Unknown job kind '{other}'"))),
        }
    }

    /// The value stored in the `kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LinearSystem(_) => KIND_LINEAR_SYSTEM,
            Self::NQueens(_) => KIND_N_QUEENS,
        }
    }

    /// The value stored in the `input` column.
    pub fn parameters(&self) -> serde_json::Value {
        match self {
            Self::LinearSystem(system) => serde_json::json!({
                "matrix": system.matrix,
                "vector": system.vector,
            }),
            Self::NQueens(board) => serde_json::json!({ "n": board.n }),
        }
    }

    /// Check size bounds and dimensional consistency.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::LinearSystem(system) => system.validate()?,
            Self::NQueens(board) => board.validate()?,
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Struct-level rules the field attributes cannot express:
/// - the matrix is square,
/// - the vector length matches,
/// - every coefficient is finite.
fn validate_linear_system(input: &LinearSystemInput) -> Result<(), ValidationError> {
    let n = input.matrix.len();

    if let Some((row, len)) = input
        .matrix
        .iter()
        .enumerate()
        .map(|(i, r)| (i, r.len()))
        .find(|&(_, len)| len != n)
    {
        return Err(dimension_error(
            "not_square",
            format!("Matrix row {row} has {len} entries, expected {n}"),
        ));
    }

    if input.vector.len() != n {
        return Err(dimension_error(
            "length_mismatch",
            format!(
                "Vector has {} entries but the matrix is {n}x{n}",
                input.vector.len()
            ),
        ));
    }

    let all_finite = input
        .matrix
        .iter()
        .flatten()
        .chain(input.vector.iter())
        .all(|v| v.is_finite());
    if !all_finite {
        return Err(dimension_error(
            "not_finite",
            "Matrix and vector entries must be finite numbers".to_string(),
        ));
    }

    Ok(())
}

fn dimension_error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::from(message));
    err
}
