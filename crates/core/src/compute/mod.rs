//! Interruptible computation strategies.
//!
//! Each strategy is a pure function of its input, a [`ProgressSink`] and a
//! [`CancelSignal`]. Strategies poll the signal at their own checkpoints and
//! return [`ComputeError::Cancelled`] once it fires; nothing preempts them.

pub mod linear;
pub mod nqueens;

use serde::Serialize;

use crate::job_input::{JobInput, LinearSystemInput, NQueensInput};

/// Receives progress percentages (0..=100) as a computation advances.
pub trait ProgressSink {
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Polled by a running computation to learn whether it should stop.
pub trait CancelSignal {
    fn is_cancelled(&self) -> bool;
}

impl<F: Fn() -> bool> CancelSignal for F {
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// Why a computation did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComputeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Matrix is singular or near-singular; the system has no unique solution")]
    SingularMatrix,

    #[error("Computation cancelled")]
    Cancelled,

    #[error("Failed to encode result: {0}")]
    Encoding(String),

    /// The strategy panicked; the payload is the join error text.
    #[error("Computation panicked: {0}")]
    Panicked(String),
}

/// A pluggable computation run by the worker.
pub trait Strategy {
    type Output: Serialize;

    fn execute(
        &self,
        progress: &mut dyn ProgressSink,
        cancel: &dyn CancelSignal,
    ) -> Result<Self::Output, ComputeError>;
}

impl Strategy for LinearSystemInput {
    type Output = Vec<f64>;

    fn execute(
        &self,
        progress: &mut dyn ProgressSink,
        cancel: &dyn CancelSignal,
    ) -> Result<Vec<f64>, ComputeError> {
        linear::solve(self, progress, cancel)
    }
}

impl Strategy for NQueensInput {
    type Output = u64;

    fn execute(
        &self,
        progress: &mut dyn ProgressSink,
        cancel: &dyn CancelSignal,
    ) -> Result<u64, ComputeError> {
        nqueens::count_solutions(self.n, progress, cancel)
    }
}

impl JobInput {
    /// Run the strategy selected by this input and encode its result as JSON.
    pub fn execute(
        &self,
        progress: &mut dyn ProgressSink,
        cancel: &dyn CancelSignal,
    ) -> Result<serde_json::Value, ComputeError> {
        match self {
            Self::LinearSystem(system) => encode(system.execute(progress, cancel)?),
            Self::NQueens(board) => encode(board.execute(progress, cancel)?),
        }
    }
}

fn encode<T: Serialize>(output: T) -> Result<serde_json::Value, ComputeError> {
    serde_json::to_value(output).map_err(|e| ComputeError::Encoding(e.to_string()))
}
