//! N-Queens solution counting by bitmask backtracking.
//!
//! Occupied columns and both diagonal directions are bitsets; the free
//! squares of a row are `!(cols | d1 | d2) & mask`, visited by peeling off
//! the lowest set bit. The cancel signal is polled on every recursive step.

use super::{CancelSignal, ComputeError, ProgressSink};

/// Progress reported as soon as the search starts.
pub const PROGRESS_FLOOR: u8 = 10;

/// Progress never exceeds this until the worker finalizes the job.
pub const PROGRESS_CEILING: u8 = 95;

/// Share of the progress range driven by solutions found.
const PROGRESS_SPAN: f64 = 85.0;

/// Exact solution counts, indexed by board size (OEIS A000170).
const KNOWN_SOLUTIONS: [u64; 18] = [
    1, 1, 0, 0, 2, 10, 4, 40, 92, 352, 724, 2_680, 14_200, 73_712, 365_596, 2_279_184,
    14_772_512, 95_815_104,
];

/// Expected total used to scale progress.
///
/// Exact for tabulated sizes, otherwise the `(0.143 n)^n` asymptotic.
pub fn expected_solutions(n: u32) -> f64 {
    match KNOWN_SOLUTIONS.get(n as usize) {
        Some(&count) => count as f64,
        None => (0.143 * f64::from(n)).powi(n as i32),
    }
}

/// Progress percent after `found` solutions out of `expected`.
pub fn progress_percent(found: u64, expected: f64) -> u8 {
    if expected <= 0.0 {
        return PROGRESS_FLOOR;
    }
    let scaled = f64::from(PROGRESS_FLOOR) + PROGRESS_SPAN * found as f64 / expected;
    scaled.min(f64::from(PROGRESS_CEILING)) as u8
}

/// Count all placements of `n` non-attacking queens.
pub fn count_solutions(
    n: u32,
    progress: &mut dyn ProgressSink,
    cancel: &dyn CancelSignal,
) -> Result<u64, ComputeError> {
    if n == 0 || n > 31 {
        return Err(ComputeError::InvalidInput(format!(
            "board size must be between 1 and 31, got {n}"
        )));
    }

    let mut search = Search {
        mask: (1u32 << n) - 1,
        found: 0,
        expected: expected_solutions(n),
        last_percent: 0,
        progress,
        cancel,
    };
    search.emit_progress();
    search.place(0, 0, 0)?;
    Ok(search.found)
}

struct Search<'a> {
    mask: u32,
    found: u64,
    expected: f64,
    last_percent: u8,
    progress: &'a mut dyn ProgressSink,
    cancel: &'a dyn CancelSignal,
}

impl Search<'_> {
    fn place(&mut self, cols: u32, diag_left: u32, diag_right: u32) -> Result<(), ComputeError> {
        if self.cancel.is_cancelled() {
            return Err(ComputeError::Cancelled);
        }

        if cols == self.mask {
            self.found += 1;
            self.emit_progress();
            return Ok(());
        }

        let mut available = !(cols | diag_left | diag_right) & self.mask;
        while available != 0 {
            let bit = available & available.wrapping_neg();
            available ^= bit;
            self.place(
                cols | bit,
                ((diag_left | bit) << 1) & self.mask,
                (diag_right | bit) >> 1,
            )?;
        }
        Ok(())
    }

    /// Report only when the percent moves forward.
    fn emit_progress(&mut self) {
        let percent = progress_percent(self.found, self.expected);
        if percent > self.last_percent {
            self.last_percent = percent;
            self.progress.report(percent);
        }
    }
}
