//! Domain logic for the solver job queue.
//!
//! Pure types and functions shared by the store and the worker: job input
//! shapes and their validation, the interruptible computation strategies,
//! submission limits, and queue wait estimation. No I/O lives here.

pub mod compute;
pub mod error;
pub mod job_input;
pub mod queue_estimate;
pub mod submission;
pub mod types;
