//! Solver worker library.
//!
//! Exposes the job runner loop, the per-job lifecycle processor, and the
//! job service used by submitters, so integration tests and the binary
//! entrypoint can both access them.

pub mod config;
pub mod error;
pub mod processor;
pub mod runner;
pub mod service;
