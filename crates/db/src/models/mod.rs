//! Domain model structs and DTOs.
//!
//! - `job`: the `FromRow` + `Serialize` job entity, listing DTOs, and aggregate rows
//! - `status`: the job lifecycle status enum and its transition table

pub mod job;
pub mod status;
