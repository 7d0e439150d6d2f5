//! Shared fixtures for copy analysis tests: lattice-law assertions, canned
//! programs and stable text dumps for snapshots.

mod dump;
pub mod lattice;
pub mod programs;

pub use dump::{dump_result, dump_state};
