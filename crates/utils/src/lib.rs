//! Shared helpers for bkctl
//!
//! File helpers that must not leave partial output behind, and the process
//! wide diagnostic logging setup.

pub mod atomic_file;
pub mod tracing;

pub use atomic_file::*;
