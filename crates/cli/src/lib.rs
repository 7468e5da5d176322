//! The `bkctl` command line client
//!
//! Flag translation, the built-in engines, and the `build` command that ties
//! the definition loader, the orchestrator and the result reporter together.

pub mod commands;
pub mod config;
pub mod engine;
pub mod parse;

pub use commands::Commands;
pub use config::BuildConfig;
