//! Core domain types, errors, and constants for `bkctl`.
//!
//! Everything that more than one stage of a build invocation has to agree on
//! lives here: the request handed to the build engine, the progress records
//! it streams back, the result maps it returns, and the error taxonomy every
//! other crate reports through.
//!
//! ## Key Components
//!
//! - **`errors`**: the `Error` enum and `Result` alias shared by the workspace.
//! - **`types`**: `BuildRequest`, `SolveStatus` and the result maps.
//! - **`session`**: the capability trait for session attachables.
//! - **`constants`**: frontend attribute names and metadata keys.

pub mod constants;
pub mod errors;
pub mod session;
pub mod types;

pub use self::{
    constants::*,
    errors::{Error, Result, ResultExt},
    session::{Attachable, LogSource},
    types::*,
};
