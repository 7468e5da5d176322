//! Build definitions.
//!
//! A definition is the serialized, content-addressed build graph handed to the
//! engine when no frontend is named. This crate reads one from a byte stream,
//! rewrites its per-operation metadata (the `--no-cache` pass) and writes it
//! back out.

pub mod definition;
pub mod digest;
pub mod op;

pub use definition::{read_from, Definition, OpMetadata};
pub use digest::Digest;
pub use op::Op;
