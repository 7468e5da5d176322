//! Progress plumbing for a build invocation.
//!
//! The engine emits one ordered stream of [`SolveStatus`] records. This crate
//! fans that stream out to independently paced sinks: the interactive
//! display, an append-only trace file, and one handle per session attachable
//! that reports progress of its own.
//!
//! Every sink sits behind a [`ProgressWriter`]: an unbounded input side, so a
//! slow sink never stalls the producer and nothing is dropped, and a
//! [`Completion`] that fires once the sink has drained and stopped.
//!
//! [`SolveStatus`]: bkctl_core::SolveStatus

pub mod multi;
pub mod printer;
pub mod reset;
pub mod tee;
pub mod trace;
pub mod writer;

pub use multi::MultiWriter;
pub use printer::{spawn_printer, ProgressMode};
pub use reset::reset_time;
pub use tee::tee;
pub use trace::TraceRecorder;
pub use writer::{discard, Completion, ProgressWriter};
