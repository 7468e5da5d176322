//! Runs one build against a build engine.
//!
//! The [`Orchestrator`] turns a validated [`BuildRequest`] (and, when no
//! frontend is named, a [`Definition`]) into a solve call, streams the
//! engine's progress through the progress sinks while it runs, and hands back
//! the exporter response plus any sub-request metadata. The [`report`]
//! module renders those results once the build has finished.
//!
//! [`BuildRequest`]: bkctl_core::BuildRequest
//! [`Definition`]: bkctl_llb::Definition

pub mod engine;
pub mod group;
pub mod orchestrator;
pub mod report;

pub use engine::{BuildFunc, Engine, Gateway, GatewayResult, SolveRequest, SolveResponse};
pub use group::{GroupHandle, TaskGroup};
pub use orchestrator::{Invocation, Orchestrator, SolveOutcome};
pub use report::{report_sub_metadata, write_metadata_file};
