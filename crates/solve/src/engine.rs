//! The boundary to the build engine.
//!
//! The engine owns the wire protocol and the build graph execution. A build
//! runs in two layers: [`Engine::build`] opens a session for the request and
//! calls back into a [`BuildFunc`], which performs the actual graph solve
//! through the [`Gateway`] the engine provides.

use async_trait::async_trait;
use bkctl_core::{BuildRequest, ExporterResponse, Result, StatusSender};
use bkctl_llb::Definition;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// What the build callback asks the gateway to solve
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveRequest {
    pub frontend: String,
    pub frontend_opt: BTreeMap<String, String>,
    pub definition: Option<Definition>,
}

/// Result of a gateway solve
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayResult {
    pub metadata: BTreeMap<String, Vec<u8>>,
}

/// Returned by the engine once the build and its exports have finished
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveResponse {
    pub exporter_response: ExporterResponse,
}

/// Solve access handed to a [`BuildFunc`] for the duration of a build
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn solve(&self, cancel: CancellationToken, request: SolveRequest) -> Result<GatewayResult>;
}

/// Caller-supplied routine the engine runs inside a build session
#[async_trait]
pub trait BuildFunc: Send {
    async fn call(&mut self, cancel: CancellationToken, gateway: &dyn Gateway) -> Result<GatewayResult>;
}

/// A build engine
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run one build.
    ///
    /// Status records go to `status` in the order they happen; the engine
    /// drops `status` when it returns. Sending may fail once the receiving
    /// side has stopped, which the engine must tolerate.
    async fn build(
        &self,
        cancel: CancellationToken,
        request: &BuildRequest,
        client_name: &str,
        build: &mut dyn BuildFunc,
        status: StatusSender,
    ) -> Result<SolveResponse>;
}
