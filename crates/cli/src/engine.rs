//! The engine shipped with the binary.
//!
//! `dry-run` executes nothing. It walks the submitted definition, reports one
//! vertex per operation, and answers with an exporter response that describes
//! what a real engine would have been asked to do.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bkctl_core::{
    BuildRequest, ExporterResponse, Result, SolveStatus, StatusSender, Vertex, REQUEST_ID_ATTR,
    RESULT_TXT_KEY,
};
use bkctl_llb::Digest;
use bkctl_solve::{BuildFunc, Engine, Gateway, GatewayResult, SolveRequest, SolveResponse};
use chrono::Utc;
use clap::ValueEnum;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Engines selectable with `--engine`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    #[default]
    DryRun,
}

impl EngineKind {
    #[must_use]
    pub fn connect(self) -> Arc<dyn Engine> {
        match self {
            EngineKind::DryRun => Arc::new(DryRunEngine),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunEngine;

#[async_trait]
impl Engine for DryRunEngine {
    async fn build(
        &self,
        cancel: CancellationToken,
        request: &BuildRequest,
        client_name: &str,
        build: &mut dyn BuildFunc,
        status: StatusSender,
    ) -> Result<SolveResponse> {
        info!(client = %client_name, "dry run: nothing will be executed");

        let gateway = DryRunGateway {
            status,
            definition_digest: Mutex::new(None),
        };
        build.call(cancel, &gateway).await?;

        let exporters: Vec<&str> = request.exports.iter().map(|e| e.kind.as_str()).collect();
        let summary = json!({
            "frontend": request.frontend,
            "exporters": exporters,
            "locals": request.local_dirs.keys().collect::<Vec<_>>(),
            "entitlements": request
                .allowed_entitlements
                .iter()
                .map(|e| e.as_str())
                .collect::<Vec<_>>(),
        });

        let mut exporter_response = ExporterResponse::new();
        exporter_response.insert("dryrun.summary".to_string(), STANDARD.encode(summary.to_string()));
        if let Some(digest) = gateway.definition_digest.lock().take() {
            exporter_response.insert("dryrun.definition.digest".to_string(), digest.to_string());
        }
        Ok(SolveResponse { exporter_response })
    }
}

/// Records what would have been solved
struct DryRunGateway {
    status: StatusSender,
    definition_digest: Mutex<Option<Digest>>,
}

impl DryRunGateway {
    fn emit(&self, status: SolveStatus) {
        // Fails only once the display has stopped listening.
        let _ = self.status.send(status);
    }
}

#[async_trait]
impl Gateway for DryRunGateway {
    async fn solve(&self, _cancel: CancellationToken, request: SolveRequest) -> Result<GatewayResult> {
        let mut result = GatewayResult::default();

        if let Some(definition) = &request.definition {
            for (digest, op) in definition.decode_ops()? {
                let mut vertex = Vertex {
                    digest: digest.to_string(),
                    inputs: op.inputs.iter().map(|i| i.digest.clone()).collect(),
                    name: op.describe(),
                    started: Some(Utc::now()),
                    ..Vertex::default()
                };
                self.emit(SolveStatus {
                    vertexes: vec![vertex.clone()],
                    ..SolveStatus::default()
                });
                vertex.completed = Some(Utc::now());
                self.emit(SolveStatus {
                    vertexes: vec![vertex],
                    ..SolveStatus::default()
                });
            }
            let mut encoded = Vec::new();
            definition.write_to(&mut encoded)?;
            *self.definition_digest.lock() = Some(Digest::from_bytes(&encoded));
            debug!(operations = definition.len(), "dry run walked definition");
        }

        if let Some(request_id) = request.frontend_opt.get(REQUEST_ID_ATTR) {
            let text = format!(
                "dry run: frontend {} would answer {}\n",
                request.frontend, request_id
            );
            result
                .metadata
                .insert(RESULT_TXT_KEY.to_string(), text.into_bytes());
        }

        Ok(result)
    }
}
