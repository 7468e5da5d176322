use crate::engine::{BuildFunc, Engine, Gateway, GatewayResult, SolveRequest};
use crate::group::TaskGroup;
use async_trait::async_trait;
use bkctl_core::{
    BuildRequest, Error, ExporterResponse, Result, StatusReceiver, StatusSender,
    SubRequestMetadata, DEFAULT_CLIENT_NAME, FRONTEND_CAPS_ATTR, NO_CACHE_ATTR, REQUEST_ID_ATTR,
    SUBREQUESTS_CAP,
};
use bkctl_llb::Definition;
use bkctl_progress::{reset_time, tee, MultiWriter, ProgressWriter, TraceRecorder};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything one build invocation needs
pub struct Invocation {
    pub request: BuildRequest,
    /// Required when `request.frontend` is empty, forbidden otherwise
    pub definition: Option<Definition>,
    /// Bypass the cache for every operation
    pub no_cache: bool,
    /// Display sink; it is closed once the build and its loggers are done
    pub display: ProgressWriter,
    /// Optional trace file receiving a copy of every status record
    pub trace: Option<TraceRecorder>,
}

/// Results of a successful build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveOutcome {
    pub exporter_response: ExporterResponse,
    /// Filled only when the request was a sub-request
    pub sub_metadata: SubRequestMetadata,
}

/// Drives builds against one engine
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn Engine>,
    client_name: String,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
        }
    }

    /// Name reported to the engine for builds started here
    #[must_use]
    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    /// Run one build.
    ///
    /// Request problems are reported before anything starts. Once the build
    /// is running, the first failure of any task (the solve, the progress
    /// pump, the trace recorder, an attachable logger, the display) cancels
    /// the rest and is returned as is. Cancelling `cancel` aborts the build.
    pub async fn run(&self, invocation: Invocation, cancel: &CancellationToken) -> Result<SolveOutcome> {
        let Invocation {
            mut request,
            definition,
            no_cache,
            display,
            trace,
        } = invocation;
        let solve_request = assemble(&mut request, definition, no_cache)?;

        let mut group = TaskGroup::new(cancel);

        let display = match trace {
            Some(recorder) => {
                info!("tracing logs to {}", recorder.path().display());
                let (trace_tx, trace_rx) = mpsc::unbounded_channel();
                group.spawn(record_trace(recorder, trace_rx));
                tee(display, trace_tx)
            }
            None => display,
        };
        let display_done = display.completion();
        let multi = MultiWriter::new(display);

        let solve_done = CancellationToken::new();
        for attachable in &request.session {
            let Some(source) = attachable.as_log_source() else {
                continue;
            };
            let (log_tx, log_rx) = mpsc::unbounded_channel();
            source.set_logger(log_tx);
            group.spawn(forward_logs(
                attachable.name().to_string(),
                log_rx,
                multi.with_prefix("", false),
                solve_done.clone(),
                group.token(),
            ));
        }

        let engine_writer = reset_time(multi.with_prefix("", false));
        drop(multi);
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        group.spawn(pump(engine_rx, engine_writer, group.token()));

        // The display runs outside the group's cancellation so it can finish
        // reporting; only its own failure counts against the build.
        group.spawn(async move { display_done.wait().await });

        debug!(
            background_tasks = group.len(),
            sub_request = request.is_sub_request(),
            "launched build tasks"
        );

        let mut sub_metadata = SubRequestMetadata::new();
        let handle = group.handle();
        let solve = self.solve(
            &request,
            solve_request,
            &mut sub_metadata,
            engine_tx,
            group.token(),
            solve_done,
        );
        let (exporter_response, ()) = tokio::join!(handle.run(solve), group.join());

        if let Some(err) = handle.take_error() {
            return Err(err);
        }
        let exporter_response = exporter_response
            .ok_or_else(|| Error::internal("solve finished without a response"))?;

        Ok(SolveOutcome {
            exporter_response,
            sub_metadata,
        })
    }

    async fn solve(
        &self,
        request: &BuildRequest,
        solve_request: SolveRequest,
        sub_metadata: &mut SubRequestMetadata,
        status: StatusSender,
        cancel: CancellationToken,
        solve_done: CancellationToken,
    ) -> Result<ExporterResponse> {
        // Attachable loggers are closed on every exit path from here on.
        let _closing = solve_done.drop_guard();

        let mut callback = SolveCallback {
            request: solve_request,
            sub_metadata,
        };
        let response = tokio::select! {
            response = self.engine.build(
                cancel.clone(),
                request,
                &self.client_name,
                &mut callback,
                status,
            ) => response?,
            _ = cancel.cancelled() => return Err(Error::Canceled),
        };

        for (key, value) in &response.exporter_response {
            debug!(key = %key, value = %value, "exporter response");
        }
        Ok(response.exporter_response)
    }
}

/// Check which of frontend or definition drives the build and build the
/// gateway request for it.
pub fn assemble(
    request: &mut BuildRequest,
    definition: Option<Definition>,
    no_cache: bool,
) -> Result<SolveRequest> {
    let definition = match (request.frontend.is_empty(), definition) {
        (true, None) => {
            return Err(Error::usage(
                "please specify --frontend or pipe LLB definition to stdin",
            ))
        }
        (true, Some(def)) if def.is_empty() => {
            return Err(Error::usage(
                "empty definition sent to build. Specify --frontend instead?",
            ))
        }
        (true, Some(mut def)) => {
            if no_cache {
                def.apply_no_cache()?;
            }
            Some(def)
        }
        (false, Some(_)) => {
            return Err(Error::usage(
                "frontend and definition are mutually exclusive",
            ))
        }
        (false, None) => {
            if no_cache {
                request
                    .frontend_attrs
                    .insert(NO_CACHE_ATTR.to_string(), String::new());
            }
            None
        }
    };

    debug!(
        frontend = %request.frontend,
        attrs = request.frontend_attrs.len(),
        operations = definition.as_ref().map_or(0, Definition::len),
        "assembled solve request"
    );

    Ok(SolveRequest {
        frontend: request.frontend.clone(),
        frontend_opt: request.frontend_attrs.clone(),
        definition,
    })
}

/// The routine the engine runs inside the build session. It owns the only
/// mutable reference to the sub-request metadata slot.
struct SolveCallback<'a> {
    request: SolveRequest,
    sub_metadata: &'a mut SubRequestMetadata,
}

#[async_trait]
impl<'a> BuildFunc for SolveCallback<'a> {
    async fn call(&mut self, cancel: CancellationToken, gateway: &dyn Gateway) -> Result<GatewayResult> {
        let is_sub_request = self.request.frontend_opt.contains_key(REQUEST_ID_ATTR);
        if is_sub_request {
            self.request
                .frontend_opt
                .entry(FRONTEND_CAPS_ATTR.to_string())
                .or_insert_with(|| SUBREQUESTS_CAP.to_string());
        }

        let result = gateway.solve(cancel, self.request.clone()).await?;
        if is_sub_request {
            *self.sub_metadata = result.metadata.clone();
        }
        Ok(result)
    }
}

/// Move engine status records into the display
async fn pump(mut rx: StatusReceiver, writer: ProgressWriter, cancel: CancellationToken) -> Result<()> {
    loop {
        tokio::select! {
            biased;
            status = rx.recv() => match status {
                Some(status) => {
                    writer.send(status);
                }
                None => break,
            },
            _ = cancel.cancelled() => {
                drain(&mut rx, &writer);
                break;
            }
        }
    }
    writer.close();
    Ok(())
}

/// Forward an attachable's own status records until the solve is over
async fn forward_logs(
    name: String,
    mut rx: StatusReceiver,
    writer: ProgressWriter,
    solve_done: CancellationToken,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;
            status = rx.recv() => match status {
                Some(status) => {
                    writer.send(status);
                }
                None => break,
            },
            _ = solve_done.cancelled() => {
                drain(&mut rx, &writer);
                break;
            }
            _ = cancel.cancelled() => {
                drain(&mut rx, &writer);
                break;
            }
        }
    }
    debug!(attachable = %name, "closed attachable logger");
    writer.close();
    Ok(())
}

/// Append every record to the trace file; a failed write fails the build.
///
/// Runs until the tee closes its copy channel, so records queued before a
/// failure still reach the file.
async fn record_trace(mut recorder: TraceRecorder, mut rx: StatusReceiver) -> Result<()> {
    while let Some(status) = rx.recv().await {
        recorder.record(&status).await?;
    }
    debug!(records = recorder.records(), "trace finished");
    Ok(())
}

fn drain(rx: &mut StatusReceiver, writer: &ProgressWriter) {
    while let Ok(status) = rx.try_recv() {
        writer.send(status);
    }
}
