use crate::config::BuildConfig;
use crate::engine::EngineKind;
use crate::parse;
use bkctl_core::{Error, Result};
use bkctl_llb::Definition;
use bkctl_progress::{spawn_printer, ProgressMode, TraceRecorder};
use bkctl_solve::{report_sub_metadata, write_metadata_file, Invocation, Orchestrator};
use clap::Args;
use std::io::IsTerminal;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Define exports for build result, e.g. type=local,dest=out
    #[arg(short = 'o', long = "output", value_name = "SPEC")]
    pub outputs: Vec<String>,

    /// Set type of progress (auto, plain, tty, quiet, rawjson)
    #[arg(long, value_name = "MODE", default_value = "auto")]
    pub progress: ProgressMode,

    /// Path to trace file; every progress record is appended to it
    #[arg(long, value_name = "PATH")]
    pub trace: Option<PathBuf>,

    /// Allow build access to the local directory, e.g. context=.
    #[arg(long = "local", value_name = "NAME=PATH")]
    pub locals: Vec<String>,

    /// Allow build access to a local OCI layout, e.g. store=./layout
    #[arg(long = "oci-layout", value_name = "NAME=PATH")]
    pub oci_layouts: Vec<String>,

    /// Define frontend used for build
    #[arg(long, value_name = "NAME", default_value = "")]
    pub frontend: String,

    /// Define custom options for frontend, e.g. target=foo
    #[arg(long = "opt", value_name = "KEY=VALUE")]
    pub opts: Vec<String>,

    /// Disable cache for all the vertices
    #[arg(long)]
    pub no_cache: bool,

    /// Export build cache, e.g. type=registry,ref=example.com/foo/bar
    #[arg(long = "export-cache", value_name = "SPEC")]
    pub export_cache: Vec<String>,

    /// Import build cache, e.g. type=registry,ref=example.com/foo/bar
    #[arg(long = "import-cache", value_name = "SPEC")]
    pub import_cache: Vec<String>,

    /// Allow extra privileged entitlement, e.g. network.host
    #[arg(long = "allow", value_name = "ENTITLEMENT")]
    pub allow: Vec<String>,

    /// Output build metadata (e.g., image digest) to a file as JSON
    #[arg(long, value_name = "PATH")]
    pub metadata_file: Option<PathBuf>,

    /// Build engine to submit the build to
    #[arg(long, value_enum, default_value_t = EngineKind::DryRun)]
    pub engine: EngineKind,
}

impl BuildArgs {
    /// Translate the raw flags into a validated configuration
    pub fn to_config(&self) -> Result<BuildConfig> {
        Ok(BuildConfig {
            frontend: self.frontend.clone(),
            frontend_attrs: parse::parse_opts(&self.opts)?,
            exports: parse::parse_outputs(&self.outputs)?,
            cache_exports: parse::parse_cache_options("export-cache", &self.export_cache)?,
            cache_imports: parse::parse_cache_options("import-cache", &self.import_cache)?,
            local_dirs: parse::parse_locals(&self.locals)?,
            oci_stores: parse::parse_oci_layouts(&self.oci_layouts)?,
            allowed_entitlements: parse::parse_entitlements(&self.allow)?,
            progress: self.progress,
            trace: self.trace.clone(),
            metadata_file: self.metadata_file.clone(),
            no_cache: self.no_cache,
        })
    }
}

/// Read the build graph from stdin, refusing an interactive terminal
fn read_definition() -> Result<Definition> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(Error::usage(
            "please specify --frontend or pipe LLB definition to stdin",
        ));
    }
    bkctl_llb::read_from(stdin.lock())
}

pub async fn execute(args: BuildArgs) -> Result<()> {
    let config = args.to_config()?;
    debug!(?config, engine = ?args.engine, "build configuration");

    let definition = if config.needs_definition() {
        Some(read_definition()?)
    } else {
        None
    };

    let trace = match &config.trace {
        Some(path) => Some(TraceRecorder::open(path).await?),
        None => None,
    };
    let display = spawn_printer(tokio::io::stderr(), config.progress);

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling build");
                cancel.cancel();
            }
        }
    });

    let orchestrator = Orchestrator::new(args.engine.connect());
    let outcome = orchestrator
        .run(
            Invocation {
                request: config.request(),
                definition,
                no_cache: config.no_cache,
                display,
                trace,
            },
            &cancel,
        )
        .await;
    interrupt.abort();
    let outcome = outcome?;

    report_sub_metadata(&outcome.sub_metadata, &mut std::io::stdout().lock())?;

    if let Some(path) = &config.metadata_file {
        write_metadata_file(path, &outcome.exporter_response)?;
    }
    Ok(())
}
