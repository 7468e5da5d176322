//! Display sink for build progress.
//!
//! The printer is driven by its own task and never observes the build's
//! cancellation, so it keeps draining and can still report the records that
//! explain a failure.

use crate::writer::{Completion, ProgressWriter};
use bkctl_core::{Error, Result, SolveStatus, Vertex};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// How progress is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressMode {
    /// Pick based on the output; renders like `Plain`
    #[default]
    Auto,
    /// Interactive terminal; renders like `Plain`
    Tty,
    /// One line per vertex state change and log line
    Plain,
    /// Render nothing
    Quiet,
    /// One JSON record per status
    RawJson,
}

impl FromStr for ProgressMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(ProgressMode::Auto),
            "tty" => Ok(ProgressMode::Tty),
            "plain" => Ok(ProgressMode::Plain),
            "quiet" => Ok(ProgressMode::Quiet),
            "rawjson" => Ok(ProgressMode::RawJson),
            other => Err(Error::usage(format!("invalid progress mode '{other}'"))),
        }
    }
}

impl fmt::Display for ProgressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgressMode::Auto => "auto",
            ProgressMode::Tty => "tty",
            ProgressMode::Plain => "plain",
            ProgressMode::Quiet => "quiet",
            ProgressMode::RawJson => "rawjson",
        };
        f.write_str(name)
    }
}

/// Start a display sink writing to `out`
pub fn spawn_printer<W>(out: W, mode: ProgressMode) -> ProgressWriter
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<SolveStatus>();
    let (done, completion) = Completion::channel();

    tokio::spawn(async move {
        let mut out = out;
        let mut display = PlainDisplay::default();
        let mut result = Ok(());

        while let Some(status) = rx.recv().await {
            let rendered = match mode {
                ProgressMode::Quiet => continue,
                ProgressMode::RawJson => render_json(&status),
                ProgressMode::Auto | ProgressMode::Tty | ProgressMode::Plain => {
                    Ok(display.render(&status))
                }
            };
            let written = match rendered {
                Ok(text) if text.is_empty() => Ok(()),
                Ok(text) => write_flush(&mut out, text.as_bytes()).await,
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                debug!(error = %err, "progress display failed");
                result = Err(err);
                break;
            }
        }

        done.finish(result);
    });

    ProgressWriter::new(tx, completion)
}

async fn write_flush<W: AsyncWrite + Unpin>(out: &mut W, bytes: &[u8]) -> Result<()> {
    out.write_all(bytes)
        .await
        .map_err(|e| Error::sink("display", e.to_string()))?;
    out.flush()
        .await
        .map_err(|e| Error::sink("display", e.to_string()))
}

fn render_json(status: &SolveStatus) -> Result<String> {
    let mut line =
        serde_json::to_string(status).map_err(|e| Error::sink("display", e.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Line-oriented renderer: vertices are numbered in the order they first show up
#[derive(Debug, Default)]
struct PlainDisplay {
    numbers: HashMap<String, usize>,
    announced: HashSet<String>,
    finished: HashSet<String>,
    finished_statuses: HashSet<String>,
}

impl PlainDisplay {
    fn number(&mut self, digest: &str) -> usize {
        let next = self.numbers.len() + 1;
        *self.numbers.entry(digest.to_string()).or_insert(next)
    }

    fn render(&mut self, status: &SolveStatus) -> String {
        let mut out = String::new();

        for vertex in &status.vertexes {
            self.render_vertex(vertex, &mut out);
        }

        for vs in &status.statuses {
            if vs.completed.is_some() && self.finished_statuses.insert(vs.id.clone()) {
                let n = self.number(&vs.vertex);
                let label = if vs.name.is_empty() { &vs.id } else { &vs.name };
                if vs.total > 0 {
                    out.push_str(&format!("#{n} {label} {}/{} done\n", vs.current, vs.total));
                } else {
                    out.push_str(&format!("#{n} {label} done\n"));
                }
            }
        }

        for log in &status.logs {
            let n = self.number(&log.vertex);
            let text = String::from_utf8_lossy(&log.data);
            for line in text.lines() {
                out.push_str(&format!("#{n} {line}\n"));
            }
        }

        for warning in &status.warnings {
            out.push_str(&format!(
                "WARNING: {}\n",
                String::from_utf8_lossy(&warning.short)
            ));
        }

        out
    }

    fn render_vertex(&mut self, vertex: &Vertex, out: &mut String) {
        if vertex.started.is_none() && !vertex.cached && vertex.error.is_none() {
            return;
        }
        let n = self.number(&vertex.digest);
        if self.announced.insert(vertex.digest.clone()) {
            out.push_str(&format!("#{n} {}\n", vertex.name));
        }
        if self.finished.contains(&vertex.digest) {
            return;
        }
        if let Some(error) = &vertex.error {
            out.push_str(&format!("#{n} ERROR: {error}\n"));
        } else if vertex.cached {
            out.push_str(&format!("#{n} CACHED\n"));
        } else if let (Some(started), Some(completed)) = (vertex.started, vertex.completed) {
            let secs = (completed - started).num_milliseconds() as f64 / 1000.0;
            out.push_str(&format!("#{n} DONE {secs:.1}s\n"));
        } else {
            return;
        }
        self.finished.insert(vertex.digest.clone());
    }
}
