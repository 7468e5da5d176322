//! Append-only trace file of every status record seen during a build

use bkctl_core::{Error, Result, SolveStatus};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Writes each status as one JSON document followed by a newline.
///
/// The file is opened for append, so repeated runs accumulate.
#[derive(Debug)]
pub struct TraceRecorder {
    file: File,
    path: PathBuf,
    records: u64,
}

impl TraceRecorder {
    /// Open (or create) the trace file at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);

        let file = options
            .open(&path)
            .await
            .map_err(|e| Error::file_system(&path, "open trace file", e))?;

        Ok(Self {
            file,
            path,
            records: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records appended through this recorder
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Append one record. The record is encoded in full before anything is
    /// written, and handed to the file in a single write.
    pub async fn record(&mut self, status: &SolveStatus) -> Result<()> {
        let mut line = serde_json::to_vec(status).map_err(|e| self.failure(e))?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .await
            .map_err(|e| self.failure(e))?;
        self.file.flush().await.map_err(|e| self.failure(e))?;
        self.records += 1;
        Ok(())
    }

    fn failure(&self, err: impl std::fmt::Display) -> Error {
        Error::sink(format!("trace {}", self.path.display()), err.to_string())
    }
}
