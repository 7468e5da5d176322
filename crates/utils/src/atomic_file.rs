//! Writing result files so readers see either the old file or the new one

use bkctl_core::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `content` through a temporary file in the same
/// directory.
///
/// Missing parent directories are created. The temporary file is deleted
/// when anything fails, and the previous file at `path` is kept.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if dir.as_os_str().is_empty() => Path::new("."),
        Some(dir) => dir,
        None => {
            return Err(Error::usage(format!(
                "invalid file path '{}': no parent directory",
                path.display()
            )))
        }
    };
    fs::create_dir_all(dir).map_err(|e| Error::file_system(dir, "create parent directory", e))?;

    let mut staged = NamedTempFile::new_in(dir)
        .map_err(|e| Error::file_system(dir, "create temporary file", e))?;
    staged
        .write_all(content)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|e| Error::file_system(staged.path(), "write temporary file", e))?;

    staged
        .persist(path)
        .map_err(|e| Error::file_system(path, "replace file", e.error))?;
    Ok(())
}
