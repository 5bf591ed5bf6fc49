/// Crash-safe file writing primitives
///
/// Every durable output of the crate goes through one of two primitives:
/// `write_atomic` for whole-file snapshots (dictionary-derived outputs, the
/// provenance index, rebuilt aggregates) and `append_line` for the
/// high-frequency per-context logs where appending a line is enough.
///
/// `write_atomic` writes to a temporary file in the destination directory and
/// renames it over the destination in one step. A crash between the two
/// leaves the previous destination untouched; external tooling never observes
/// a truncated file.
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{UilexError, UilexResult};

/// Replace the file at `path` with `content` in one atomic step
///
/// Missing parent directories are created. On any failure the previous
/// file at `path` is left exactly as it was.
pub fn write_atomic(path: &Path, content: &[u8]) -> UilexResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| UilexError::io(parent, e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| UilexError::io(parent, e))?;
    temp.write_all(content).map_err(|e| UilexError::io(path, e))?;
    temp.flush().map_err(|e| UilexError::io(path, e))?;
    temp.persist(path).map_err(|e| UilexError::io(path, e.error))?;
    Ok(())
}

/// Append one line to the file at `path`, creating file and parents on first use
pub fn append_line(path: &Path, line: &str) -> UilexResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| UilexError::io(parent, e))?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| UilexError::io(path, e))?;
    writeln!(file, "{}", line).map_err(|e| UilexError::io(path, e))?;
    Ok(())
}
