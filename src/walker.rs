//! Enumeration of the regular files under a target path

use crate::error::{BatchError, ErrorCategory, ErrorKind, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File names skipped during directory traversal by default.
pub const DEFAULT_HOUSEKEEPING: &[&str] = &[".DS_Store"];

/// Feed every regular file under `root` to `visit`, returning how many were fed.
///
/// A root that is itself a regular file is visited as-is. Inside directories,
/// entries named in `housekeeping` and anything that is not a regular file
/// (directories, symlinks, devices) are skipped. Any lookup or traversal error
/// stops the walk and is returned; paths visited before the error stay visited.
///
/// Each directory's listing is read in full before any of its files is
/// visited, so files that `visit` causes to appear next to a visited file are
/// never themselves visited.
pub fn walk<F>(root: &Path, housekeeping: &[String], mut visit: F) -> Result<usize>
where
    F: FnMut(PathBuf),
{
    let metadata = fs::metadata(root).map_err(|e| {
        BatchError::with_kind_and_source(
            category_for(&e),
            ErrorKind::TargetUnavailable,
            format!("failed to read target {}", root.display()),
            e,
        )
    })?;

    if metadata.is_file() {
        visit(root.to_path_buf());
        return Ok(1);
    }

    if !metadata.is_dir() {
        return Err(BatchError::with_kind(
            ErrorCategory::User,
            ErrorKind::TargetUnsupported,
            format!("target is neither a file nor a directory: {}", root.display()),
        ));
    }

    let mut visited = 0;
    // Sorting makes walkdir read a whole directory before yielding from it.
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let msg = match e.path() {
                Some(path) => format!("failed to traverse {}", path.display()),
                None => format!("failed to traverse {}", root.display()),
            };
            BatchError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Traversal, msg, e)
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        if is_housekeeping(entry.file_name(), housekeeping) {
            tracing::trace!(path = %entry.path().display(), "skipping housekeeping file");
            continue;
        }

        visit(entry.into_path());
        visited += 1;
    }

    Ok(visited)
}

fn is_housekeeping(name: &std::ffi::OsStr, housekeeping: &[String]) -> bool {
    housekeeping.iter().any(|h| name == h.as_str())
}

fn category_for(err: &io::Error) -> ErrorCategory {
    if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    }
}
