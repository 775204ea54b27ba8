//! PID file for external supervisors.
//!
//! The file holds the decimal PID and nothing else (no newline). It is
//! written to a temporary file in the same directory and renamed into place,
//! so readers never observe a partial write.

use crate::error::{Error, PidFileAction, Result};
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;

/// Writes `pid` to `path`. An empty path is a no-op.
///
/// A stale regular file at `path` is removed first. A directory at `path`,
/// or a missing/unusable parent directory, fails with
/// [`PidFileAction::Create`].
pub fn write_pid_file(path: &Path, pid: u32) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }

    let fail = |action, source| Error::PidFileFailed {
        path: path.to_path_buf(),
        action,
        source,
    };

    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            return Err(fail(
                PidFileAction::Create,
                io::Error::new(io::ErrorKind::AlreadyExists, "path is a directory"),
            ));
        }
        Ok(_) => fs::remove_file(path).map_err(|e| fail(PidFileAction::RemoveStale, e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(fail(PidFileAction::RemoveStale, e)),
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".pid-")
        .permissions(fs::Permissions::from_mode(0o644))
        .tempfile_in(dir)
        .map_err(|e| fail(PidFileAction::Create, e))?;
    tmp.write_all(pid.to_string().as_bytes())
        .map_err(|e| fail(PidFileAction::Create, e))?;
    tmp.persist(path)
        .map_err(|e| fail(PidFileAction::Create, e.error))?;

    debug!(path = %path.display(), pid, "wrote pid file");
    Ok(())
}
