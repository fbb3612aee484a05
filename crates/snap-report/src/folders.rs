//! Artifact directory housekeeping.

use crate::result::{ReportError, ReportResult};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Upper bound on same-second collisions before giving up
const MAX_SUFFIX: u32 = 10_000;

/// Create `<prefix>_<stamp>.<ext>` in `dir`, appending `_1`, `_2`, ... if a
/// file with that name already exists.
///
/// The file is created with `create_new`, so two workers racing for the same
/// name never end up sharing one.
pub fn create_unique(
    dir: &Path,
    prefix: &str,
    stamp: &str,
    ext: &str,
) -> io::Result<(PathBuf, File)> {
    for n in 0..MAX_SUFFIX {
        let name = if n == 0 {
            format!("{prefix}_{stamp}.{ext}")
        } else {
            format!("{prefix}_{stamp}_{n}.{ext}")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {prefix}_{stamp}.{ext}"),
    ))
}

/// Make sure `dir` exists and holds no files from an earlier run.
///
/// Files are removed recursively; subdirectories are kept. A file that cannot
/// be removed is logged and skipped.
///
/// # Errors
///
/// Returns [`ReportError::Setup`] if the directory cannot be created or read.
pub fn prepare_dir(dir: &Path) -> ReportResult<()> {
    if dir.is_dir() {
        empty_files(dir)
    } else {
        fs::create_dir_all(dir).map_err(|e| ReportError::setup(dir, e))?;
        tracing::debug!("Created {}", dir.display());
        Ok(())
    }
}

/// Check an entry's own type. Symlinks are not followed, so a link to a
/// directory counts as a file and only the link is removed.
fn is_real_dir(entry: &fs::DirEntry) -> bool {
    entry.file_type().is_ok_and(|t| t.is_dir())
}

fn empty_files(dir: &Path) -> ReportResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| ReportError::setup(dir, e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if is_real_dir(&entry) {
            empty_files(&path)?;
        } else if let Err(e) = fs::remove_file(&path) {
            tracing::warn!("Failed to delete file {}: {e}", path.display());
        }
    }
    Ok(())
}

/// Delete every file in `dir` except the one named `keep`.
///
/// Returns the number of files deleted.
///
/// # Errors
///
/// Returns [`ReportError::Setup`] if `dir` is not a readable directory.
pub fn clear_except(dir: &Path, keep: &str) -> ReportResult<usize> {
    if !dir.is_dir() {
        return Err(ReportError::setup(dir, "not a directory"));
    }
    let entries = fs::read_dir(dir).map_err(|e| ReportError::setup(dir, e))?;
    let mut deleted = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if is_real_dir(&entry) || entry.file_name() == keep {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Deleted file {}", path.display());
                deleted += 1;
            }
            Err(e) => tracing::warn!("Failed to delete file {}: {e}", path.display()),
        }
    }
    Ok(deleted)
}
