//! src/fs/atomic.rs
//! Whole-file writes that never leave a truncated destination behind
//!
//! The content goes to a hidden temp file next to the target; only a fully
//! written, synced file is renamed into place. On any failure the temp file is
//! removed and the target is untouched.

use crate::error::BackupError;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `target` through `write_fn`, replacing it only on success.
///
/// Missing parent directories are created.
pub fn write_atomic<T, F>(target: &Path, write_fn: F) -> Result<T, BackupError>
where
    F: FnOnce(&mut File) -> Result<T, BackupError>,
{
    write_atomic_guarded(target, || Ok(()), write_fn)
}

/// [`write_atomic`], asking `guard` for permission right before the rename.
///
/// A guard error discards the fully written temp file and is returned as is;
/// the target is never touched.
pub fn write_atomic_guarded<T, G, F>(
    target: &Path,
    guard: G,
    write_fn: F,
) -> Result<T, BackupError>
where
    G: FnOnce() -> Result<(), BackupError>,
    F: FnOnce(&mut File) -> Result<T, BackupError>,
{
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => {
            return Err(BackupError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no parent directory", target.display()),
            )))
        }
    };
    fs::create_dir_all(parent)?;

    let tmp_path = build_tmp_path(parent, target.file_name());
    let mut tmp_file = File::create(&tmp_path)?;

    let value = match write_fn(&mut tmp_file).and_then(|v| {
        tmp_file.sync_all()?;
        Ok(v)
    }) {
        Ok(v) => v,
        Err(err) => {
            drop(tmp_file);
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }
    };
    drop(tmp_file);

    if let Err(err) = guard() {
        let _ = fs::remove_file(&tmp_path);
        debug!(target = %target.display(), error = %err, "atomic write discarded");
        return Err(err);
    }
    if let Err(err) = fs::rename(&tmp_path, target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    debug!(target = %target.display(), "atomic write committed");
    Ok(value)
}

fn build_tmp_path(parent: &Path, file_name: Option<&OsStr>) -> PathBuf {
    let base_name = file_name
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("mbdecrypt-output");

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);

    parent.join(format!(
        ".{base_name}.tmp-{}-{timestamp}-{counter}",
        std::process::id()
    ))
}
