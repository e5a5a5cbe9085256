//! Atomic write operations for single JSON files.
//!
//! Two write strategies coexist, chosen by the caller:
//!
//! - [`write_atomic`]: temp-file-then-rename, for writes to a *new* location
//!   (creates, cross-directory moves, doctor repairs). The target is never
//!   observable in a partially-written state.
//! - [`write_in_place`]: truncate-and-rewrite on an already-open descriptor,
//!   for rewrites that must preserve flock identity. Guarded by a `.backup`
//!   sibling that [`restore_backups`] replays after a crash.
//!
//! Readers use [`read_locked`], which holds a shared flock for the duration
//! of the read so an in-place writer's truncate window is never observed.

use crate::error::{FsError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Suffix appended to a file's name for its crash-recovery backup.
pub(crate) const BACKUP_SUFFIX: &str = ".backup";

/// Marker embedded in every in-flight temp file name.
const TMP_MARKER: &str = ".tmp.";

/// Process-local sequence for temp file names.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Whether a file name belongs to transient machinery rather than data.
///
/// Matches in-flight temp files (`.tmp.` infix), sidecar locks (`.lock`),
/// and crash-recovery backups (`.backup`). Directory listings skip these.
#[must_use]
pub fn is_transient_name(name: &str) -> bool {
    name.contains(TMP_MARKER) || name.contains(".lock") || name.contains(BACKUP_SUFFIX)
}

/// Build the sibling temp path for an atomic write of `path`.
///
/// The name is dotted so listings that skip hidden files never see it, and
/// carries the pid and a process-local sequence number so concurrent writers
/// in one or several processes never collide.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(".{}{}{}-{}", name, TMP_MARKER, std::process::id(), seq);
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

/// Atomically replace (or create) `path` with `bytes`.
///
/// Writes to a freshly-named temp file in the same directory, fsyncs, and
/// renames over the target. On any failure before the rename completes the
/// temp file is removed and the original target is unchanged.
///
/// # Errors
///
/// Returns an error if the temp file cannot be created, written, synced, or
/// renamed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path_for(path);

    let result = (|| -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    Ok(())
}

/// Create `path` with exclusive-create semantics and write `bytes` into it.
///
/// The open uses `O_CREAT|O_EXCL`, so an existing file fails with an
/// `AlreadyExists` IO error (see [`FsError::is_already_exists`]) and the
/// existing content is untouched. The new descriptor is exclusively flocked
/// before the first byte is written, so shared-lock readers never observe
/// the file empty or partial.
///
/// # Errors
///
/// Returns an error if the file already exists or if the write fails. On a
/// write failure the half-created file is removed.
pub fn create_exclusive(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)?;

    let result = (|| -> Result<()> {
        FileExt::lock_exclusive(&file)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = FileExt::unlock(&file);
        let _ = fs::remove_file(path);
        return Err(e);
    }

    let _ = FileExt::unlock(&file);
    Ok(())
}

/// Rewrite `path` through an already-open, exclusively-locked descriptor.
///
/// The caller must hold an exclusive flock on `file` (see
/// [`crate::FileLock`]); the lock is what makes the truncate window
/// invisible to [`read_locked`] readers. Before touching the descriptor the
/// current bytes are copied to `<path>.backup` and synced; only after the
/// rewrite is durable is the backup removed. A crash anywhere in between
/// leaves a backup that [`restore_backups`] replays on the next startup.
///
/// # Errors
///
/// Returns an error if any read, write, or sync step fails. The backup file
/// is deliberately left in place on failure so recovery can restore the
/// pre-image.
pub fn write_in_place(file: &mut File, path: &Path, bytes: &[u8]) -> Result<()> {
    let backup = backup_path_for(path);

    // Preserve the pre-image first.
    let mut current = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut current)?;

    let mut backup_file = File::create(&backup)?;
    backup_file.write_all(&current)?;
    backup_file.sync_all()?;
    drop(backup_file);

    file.seek(SeekFrom::Start(0))?;
    file.set_len(0)?;
    file.write_all(bytes)?;
    file.sync_all()?;

    fs::remove_file(&backup)?;
    Ok(())
}

/// Read the full contents of `path` under a shared flock.
///
/// The shared lock excludes in-place writers (which hold the exclusive
/// lock across their truncate+write), so a reader never sees partial bytes.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, locked, or read.
pub fn read_locked(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    // Fully-qualified: std's File::lock_shared (1.89+) shadows the trait.
    FileExt::lock_shared(&file)?;
    let mut bytes = Vec::new();
    let result = file.read_to_end(&mut bytes);
    let _ = FileExt::unlock(&file);
    result?;
    Ok(bytes)
}

/// Restore every `*.backup` file in `dir` over its primary.
///
/// A backup on disk means an in-place rewrite was interrupted between the
/// backup write and the final cleanup; the primary may hold anything from
/// the old bytes to a truncated torso. Renaming the backup over it restores
/// the pre-image. Returns the number of files restored.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or a rename fails.
pub fn restore_backups(dir: &Path) -> Result<usize> {
    let mut restored = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(primary_name) = name.strip_suffix(BACKUP_SUFFIX) else {
            continue;
        };
        if primary_name.is_empty() {
            continue;
        }

        let primary = dir.join(primary_name);
        fs::rename(entry.path(), &primary)?;
        restored += 1;
        tracing::warn!(path = %primary.display(), "restored crash-recovery backup");
    }

    Ok(restored)
}

/// The backup sibling path for `path`.
pub(crate) fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(BACKUP_SUFFIX);
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}
