//! Advisory file locks.
//!
//! Locks are POSIX-style flocks taken on real files, so they coordinate
//! across OS processes sharing a store directory, not just across threads.
//! Two targets are used by the store:
//!
//! - **File-self locks** on an issue's JSON file, for in-place rewrites and
//!   shared-lock reads.
//! - **Sidecar locks** on a separate `<id>.lock` file, for operations that
//!   relocate or unlink the primary (the primary's inode moves, which would
//!   strand a lock taken on it).
//!
//! A [`FileLock`] releases its flock when dropped; sidecars for deleted
//! issues are additionally unlinked via [`FileLock::set_remove_on_drop`].
//! Sidecars left behind by crashed holders are reaped by
//! [`sweep_stale_locks`] at store startup.

use crate::error::{FsError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Interval between bounded-wait acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// An acquired advisory lock, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    remove_on_drop: bool,
}

impl FileLock {
    /// Acquire an exclusive lock on `path`, creating the file if needed.
    ///
    /// With `wait = None` the acquisition blocks until the lock is granted.
    /// With `wait = Some(d)` the lock is polled non-blockingly until the
    /// deadline, then fails with [`FsError::LockTimeout`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, the wait times out,
    /// or the lock syscall fails.
    pub fn exclusive(path: &Path, wait: Option<Duration>) -> Result<Self> {
        Self::acquire(path, wait, true)
    }

    /// Acquire a shared lock on `path`, creating the file if needed.
    ///
    /// Shared holders exclude exclusive holders but not each other, so
    /// concurrent reads proceed in parallel.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, the wait times out,
    /// or the lock syscall fails.
    pub fn shared(path: &Path, wait: Option<Duration>) -> Result<Self> {
        Self::acquire(path, wait, false)
    }

    fn acquire(path: &Path, wait: Option<Duration>, exclusive: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        // Fully-qualified trait calls: std's own File locking methods
        // (stable since 1.89) share names with fs2's and return a
        // different error type.
        match wait {
            None => {
                if exclusive {
                    FileExt::lock_exclusive(&file)?;
                } else {
                    FileExt::lock_shared(&file)?;
                }
            }
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    let attempt = if exclusive {
                        FileExt::try_lock_exclusive(&file)
                    } else {
                        FileExt::try_lock_shared(&file)
                    };
                    match attempt {
                        Ok(()) => break,
                        Err(e) if is_contended(&e) => {
                            if Instant::now() >= deadline {
                                return Err(FsError::LockTimeout(path.to_path_buf()));
                            }
                            std::thread::sleep(RETRY_INTERVAL);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            remove_on_drop: false,
        })
    }

    /// Unlink the lock file when this guard drops.
    ///
    /// Used for delete paths, where the sidecar has no issue left to guard.
    pub fn set_remove_on_drop(&mut self, remove: bool) {
        self.remove_on_drop = remove;
    }

    /// The path of the locked file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The locked descriptor.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Mutable access to the locked descriptor, for in-place rewrites.
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        if self.remove_on_drop {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Whether an IO error means "lock held by someone else".
fn is_contended(e: &std::io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Remove sidecar lock files in `dir` that have no live holder.
///
/// A sidecar is stale when a non-blocking exclusive acquisition succeeds:
/// flocks die with their holder, so success proves the original process is
/// gone. Held locks are left alone. Returns the number of files removed.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn sweep_stale_locks(dir: &Path) -> Result<usize> {
    let mut removed = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".lock") {
            continue;
        }

        let Ok(file) = File::open(entry.path()) else {
            continue;
        };
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                drop(file);
                if fs::remove_file(entry.path()).is_ok() {
                    removed += 1;
                    tracing::debug!(path = %entry.path().display(), "removed stale sidecar lock");
                }
            }
            Err(_) => {
                // Live holder; leave it.
            }
        }
    }

    Ok(removed)
}
