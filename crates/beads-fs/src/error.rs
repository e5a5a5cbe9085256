//! Error types for filesystem primitives.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The error type for beads-fs operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A bounded-wait lock acquisition ran out of time.
    #[error("Timed out waiting for lock on {}", .0.display())]
    LockTimeout(PathBuf),
}

impl FsError {
    /// Whether this error is an `AlreadyExists` IO error.
    ///
    /// Used by callers of [`crate::create_exclusive`] to distinguish an ID
    /// collision from a real failure.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::AlreadyExists)
    }
}

/// A specialized Result type for beads-fs operations.
pub type Result<T> = std::result::Result<T, FsError>;
