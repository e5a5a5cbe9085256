//! Error types for beads store operations.

use crate::domain::DependencyType;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No beads store found in directory tree.
    #[error("Not a beads repository (or any of the parent directories). Run 'bd init' to create a new store.")]
    NotInitialized,

    /// Beads is already initialized in the target directory.
    #[error("Beads is already initialized in this directory. Found existing '{0}'")]
    AlreadyInitialized(String),

    /// Invalid issue ID prefix format.
    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Failed to parse the YAML config file.
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        /// Path to the config file that failed to parse.
        path: String,
        /// The underlying YAML parse error.
        source: serde_yaml::Error,
    },

    /// YAML serialization error.
    #[error("YAML serialization error")]
    Yaml(#[source] serde_yaml::Error),
}

/// The error type for beads store operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Issue not found.
    #[error("Issue not found: {0}")]
    NotFound(String),

    /// Issue already exists.
    #[error("Issue already exists: {0}")]
    AlreadyExists(String),

    /// Invalid issue ID format.
    #[error("Invalid issue ID: {0}")]
    InvalidId(String),

    /// The mutation would create a same-type dependency cycle.
    #[error("Dependency cycle: {from} -> {to} would create a {dep_type} cycle")]
    Cycle {
        /// The issue the edge starts from.
        from: String,
        /// The issue the edge points at.
        to: String,
        /// The dependency type the cycle was detected on.
        dep_type: DependencyType,
    },

    /// A hierarchical ID would exceed the configured depth bound.
    #[error("Maximum hierarchy depth exceeded for {id} (max {max})")]
    MaxDepthExceeded {
        /// The parent that is already at the limit.
        id: String,
        /// The configured maximum depth.
        max: usize,
    },

    /// The issue is already a tombstone.
    #[error("Issue already tombstoned: {0}")]
    AlreadyTombstoned(String),

    /// A bounded-wait lock acquisition ran out of time.
    #[error("Timed out waiting for lock on {}", .0.display())]
    LockTimeout(PathBuf),

    /// The ambient cancellation token fired before the operation locked.
    #[error("Operation cancelled")]
    Cancelled,

    /// Ran out of ID candidates; statistically impossible at a sane suffix
    /// length, so it signals a store-wide problem.
    #[error("Unable to reserve a unique issue ID after {0} attempts")]
    IdExhausted(usize),

    /// Issue data failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<beads_fs::FsError> for Error {
    fn from(e: beads_fs::FsError) -> Self {
        match e {
            beads_fs::FsError::Io(io) => Self::Io(io),
            beads_fs::FsError::LockTimeout(path) => Self::LockTimeout(path),
        }
    }
}

/// A specialized Result type for beads operations.
pub type Result<T> = std::result::Result<T, Error>;
