//! Implementation of the `init` command.
//!
//! Scaffolds a new `.beads/` store: the four section directories,
//! `config.yaml`, and a `.gitignore` that keeps transient machinery
//! (sidecar locks, crash backups, in-flight temp files) out of version
//! control while the issue JSON files themselves stay tracked.

use crate::config::{self, StoreConfig, BEADS_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_PREFIX};
use crate::error::{ConfigError, Result};
use crate::store::Store;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the gitignore file within `.beads`.
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

const GITIGNORE_CONTENT: &str = "\
# Transient store machinery; the issue JSON files should be tracked.
*.lock
*.backup
.*.tmp.*
";

/// Result of the init command.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the created store directory.
    pub beads_dir: PathBuf,

    /// Path to the created config file.
    pub config_file: PathBuf,

    /// Path to the created gitignore file.
    pub gitignore_file: PathBuf,

    /// The prefix used for issue IDs.
    pub prefix: String,
}

/// Initialize a new beads store under `base_dir`.
///
/// # Errors
///
/// Returns an error if the store already exists, the prefix is invalid, or
/// scaffolding fails.
pub fn init(base_dir: &Path, prefix: Option<&str>) -> Result<InitResult> {
    let prefix = prefix.unwrap_or(DEFAULT_PREFIX).trim();
    config::validate_prefix(prefix)?;

    let beads_dir = base_dir.join(BEADS_DIR_NAME);
    if beads_dir.exists() {
        return Err(ConfigError::AlreadyInitialized(BEADS_DIR_NAME.to_string()).into());
    }

    let store = Store::init(&beads_dir, StoreConfig::new(prefix))?;
    drop(store);

    let gitignore_file = beads_dir.join(GITIGNORE_FILE_NAME);
    fs::write(&gitignore_file, GITIGNORE_CONTENT)?;

    Ok(InitResult {
        config_file: beads_dir.join(CONFIG_FILE_NAME),
        gitignore_file,
        beads_dir,
        prefix: prefix.to_string(),
    })
}

/// Check if a directory has been initialized with beads.
#[must_use]
pub fn is_initialized(base_dir: &Path) -> bool {
    base_dir.join(BEADS_DIR_NAME).exists()
}
