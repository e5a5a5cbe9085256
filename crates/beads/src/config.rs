//! Store configuration.
//!
//! Configuration lives in `.beads/config.yaml` next to the issue
//! directories: the issue ID prefix, the hierarchy depth bound, and an
//! optional bounded wait for lock acquisition (unbounded by default).

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default issue prefix if none specified.
pub const DEFAULT_PREFIX: &str = "bd";

/// Name of the beads store directory.
pub const BEADS_DIR_NAME: &str = ".beads";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Default maximum hierarchy depth (dot-segments past the root).
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Minimum prefix length.
pub const MIN_PREFIX_LENGTH: usize = 2;

/// Maximum prefix length.
pub const MAX_PREFIX_LENGTH: usize = 20;

/// Maximum directory depth to traverse when searching for a store root.
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

const fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// Configuration file structure for a beads store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Issue ID prefix (e.g., "bd" for "bd-a3f8").
    #[serde(rename = "issue-prefix")]
    pub issue_prefix: String,

    /// Maximum hierarchy depth for child IDs.
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: usize,

    /// Bounded wait for lock acquisition, in milliseconds. Absent means
    /// wait indefinitely.
    #[serde(rename = "lock-timeout-ms", default, skip_serializing_if = "Option::is_none")]
    pub lock_timeout_ms: Option<u64>,
}

impl StoreConfig {
    /// Create a new configuration with the given prefix.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            issue_prefix: prefix.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            lock_timeout_ms: None,
        }
    }

    /// The lock wait bound as a [`Duration`], if configured.
    #[must_use]
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::Parse {
                path: path.display().to_string(),
                source: e,
            }
            .into()
        })
    }

    /// Save configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(ConfigError::Yaml)?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

/// Validate issue ID prefix format.
///
/// Requirements: 2-20 characters, alphanumeric only. Expects pre-trimmed
/// input.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPrefix`] describing the violation.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.len() < MIN_PREFIX_LENGTH {
        return Err(ConfigError::InvalidPrefix(format!(
            "must be at least {MIN_PREFIX_LENGTH} characters"
        ))
        .into());
    }

    if prefix.len() > MAX_PREFIX_LENGTH {
        return Err(ConfigError::InvalidPrefix(format!(
            "cannot exceed {MAX_PREFIX_LENGTH} characters"
        ))
        .into());
    }

    if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(
            ConfigError::InvalidPrefix("must contain only alphanumeric characters".to_string())
                .into(),
        );
    }

    Ok(())
}

/// Find the store root by searching up the directory tree.
///
/// Returns the directory *containing* `.beads/`, or `None` if no store is
/// found within the traversal depth limit.
#[must_use]
pub fn find_beads_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    let mut traversed = 0;

    loop {
        if current.join(BEADS_DIR_NAME).is_dir() {
            return Some(current);
        }

        traversed += 1;
        if traversed > MAX_TRAVERSAL_DEPTH || !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    // ========== Prefix Validation Tests ==========

    #[rstest]
    #[case::valid_short("bd")]
    #[case::valid_medium("proj")]
    #[case::valid_alphanumeric("test123")]
    #[case::valid_uppercase("PROJ")]
    #[case::valid_max_length("a1b2c3d4e5f6g7h8i9j0")]
    fn validate_prefix_valid(#[case] prefix: &str) {
        assert!(validate_prefix(prefix).is_ok());
    }

    #[rstest]
    #[case::too_short("a", "at least 2")]
    #[case::empty("", "at least 2")]
    #[case::too_long("a".repeat(21), "cannot exceed 20")]
    #[case::hyphen("bd-x", "alphanumeric")]
    #[case::underscore("bd_x", "alphanumeric")]
    #[case::dot("bd.x", "alphanumeric")]
    fn validate_prefix_invalid(#[case] prefix: impl AsRef<str>, #[case] expected_error: &str) {
        let result = validate_prefix(prefix.as_ref());
        let err_msg = result.unwrap_err().to_string().to_lowercase();
        assert!(
            err_msg.contains(&expected_error.to_lowercase()),
            "expected '{expected_error}' in '{err_msg}'"
        );
    }

    // ========== StoreConfig Tests ==========

    #[test]
    fn config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.issue_prefix, DEFAULT_PREFIX);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert!(config.lock_timeout().is_none());
    }

    #[test]
    fn config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");

        let mut original = StoreConfig::new("test123");
        original.lock_timeout_ms = Some(2500);
        original.save(&path).unwrap();

        let loaded = StoreConfig::load(&path).unwrap();
        assert_eq!(original, loaded);
        assert_eq!(loaded.lock_timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn config_yaml_field_names() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");

        StoreConfig::new("myproj").save(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();

        assert!(content.contains("issue-prefix: myproj"));
        assert!(content.contains("max-depth: 3"));
        assert!(!content.contains("lock-timeout-ms"));
    }

    #[test]
    fn config_load_defaults_missing_depth() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "issue-prefix: bd\n").unwrap();

        let loaded = StoreConfig::load(&path).unwrap();
        assert_eq!(loaded.max_depth, DEFAULT_MAX_DEPTH);
    }

    // ========== Root Discovery Tests ==========

    #[test]
    fn find_root_in_current_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join(BEADS_DIR_NAME)).unwrap();

        let found = find_beads_root(temp_dir.path());
        assert_eq!(found, Some(temp_dir.path().to_path_buf()));
    }

    #[test]
    fn find_root_from_subdirectory() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join(BEADS_DIR_NAME)).unwrap();
        let sub = temp_dir.path().join("src").join("nested");
        fs::create_dir_all(&sub).unwrap();

        let found = find_beads_root(&sub);
        assert_eq!(found, Some(temp_dir.path().to_path_buf()));
    }

    #[test]
    fn find_root_not_found() {
        let temp_dir = TempDir::new().unwrap();
        assert!(find_beads_root(temp_dir.path()).is_none());
    }
}
