//! Path layout and directory model.
//!
//! The store root holds four sibling directories, each with one JSON file
//! per issue named `<id>.json`. The directory an issue lives in is a pure
//! function of its `(status, ephemeral)` pair ([`Section::for_issue`]), and
//! every mutation re-derives it, so location and content never drift for
//! long (the doctor repairs any crash-window divergence).
//!
//! Known-ID lookups probe the sections in a fixed order:
//! `open -> ephemeral -> closed -> deleted`.

use crate::domain::Status;
use std::fs;
use std::path::{Path, PathBuf};

/// The four lifecycle directories under a store root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// Live, non-ephemeral issues of any non-terminal status.
    Open,

    /// Closed, non-ephemeral issues.
    Closed,

    /// Tombstones (soft-deleted issues).
    Deleted,

    /// Live ephemeral issues, regardless of status.
    Ephemeral,
}

impl Section {
    /// Lookup order for a known ID: first hit wins.
    pub const LOOKUP_ORDER: [Self; 4] = [Self::Open, Self::Ephemeral, Self::Closed, Self::Deleted];

    /// The directory name under the store root.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Deleted => "deleted",
            Self::Ephemeral => "ephemeral",
        }
    }

    /// The section an issue belongs in, from its status and ephemeral flag.
    ///
    /// Tombstones always live in `deleted/`; otherwise ephemerality wins
    /// over status so ephemeral issues stay out of `open/` and `closed/`
    /// (and out of export) through their whole lifecycle.
    #[must_use]
    pub const fn for_issue(status: Status, ephemeral: bool) -> Self {
        match status {
            Status::Tombstone => Self::Deleted,
            Status::Closed if !ephemeral => Self::Closed,
            _ if ephemeral => Self::Ephemeral,
            _ => Self::Open,
        }
    }

    /// This section's directory under `root`.
    #[must_use]
    pub fn dir(self, root: &Path) -> PathBuf {
        root.join(self.dir_name())
    }
}

/// A located issue file.
#[derive(Debug, Clone)]
pub struct IssueFileRef {
    /// Which section the file was found in.
    pub section: Section,

    /// The issue id, parsed from the file name.
    pub id: String,

    /// Full path to the JSON file.
    pub path: PathBuf,
}

/// The path an issue file would have in `section`.
#[must_use]
pub fn issue_path(root: &Path, section: Section, id: &str) -> PathBuf {
    section.dir(root).join(format!("{id}.json"))
}

/// The sidecar lock path for an issue.
///
/// Sidecars always live in `open/` regardless of where the issue file
/// currently is, so a status transition never changes the lock target.
#[must_use]
pub fn sidecar_lock_path(root: &Path, id: &str) -> PathBuf {
    Section::Open.dir(root).join(format!("{id}.lock"))
}

/// Locate an issue file by ID, probing sections in lookup order.
#[must_use]
pub fn find_issue_file(root: &Path, id: &str) -> Option<IssueFileRef> {
    for section in Section::LOOKUP_ORDER {
        let path = issue_path(root, section, id);
        if path.is_file() {
            return Some(IssueFileRef {
                section,
                id: id.to_string(),
                path,
            });
        }
    }
    None
}

/// The issue id encoded by a data file name, or `None` for anything that is
/// not a data file (wrong extension, temp, lock, backup).
#[must_use]
pub fn id_from_file_name(name: &str) -> Option<&str> {
    if beads_fs::is_transient_name(name) {
        return None;
    }
    name.strip_suffix(".json").filter(|id| !id.is_empty())
}

/// List the issue files in one section, skipping transient names.
///
/// # Errors
///
/// Returns an error if the section directory cannot be read.
pub fn scan_section(root: &Path, section: Section) -> std::io::Result<Vec<IssueFileRef>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(section.dir(root))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(id) = id_from_file_name(&name) {
            files.push(IssueFileRef {
                section,
                id: id.to_string(),
                path: entry.path(),
            });
        }
    }
    Ok(files)
}

/// Count issue files across all four sections.
///
/// Feeds adaptive ID sizing; transient files are not counted.
///
/// # Errors
///
/// Returns an error if a section directory cannot be read.
pub fn count_issue_files(root: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for section in Section::LOOKUP_ORDER {
        count += scan_section(root, section)?.len();
    }
    Ok(count)
}
