//! The filesystem-backed issue store.
//!
//! A [`Store`] is rooted at a `.beads/` directory holding four lifecycle
//! sections (`open/`, `closed/`, `deleted/`, `ephemeral/`) with one JSON
//! file per issue. All synchronization is advisory file locking, so any
//! number of OS processes can share a root; there are no in-process caches
//! and no state survives an operation.
//!
//! # Locking protocol
//!
//! Every mutation takes the issue's **sidecar lock** (`open/<id>.lock`)
//! first; sidecars serialize mutators and survive the primary file moving
//! between sections. In-place rewrites additionally hold an exclusive flock
//! on the JSON file itself, which is what keeps shared-lock readers from
//! observing a half-truncated file. Multi-issue mutations sort the ids
//! lexicographically, acquire sidecars in that order, and release in
//! reverse, which rules out deadlock between overlapping lock sets.

pub mod doctor;
pub mod paths;
mod relations;

pub use doctor::{Problem, ProblemKind};

use crate::cancel::CancelToken;
use crate::config::{StoreConfig, CONFIG_FILE_NAME};
use crate::domain::{Comment, Issue, IssueFilter, NewIssue, Status};
use crate::error::{ConfigError, Error, Result};
use crate::id;
use beads_fs::FileLock;
use chrono::Utc;
use paths::{IssueFileRef, Section};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// A handle on a store root.
///
/// Cheap to construct; holds no file descriptors between operations.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    config: StoreConfig,
    cancel: CancelToken,
}

/// A set of sidecar locks held for one multi-issue mutation.
///
/// Locks were acquired in sorted order; dropping the set releases them in
/// reverse.
pub(crate) struct LockSet(Vec<FileLock>);

impl Drop for LockSet {
    fn drop(&mut self) {
        while let Some(lock) = self.0.pop() {
            drop(lock);
        }
    }
}

impl Store {
    /// Create the store directory layout at `root` and open it.
    ///
    /// Creates the four section directories and writes `config.yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AlreadyInitialized`] if a config file already
    /// exists at `root`, or an IO error if scaffolding fails.
    pub fn init(root: &Path, config: StoreConfig) -> Result<Self> {
        crate::config::validate_prefix(&config.issue_prefix)?;

        let config_path = root.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(ConfigError::AlreadyInitialized(config_path.display().to_string()).into());
        }

        for section in Section::LOOKUP_ORDER {
            fs::create_dir_all(section.dir(root))?;
        }
        config.save(&config_path)?;

        Self::open(root)
    }

    /// Open an existing store rooted at `root` (the `.beads` directory).
    ///
    /// Startup recovery runs here: crash-recovery backups are restored over
    /// their primaries in every section, and stale sidecar locks are swept
    /// from `open/`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotInitialized`] if no config file is present,
    /// or an IO error if recovery fails.
    pub fn open(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE_NAME);
        if !config_path.is_file() {
            return Err(ConfigError::NotInitialized.into());
        }
        let config = StoreConfig::load(&config_path)?;

        for section in Section::LOOKUP_ORDER {
            let dir = section.dir(root);
            fs::create_dir_all(&dir)?;
            beads_fs::restore_backups(&dir)?;
        }
        beads_fs::sweep_stale_locks(&Section::Open.dir(root))?;

        Ok(Self {
            root: root.to_path_buf(),
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Attach an ambient cancellation token.
    ///
    /// Operations check the token before every lock acquisition and fail
    /// with [`Error::Cancelled`] without filesystem side effects once it
    /// fires.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The issue ID prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.config.issue_prefix
    }

    // ========== CRUD ==========

    /// Create a new issue, minting an ID unless one was supplied.
    ///
    /// A supplied hierarchical ID is depth-checked and, once the file is
    /// reserved, the parent-child edge to the ID's parent is wired
    /// automatically (both sides plus the `parent` mirror).
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyExists`] for a supplied ID that is taken
    /// - [`Error::InvalidId`] for a malformed or over-depth supplied ID
    /// - [`Error::NotFound`] for a hierarchical ID whose parent is missing
    /// - [`Error::IdExhausted`] if 20 consecutive minted candidates collide
    pub fn create(&self, new_issue: NewIssue) -> Result<Issue> {
        self.check_cancelled()?;

        let mut issue = Issue::new(String::new(), new_issue.title);
        issue.description = new_issue.description;
        issue.status = new_issue.status.unwrap_or_default();
        issue.priority = new_issue.priority;
        issue.issue_type = new_issue.issue_type;
        issue.mol_type = new_issue.mol_type;
        issue.labels = new_issue.labels;
        issue.assignee = new_issue.assignee;
        issue.created_by = new_issue.created_by;
        issue.owner = new_issue.owner;
        issue.ephemeral = new_issue.ephemeral;
        issue.dedupe_labels();
        issue.apply_status_defaults(Status::Open);
        issue.validate()?;

        let section = Section::for_issue(issue.status, issue.ephemeral);

        match new_issue.id {
            Some(id) => self.create_with_id(issue, id, section),
            None => self.create_minted(issue, section),
        }
    }

    fn create_with_id(&self, mut issue: Issue, issue_id: String, section: Section) -> Result<Issue> {
        if !id::validate_id(&issue_id, self.prefix()) {
            return Err(Error::InvalidId(issue_id));
        }
        if id::depth(&issue_id) > self.config.max_depth {
            return Err(Error::InvalidId(format!(
                "{issue_id} exceeds maximum hierarchy depth {}",
                self.config.max_depth
            )));
        }

        let parent = id::parent_of(&issue_id).map(str::to_string);
        if let Some(parent_id) = &parent {
            if paths::find_issue_file(&self.root, parent_id).is_none() {
                return Err(Error::NotFound(parent_id.clone()));
            }
        }

        if paths::find_issue_file(&self.root, &issue_id).is_some() {
            return Err(Error::AlreadyExists(issue_id));
        }

        issue.id = issue_id.clone();
        let target = paths::issue_path(&self.root, section, &issue_id);
        match beads_fs::create_exclusive(&target, &to_json_bytes(&issue)?) {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => return Err(Error::AlreadyExists(issue_id)),
            Err(e) => return Err(e.into()),
        }

        // Wire the hierarchy for child IDs; roll the file back if the
        // parent vanished between the existence check and the lock.
        if let Some(parent_id) = parent {
            if let Err(e) = self.add_dependency(
                &issue_id,
                &parent_id,
                crate::domain::DependencyType::ParentChild,
            ) {
                let _ = fs::remove_file(&target);
                return Err(e);
            }
            return self.get(&issue_id);
        }

        Ok(issue)
    }

    fn create_minted(&self, mut issue: Issue, section: Section) -> Result<Issue> {
        let count = paths::count_issue_files(&self.root)?;
        let suffix_length = id::suffix_length_for(count);
        let creator = if issue.created_by.is_empty() {
            issue.assignee.clone()
        } else {
            issue.created_by.clone()
        };

        for attempt in 0..id::MAX_CREATE_ATTEMPTS {
            self.check_cancelled()?;

            let candidate = id::candidate(
                self.prefix(),
                &issue.title,
                &creator,
                attempt as u32,
                suffix_length,
            );
            if paths::find_issue_file(&self.root, &candidate).is_some() {
                continue;
            }

            issue.id = candidate.clone();
            let target = paths::issue_path(&self.root, section, &candidate);
            match beads_fs::create_exclusive(&target, &to_json_bytes(&issue)?) {
                Ok(()) => return Ok(issue),
                Err(e) if e.is_already_exists() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::IdExhausted(id::MAX_CREATE_ATTEMPTS))
    }

    /// Get an issue by its full ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no section holds the ID.
    pub fn get(&self, issue_id: &str) -> Result<Issue> {
        self.check_cancelled()?;
        let file = paths::find_issue_file(&self.root, issue_id)
            .ok_or_else(|| Error::NotFound(issue_id.to_string()))?;
        read_issue_at(&file.path)
    }

    /// Apply a closure to an issue and persist the result.
    ///
    /// The closure receives a mutable copy and must not call back into the
    /// store (it would self-deadlock on the sidecar). Afterwards the store
    /// applies status-transition defaults, touches `updated_at`, and writes
    /// either in place (same section, truncate-with-backup under the held
    /// flock) or into the section the new state maps to (rename-write, old
    /// file unlinked).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the issue does not exist, or a
    /// validation error if the closure left the issue unwritable.
    pub fn modify(&self, issue_id: &str, f: impl FnOnce(&mut Issue)) -> Result<Issue> {
        self.modify_with(issue_id, |issue| {
            f(issue);
            Ok(())
        })
    }

    /// Fallible-closure variant of [`Store::modify`]; the store's own
    /// status-transition conveniences are built on this.
    pub(crate) fn modify_with(
        &self,
        issue_id: &str,
        f: impl FnOnce(&mut Issue) -> Result<()>,
    ) -> Result<Issue> {
        self.check_cancelled()?;
        let mut sidecar = self.lock_sidecar(issue_id)?;

        let Some(file) = paths::find_issue_file(&self.root, issue_id) else {
            // Nothing to guard; do not leave a sidecar behind.
            sidecar.set_remove_on_drop(true);
            return Err(Error::NotFound(issue_id.to_string()));
        };

        let mut primary = self.lock_file_exclusive(&file.path)?;
        let mut bytes = Vec::new();
        primary.file_mut().read_to_end(&mut bytes)?;
        let issue: Issue = serde_json::from_slice(&bytes)?;

        let old_status = issue.status;
        let mut updated = issue.clone();
        f(&mut updated)?;
        updated.id = issue.id;
        updated.apply_status_defaults(old_status);
        updated.dedupe_labels();
        updated.validate()?;
        updated.updated_at = Utc::now();

        let new_section = Section::for_issue(updated.status, updated.ephemeral);
        let payload = to_json_bytes(&updated)?;

        if new_section == file.section {
            beads_fs::write_in_place(primary.file_mut(), &file.path, &payload)?;
        } else {
            let new_path = paths::issue_path(&self.root, new_section, issue_id);
            beads_fs::write_atomic(&new_path, &payload)?;
            fs::remove_file(&file.path)?;
        }

        drop(primary);
        drop(sidecar);
        Ok(updated)
    }

    /// Hard-delete an issue: remove its file and its sidecar lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the issue does not exist.
    pub fn delete(&self, issue_id: &str) -> Result<()> {
        self.check_cancelled()?;
        let mut sidecar = self.lock_sidecar(issue_id)?;
        sidecar.set_remove_on_drop(true);

        let file = paths::find_issue_file(&self.root, issue_id)
            .ok_or_else(|| Error::NotFound(issue_id.to_string()))?;
        fs::remove_file(&file.path)?;
        Ok(())
    }

    /// List issues matching `filter`, sorted by creation time ascending.
    ///
    /// The status filter picks the directories scanned: `closed` scans
    /// `closed/`, `tombstone` scans `deleted/`, anything else scans `open/`
    /// plus `ephemeral/`. All other predicates are applied in-process.
    /// Unparseable files are skipped with a warning; `doctor` reports them.
    ///
    /// # Errors
    ///
    /// Returns an error if a section directory cannot be read.
    pub fn list(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.check_cancelled()?;

        let sections: &[Section] = match filter.status {
            Some(Status::Closed) => &[Section::Closed],
            Some(Status::Tombstone) => &[Section::Deleted],
            _ => &[Section::Open, Section::Ephemeral],
        };

        let mut issues = Vec::new();
        for &section in sections {
            for file in paths::scan_section(&self.root, section)? {
                match read_issue_at(&file.path) {
                    Ok(issue) => {
                        if filter.matches(&issue) {
                            issues.push(issue);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(path = %file.path.display(), error = %e, "skipping unreadable issue file");
                    }
                }
            }
        }

        issues.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(issues)
    }

    /// All issue IDs currently on disk, across every section.
    ///
    /// The CLI's unique-prefix resolution is built on this; the store
    /// itself only ever accepts full IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if a section directory cannot be read.
    pub fn ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for section in Section::LOOKUP_ORDER {
            for file in paths::scan_section(&self.root, section)? {
                ids.push(file.id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    // ========== Hierarchy ==========

    /// The next unallocated child ID for `parent` (`<parent>.<max+1>`).
    ///
    /// The returned ID is *not* reserved; creation resolves races through
    /// its exclusive-create open, and the caller retries on
    /// [`Error::AlreadyExists`].
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the parent does not exist
    /// - [`Error::MaxDepthExceeded`] if the parent is already at the depth
    ///   limit
    pub fn next_child_id(&self, parent_id: &str) -> Result<String> {
        self.check_cancelled()?;

        if paths::find_issue_file(&self.root, parent_id).is_none() {
            return Err(Error::NotFound(parent_id.to_string()));
        }
        if id::depth(parent_id) >= self.config.max_depth {
            return Err(Error::MaxDepthExceeded {
                id: parent_id.to_string(),
                max: self.config.max_depth,
            });
        }

        let mut max_child = 0u64;
        for section in Section::LOOKUP_ORDER {
            for file in paths::scan_section(&self.root, section)? {
                if let Some(n) = id::direct_child_number(parent_id, &file.id) {
                    max_child = max_child.max(n);
                }
            }
        }

        Ok(id::child_id(parent_id, max_child + 1))
    }

    // ========== Status transitions ==========

    /// Close an issue, recording an optional reason.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the issue does not exist.
    pub fn close(&self, issue_id: &str, reason: Option<&str>) -> Result<Issue> {
        self.modify_with(issue_id, |issue| {
            issue.status = Status::Closed;
            if let Some(reason) = reason {
                if !reason.is_empty() {
                    issue.close_reason = Some(reason.to_string());
                }
            }
            Ok(())
        })
    }

    /// Reopen a closed or tombstoned issue.
    ///
    /// Clears the closure fields; reopening a tombstone additionally
    /// restores the pre-tombstone type and clears the tombstone fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the issue does not exist, or a
    /// validation error if it is neither closed nor tombstoned.
    pub fn reopen(&self, issue_id: &str) -> Result<Issue> {
        self.modify_with(issue_id, |issue| {
            match issue.status {
                Status::Closed => {}
                Status::Tombstone => {
                    if let Some(original) = issue.original_type.take() {
                        issue.issue_type = original;
                    }
                    issue.deleted_at = None;
                    issue.deleted_by = None;
                    issue.delete_reason = None;
                    issue.closed_at = None;
                    issue.close_reason = None;
                }
                other => {
                    return Err(Error::Validation(format!(
                        "cannot reopen issue in status '{other}'"
                    )));
                }
            }
            issue.status = Status::Open;
            Ok(())
        })
    }

    /// Soft-delete an issue into a tombstone.
    ///
    /// Preserves the pre-tombstone type in `original_type`, stamps the
    /// tombstone fields, clears `closed_at`, and relocates the file to
    /// `deleted/`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the issue does not exist
    /// - [`Error::AlreadyTombstoned`] if it is already a tombstone
    pub fn create_tombstone(&self, issue_id: &str, actor: &str, reason: &str) -> Result<Issue> {
        self.modify_with(issue_id, |issue| {
            if issue.status == Status::Tombstone {
                return Err(Error::AlreadyTombstoned(issue.id.clone()));
            }
            issue.original_type = Some(issue.issue_type);
            issue.status = Status::Tombstone;
            issue.deleted_at = Some(Utc::now());
            issue.deleted_by = Some(actor.to_string());
            issue.delete_reason = Some(reason.to_string());
            issue.closed_at = None;
            issue.close_reason = None;
            Ok(())
        })
    }

    // ========== Comments ==========

    /// Append a comment, assigning the next monotonic comment id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the issue does not exist.
    pub fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        let updated = self.modify_with(issue_id, |issue| {
            let comment = Comment {
                id: issue.next_comment_id(),
                author: author.to_string(),
                text: text.to_string(),
                created_at: Utc::now(),
            };
            issue.comments.push(comment);
            Ok(())
        })?;

        // modify_with persisted it; the appended entry is the last one.
        updated
            .comments
            .last()
            .cloned()
            .ok_or_else(|| Error::Validation("comment append failed".to_string()))
    }

    // ========== Internals shared with relations/doctor ==========

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Acquire the sidecar lock for one issue.
    pub(crate) fn lock_sidecar(&self, issue_id: &str) -> Result<FileLock> {
        self.check_cancelled()?;
        let path = paths::sidecar_lock_path(&self.root, issue_id);
        Ok(FileLock::exclusive(&path, self.config.lock_timeout())?)
    }

    /// Acquire sidecar locks for several issues in sorted order.
    ///
    /// Returns a [`LockSet`] that releases in reverse order on drop. The
    /// deterministic ordering is what makes overlapping multi-issue
    /// mutations deadlock-free.
    pub(crate) fn lock_issue_set(&self, issue_ids: &[&str]) -> Result<LockSet> {
        let mut ids = issue_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut locks = Vec::with_capacity(ids.len());
        for issue_id in ids {
            locks.push(self.lock_sidecar(issue_id)?);
        }
        Ok(LockSet(locks))
    }

    fn lock_file_exclusive(&self, path: &Path) -> Result<FileLock> {
        Ok(FileLock::exclusive(path, self.config.lock_timeout())?)
    }

    /// Read an issue that must exist, returning its file location too.
    pub(crate) fn read_required(&self, issue_id: &str) -> Result<(Issue, IssueFileRef)> {
        let file = paths::find_issue_file(&self.root, issue_id)
            .ok_or_else(|| Error::NotFound(issue_id.to_string()))?;
        Ok((read_issue_at(&file.path)?, file))
    }

    /// Rewrite an issue's existing file in place, under its file flock.
    ///
    /// The caller must already hold the issue's sidecar; the section is
    /// assumed unchanged (relationship mutations never move files).
    pub(crate) fn write_issue_in_place(&self, issue: &Issue) -> Result<()> {
        let file = paths::find_issue_file(&self.root, &issue.id)
            .ok_or_else(|| Error::NotFound(issue.id.clone()))?;
        let mut primary = self.lock_file_exclusive(&file.path)?;
        beads_fs::write_in_place(primary.file_mut(), &file.path, &to_json_bytes(issue)?)?;
        Ok(())
    }
}

/// Serialize an issue the way every write path does: pretty-printed JSON
/// with a trailing newline, so files diff cleanly under git.
pub(crate) fn to_json_bytes(issue: &Issue) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(issue)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse one issue file under a shared flock.
pub(crate) fn read_issue_at(path: &Path) -> Result<Issue> {
    let bytes = beads_fs::read_locked(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
