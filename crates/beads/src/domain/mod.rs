//! Domain types for the beads issue store.
//!
//! This module defines the persistent entity and its satellite types:
//! - [`Issue`] - the sole persistent entity, one JSON file each
//! - [`Status`] - lifecycle states
//! - [`Priority`] - urgency 0-4, with legacy word-form parsing
//! - [`IssueType`] / [`DependencyType`] - closed type sets
//! - [`DepRef`] - one side of a two-sided relationship edge
//! - [`Comment`] - issue comments with per-issue monotonic ids
//!
//! Serialization keeps stable field names and omits empty collections and
//! default scalars; deserialization accepts absent fields as zero values so
//! hand-edited or older files stay readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Maximum length for issue titles.
pub const MAX_TITLE_LENGTH: usize = 500;

/// Issue lifecycle status.
///
/// The status (together with the ephemeral flag) decides which store
/// directory the issue's file lives in; see [`crate::store::paths`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Ready to work on.
    #[default]
    Open,

    /// Currently being worked on.
    InProgress,

    /// Blocked by dependencies.
    Blocked,

    /// Intentionally parked.
    Deferred,

    /// Waiting on an external hook.
    Hooked,

    /// Pinned; excluded from normal scheduling.
    Pinned,

    /// Completed.
    Closed,

    /// Soft-deleted; metadata retained for audit and recovery.
    Tombstone,
}

impl Status {
    /// Stable string form, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Deferred => "deferred",
            Self::Hooked => "hooked",
            Self::Pinned => "pinned",
            Self::Closed => "closed",
            Self::Tombstone => "tombstone",
        }
    }

    /// Whether the status ends the issue's live lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Tombstone)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "in_progress" | "inprogress" | "in-progress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "deferred" => Ok(Self::Deferred),
            "hooked" => Ok(Self::Hooked),
            "pinned" => Ok(Self::Pinned),
            "closed" => Ok(Self::Closed),
            "tombstone" => Ok(Self::Tombstone),
            other => Err(Error::Validation(format!("unknown status '{other}'"))),
        }
    }
}

/// Issue priority (0 = most urgent, 4 = backlog).
///
/// Persisted as a bare integer. Deserialization additionally accepts the
/// legacy word forms (`critical`/`high`/`medium`/`low`/`backlog`) and
/// `P<n>` strings that older exports carried.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    /// P0.
    pub const CRITICAL: Self = Self(0);
    /// P1.
    pub const HIGH: Self = Self(1);
    /// P2.
    pub const MEDIUM: Self = Self(2);
    /// P3.
    pub const LOW: Self = Self(3);
    /// P4.
    pub const BACKLOG: Self = Self(4);

    /// Whether the value is inside the persisted 0-4 range.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0 && self.0 <= 4
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "critical" => return Ok(Self::CRITICAL),
            "high" => return Ok(Self::HIGH),
            "medium" => return Ok(Self::MEDIUM),
            "low" => return Ok(Self::LOW),
            "backlog" => return Ok(Self::BACKLOG),
            _ => {}
        }

        let digits = normalized.strip_prefix('p').unwrap_or(&normalized);
        match digits.parse::<i32>() {
            Ok(p) if (0..=4).contains(&p) => Ok(Self(p)),
            _ => Err(Error::Validation(format!("invalid priority '{s}'"))),
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = Priority;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer 0-4 or a legacy priority word")
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Priority, E> {
                i32::try_from(v)
                    .map(Priority)
                    .map_err(|_| E::custom(format!("priority out of range: {v}")))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Priority, E> {
                i32::try_from(v)
                    .map(Priority)
                    .map_err(|_| E::custom(format!("priority out of range: {v}")))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Priority, E> {
                Priority::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// Issue type category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// General task.
    #[default]
    Task,

    /// Bug fix.
    Bug,

    /// New feature.
    Feature,

    /// Epic (parent issue).
    Epic,

    /// Maintenance/chore.
    Chore,

    /// Blocking checkpoint.
    Gate,

    /// Composite workflow unit.
    Molecule,
}

impl IssueType {
    /// Stable string form, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Epic => "epic",
            Self::Chore => "chore",
            Self::Gate => "gate",
            Self::Molecule => "molecule",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "epic" => Ok(Self::Epic),
            "chore" => Ok(Self::Chore),
            "gate" => Ok(Self::Gate),
            "molecule" => Ok(Self::Molecule),
            other => Err(Error::Validation(format!("unknown issue type '{other}'"))),
        }
    }
}

/// Type of dependency relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyType {
    /// Hard blocker - prevents work.
    Blocks,

    /// Tracking link to an umbrella issue.
    Tracks,

    /// Soft link - informational.
    Related,

    /// Hierarchical - epic to task.
    ParentChild,

    /// Found during work on the target.
    DiscoveredFrom,

    /// Holds the source open until the target resolves.
    Until,

    /// The target caused the source.
    CausedBy,

    /// The source validates the target.
    Validates,

    /// Generic association.
    RelatesTo,

    /// The source supersedes the target.
    Supersedes,
}

impl DependencyType {
    /// Stable string form, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Tracks => "tracks",
            Self::Related => "related",
            Self::ParentChild => "parent-child",
            Self::DiscoveredFrom => "discovered-from",
            Self::Until => "until",
            Self::CausedBy => "caused-by",
            Self::Validates => "validates",
            Self::RelatesTo => "relates-to",
            Self::Supersedes => "supersedes",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocks" => Ok(Self::Blocks),
            "tracks" => Ok(Self::Tracks),
            "related" => Ok(Self::Related),
            "parent-child" | "parent_child" => Ok(Self::ParentChild),
            "discovered-from" | "discovered_from" => Ok(Self::DiscoveredFrom),
            "until" => Ok(Self::Until),
            "caused-by" | "caused_by" => Ok(Self::CausedBy),
            "validates" => Ok(Self::Validates),
            "relates-to" | "relates_to" => Ok(Self::RelatesTo),
            "supersedes" => Ok(Self::Supersedes),
            other => Err(Error::Validation(format!(
                "unknown dependency type '{other}'"
            ))),
        }
    }
}

/// One side of a relationship edge.
///
/// An edge `A --T--> B` is recorded twice: `{B, T}` in `A.dependencies` and
/// `{A, T}` in `B.dependents`. Keeping both sides consistent is the store's
/// central invariant; the doctor repairs any asymmetry a crash leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepRef {
    /// The issue on the other end of the edge.
    pub id: String,

    /// Type of the relationship.
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
}

impl DepRef {
    /// Convenience constructor.
    #[must_use]
    pub fn new(id: impl Into<String>, dep_type: DependencyType) -> Self {
        Self {
            id: id.into(),
            dep_type,
        }
    }
}

/// A comment on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Monotonic id, unique within the issue.
    pub id: i64,

    /// Comment author.
    pub author: String,

    /// Comment body.
    pub text: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// The sole persistent entity: one JSON file per issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique ID: `<prefix>-<suffix>` or a hierarchical `<root>.N[.N...]`.
    pub id: String,

    /// Issue title.
    pub title: String,

    /// Detailed description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Workflow status.
    #[serde(default)]
    pub status: Status,

    /// Priority (0 = most urgent, 4 = backlog).
    #[serde(default)]
    pub priority: Priority,

    /// Issue type.
    #[serde(rename = "type", default)]
    pub issue_type: IssueType,

    /// Molecule subtype; absent and `"work"` mean the default bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mol_type: Option<String>,

    /// Parent issue id; convenience mirror of the parent-child dependency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Issues this one depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DepRef>,

    /// Issues that depend on this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<DepRef>,

    /// Ordered label set (no duplicates).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    /// Assigned user.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub assignee: String,

    /// Creator.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,

    /// Owner.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,

    /// Excluded from export/sync; hard-deleted rather than tombstoned.
    #[serde(default, skip_serializing_if = "is_false")]
    pub ephemeral: bool,

    /// Comments, in creation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,

    /// Creation timestamp.
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,

    /// Last update timestamp; touched on every write.
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,

    /// Closure timestamp; null while tombstoned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Reason recorded at closure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,

    /// Tombstone: soft-deletion timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    /// Tombstone: actor who soft-deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,

    /// Tombstone: reason for soft-deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_reason: Option<String>,

    /// Tombstone: the type the issue had before soft-deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_type: Option<IssueType>,
}

impl Issue {
    /// Create a bare issue with the given id and title; all other fields at
    /// their zero values, timestamps at `now`.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: Status::default(),
            priority: Priority::default(),
            issue_type: IssueType::default(),
            mol_type: None,
            parent: None,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            labels: Vec::new(),
            assignee: String::new(),
            created_by: String::new(),
            owner: String::new(),
            ephemeral: false,
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            close_reason: None,
            deleted_at: None,
            deleted_by: None,
            delete_reason: None,
            original_type: None,
        }
    }

    /// Whether `dependencies` contains an entry for `id` (any type).
    #[must_use]
    pub fn has_dependency(&self, id: &str) -> bool {
        self.dependencies.iter().any(|d| d.id == id)
    }

    /// Whether `dependents` contains an entry for `id` (any type).
    #[must_use]
    pub fn has_dependent(&self, id: &str) -> bool {
        self.dependents.iter().any(|d| d.id == id)
    }

    /// Ids of children: dependents filtered to parent-child edges.
    #[must_use]
    pub fn children(&self) -> Vec<&str> {
        self.dependents
            .iter()
            .filter(|d| d.dep_type == DependencyType::ParentChild)
            .map(|d| d.id.as_str())
            .collect()
    }

    /// Dependency ids, optionally restricted to one type.
    #[must_use]
    pub fn dependency_ids(&self, dep_type: Option<DependencyType>) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|d| dep_type.is_none_or(|t| d.dep_type == t))
            .map(|d| d.id.as_str())
            .collect()
    }

    /// Dependent ids, optionally restricted to one type.
    #[must_use]
    pub fn dependent_ids(&self, dep_type: Option<DependencyType>) -> Vec<&str> {
        self.dependents
            .iter()
            .filter(|d| dep_type.is_none_or(|t| d.dep_type == t))
            .map(|d| d.id.as_str())
            .collect()
    }

    /// The next monotonic comment id for this issue.
    #[must_use]
    pub fn next_comment_id(&self) -> i64 {
        self.comments.iter().map(|c| c.id).max().unwrap_or(0) + 1
    }

    /// Drop duplicate labels, keeping first occurrences in order.
    pub fn dedupe_labels(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.labels.retain(|l| seen.insert(l.clone()));
    }

    /// Manage the implicit closure fields across a status transition.
    ///
    /// Entering `closed` stamps `closed_at` and defaults `close_reason` to
    /// `"Closed"`; leaving `closed` clears both. This is the only place
    /// those fields are touched implicitly.
    pub fn apply_status_defaults(&mut self, old: Status) {
        if self.status == Status::Closed && old != Status::Closed {
            if self.closed_at.is_none() {
                self.closed_at = Some(Utc::now());
            }
            if self.close_reason.as_deref().unwrap_or("").is_empty() {
                self.close_reason = Some("Closed".to_string());
            }
        } else if self.status != Status::Closed && old == Status::Closed {
            self.closed_at = None;
            self.close_reason = None;
        }
    }

    /// Validate the fields a write must not persist malformed.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty or over-long title or an
    /// out-of-range priority.
    pub fn validate(&self) -> crate::error::Result<()> {
        let trimmed = self.title.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("Title cannot be empty".to_string()));
        }
        if trimmed.len() > MAX_TITLE_LENGTH {
            return Err(Error::Validation(format!(
                "Title cannot exceed {MAX_TITLE_LENGTH} characters (got {})",
                trimmed.len()
            )));
        }
        if !self.priority.is_valid() {
            return Err(Error::Validation(format!(
                "Priority must be in range 0-4 (got {})",
                self.priority.0
            )));
        }
        Ok(())
    }
}

/// Data for creating a new issue.
#[derive(Debug, Clone)]
pub struct NewIssue {
    /// Explicit id; minted when `None`. A hierarchical id wires the
    /// parent-child edge to its parent automatically.
    pub id: Option<String>,

    /// Issue title.
    pub title: String,

    /// Issue description.
    pub description: String,

    /// Initial status (defaults to open).
    pub status: Option<Status>,

    /// Priority (0-4).
    pub priority: Priority,

    /// Issue type.
    pub issue_type: IssueType,

    /// Molecule subtype.
    pub mol_type: Option<String>,

    /// Labels.
    pub labels: Vec<String>,

    /// Assignee.
    pub assignee: String,

    /// Creator.
    pub created_by: String,

    /// Owner.
    pub owner: String,

    /// Ephemeral flag.
    pub ephemeral: bool,
}

impl Default for NewIssue {
    fn default() -> Self {
        Self {
            id: None,
            title: "Untitled Issue".to_string(),
            description: String::new(),
            status: None,
            priority: Priority::MEDIUM,
            issue_type: IssueType::Task,
            mol_type: None,
            labels: vec![],
            assignee: String::new(),
            created_by: String::new(),
            owner: String::new(),
            ephemeral: false,
        }
    }
}

/// Filter for querying issues.
///
/// The status filter decides which store directories are scanned; every
/// other predicate is applied in-process.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    /// Filter by status.
    pub status: Option<Status>,

    /// Filter by priority.
    pub priority: Option<Priority>,

    /// Filter by issue type.
    pub issue_type: Option<IssueType>,

    /// Filter by parent id; `Some("")` selects root issues only.
    pub parent: Option<String>,

    /// Filter by assignee.
    pub assignee: Option<String>,

    /// Required labels (subset match).
    pub labels: Vec<String>,

    /// Filter by molecule subtype; `""` and `"work"` are aliases for the
    /// default bucket.
    pub mol_type: Option<String>,
}

impl IssueFilter {
    /// Whether `issue` satisfies every in-process predicate.
    ///
    /// Directory selection (the status dimension) happens before files are
    /// read, but the status equality itself is still enforced here because
    /// `open/` holds several live statuses.
    #[must_use]
    pub fn matches(&self, issue: &Issue) -> bool {
        if let Some(status) = self.status {
            if issue.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if issue.priority != priority {
                return false;
            }
        }
        if let Some(issue_type) = self.issue_type {
            if issue.issue_type != issue_type {
                return false;
            }
        }
        if let Some(parent) = &self.parent {
            if parent.is_empty() {
                if issue.parent.is_some() {
                    return false;
                }
            } else if issue.parent.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        if let Some(assignee) = &self.assignee {
            if issue.assignee != *assignee {
                return false;
            }
        }
        if !self
            .labels
            .iter()
            .all(|l| issue.labels.iter().any(|have| have == l))
        {
            return false;
        }
        if let Some(mol_type) = &self.mol_type {
            let want_default = mol_type.is_empty() || mol_type == "work";
            let have = issue.mol_type.as_deref().unwrap_or("");
            let have_default = have.is_empty() || have == "work";
            if want_default {
                if !have_default {
                    return false;
                }
            } else if have != mol_type {
                return false;
            }
        }
        true
    }
}
