//! CLI argument structs for all commands.

use crate::domain::{DependencyType, IssueType, Priority, Status};
use clap::{Parser, Subcommand};
use std::str::FromStr;

fn parse_status(s: &str) -> Result<Status, String> {
    Status::from_str(s).map_err(|e| e.to_string())
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::from_str(s).map_err(|e| e.to_string())
}

fn parse_issue_type(s: &str) -> Result<IssueType, String> {
    IssueType::from_str(s).map_err(|e| e.to_string())
}

fn parse_dep_type(s: &str) -> Result<DependencyType, String> {
    DependencyType::from_str(s).map_err(|e| e.to_string())
}

/// Arguments for the `init` command
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Issue ID prefix (e.g., "proj" for "proj-a3f8")
    ///
    /// Must be 2-20 alphanumeric characters.
    #[arg(short, long)]
    pub prefix: Option<String>,
}

/// Arguments for the `create` command
#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Issue title
    pub title: String,

    /// Detailed description
    #[arg(short = 'D', long, default_value = "")]
    pub description: String,

    /// Priority (0=critical .. 4=backlog; word forms accepted)
    #[arg(short, long, value_parser = parse_priority, default_value = "2")]
    pub priority: Priority,

    /// Issue type
    #[arg(short = 't', long = "type", value_parser = parse_issue_type, default_value = "task")]
    pub issue_type: IssueType,

    /// Molecule subtype
    #[arg(long)]
    pub mol_type: Option<String>,

    /// Labels (repeatable or comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Assignee username
    #[arg(short, long, default_value = "")]
    pub assignee: String,

    /// Creator username
    #[arg(long = "by", default_value = "")]
    pub created_by: String,

    /// Owner username
    #[arg(long, default_value = "")]
    pub owner: String,

    /// Mark the issue ephemeral (excluded from export, hard-deleted)
    #[arg(long)]
    pub ephemeral: bool,

    /// Create as a child of this issue (allocates the next child ID)
    #[arg(long, conflicts_with = "id")]
    pub parent: Option<String>,

    /// Explicit issue ID (normally minted automatically)
    #[arg(long)]
    pub id: Option<String>,
}

/// Arguments for the `show` command
#[derive(Parser, Debug, Clone)]
pub struct ShowArgs {
    /// Issue ID (unique prefixes accepted)
    pub id: String,
}

/// Arguments for the `list` command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Filter by status; `closed` and `tombstone` switch directories
    #[arg(short, long, value_parser = parse_status)]
    pub status: Option<Status>,

    /// Filter by priority
    #[arg(short, long, value_parser = parse_priority)]
    pub priority: Option<Priority>,

    /// Filter by issue type
    #[arg(short = 't', long = "type", value_parser = parse_issue_type)]
    pub issue_type: Option<IssueType>,

    /// Filter by parent issue ID
    #[arg(long, conflicts_with = "roots")]
    pub parent: Option<String>,

    /// Only root issues (no parent)
    #[arg(long)]
    pub roots: bool,

    /// Filter by assignee
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Required labels (repeatable or comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Filter by molecule subtype ("" and "work" match the default bucket)
    #[arg(long)]
    pub mol_type: Option<String>,
}

/// Arguments for the `update` command
#[derive(Parser, Debug, Clone)]
pub struct UpdateArgs {
    /// Issue ID (unique prefixes accepted)
    pub id: String,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New description
    #[arg(short = 'D', long)]
    pub description: Option<String>,

    /// New status
    #[arg(short, long, value_parser = parse_status)]
    pub status: Option<Status>,

    /// New priority
    #[arg(short, long, value_parser = parse_priority)]
    pub priority: Option<Priority>,

    /// New issue type
    #[arg(short = 't', long = "type", value_parser = parse_issue_type)]
    pub issue_type: Option<IssueType>,

    /// New assignee (empty string clears)
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// New owner (empty string clears)
    #[arg(long)]
    pub owner: Option<String>,

    /// Labels to add (repeatable or comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub add_label: Vec<String>,

    /// Labels to remove (repeatable or comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub remove_label: Vec<String>,

    /// Set or clear the ephemeral flag
    #[arg(long)]
    pub ephemeral: Option<bool>,
}

/// Arguments for the `close` command
#[derive(Parser, Debug, Clone)]
pub struct CloseArgs {
    /// Issue ID (unique prefixes accepted)
    pub id: String,

    /// Reason for closing
    #[arg(short, long)]
    pub reason: Option<String>,
}

/// Arguments for the `reopen` command
#[derive(Parser, Debug, Clone)]
pub struct ReopenArgs {
    /// Issue ID (unique prefixes accepted)
    pub id: String,
}

/// Arguments for the `delete` command
#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Issue ID (unique prefixes accepted)
    pub id: String,

    /// Remove the file permanently instead of tombstoning
    #[arg(long)]
    pub hard: bool,

    /// Actor recorded on the tombstone
    #[arg(long, default_value = "")]
    pub actor: String,

    /// Reason recorded on the tombstone
    #[arg(short, long, default_value = "")]
    pub reason: String,
}

/// Dependency subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum DepAction {
    /// Add a dependency edge: FROM depends on TO
    Add(DepArgs),

    /// Remove the edge between FROM and TO
    Remove(DepArgs),
}

/// Arguments shared by the `dep` subcommands
#[derive(Parser, Debug, Clone)]
pub struct DepArgs {
    /// The issue that has the dependency
    pub from: String,

    /// The issue being depended on
    pub to: String,

    /// Dependency type (add only)
    #[arg(short = 't', long = "type", value_parser = parse_dep_type, default_value = "blocks")]
    pub dep_type: DependencyType,
}

/// Arguments for the `comment` command
#[derive(Parser, Debug, Clone)]
pub struct CommentArgs {
    /// Issue ID (unique prefixes accepted)
    pub id: String,

    /// Comment text
    pub text: String,

    /// Comment author
    #[arg(long, default_value = "")]
    pub author: String,
}

/// Arguments for the `child-id` command
#[derive(Parser, Debug, Clone)]
pub struct NextChildArgs {
    /// Parent issue ID (unique prefixes accepted)
    pub parent: String,
}
