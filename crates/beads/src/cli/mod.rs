//! CLI argument parsing and command dispatch.
//!
//! The `bd` binary is a thin consumer of the store's public operations:
//! it resolves unique ID prefixes to full IDs, invokes one store call, and
//! renders the result in human or JSON form.
//!
//! # Global Flags
//!
//! - `--json` (or `BD_JSON=1`): machine-readable output for all commands
//!
//! # Example
//!
//! ```bash
//! bd init --prefix proj
//! bd create "Fix the flaky lock test" -p 1 -t bug
//! bd dep add proj-a3f8 proj-b2c1 --type blocks
//! bd doctor --fix
//! ```

mod args;
mod execute;

use clap::{Parser, Subcommand};

pub use args::{
    CloseArgs, CommentArgs, CreateArgs, DeleteArgs, DepAction, DepArgs, InitArgs, ListArgs,
    NextChildArgs, ReopenArgs, ShowArgs, UpdateArgs,
};

/// Beads - a git-native issue tracker
///
/// Issues live as JSON files under `.beads/`, one file per issue, with the
/// file's directory encoding its lifecycle state.
#[derive(Parser, Debug)]
#[command(name = "bd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use
    #[arg(long, global = true, env = "BD_JSON")]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Initialize a new beads store
    ///
    /// Creates the `.beads/` directory with its four issue directories,
    /// configuration, and gitignore. Run once in your project root.
    Init(InitArgs),

    /// Create a new issue
    Create(CreateArgs),

    /// Show detailed information about an issue
    Show(ShowArgs),

    /// List issues with optional filters
    ///
    /// By default lists live issues (open and ephemeral); filter by
    /// `--status closed` or `--status tombstone` to reach the others.
    List(ListArgs),

    /// Update fields of an existing issue
    Update(UpdateArgs),

    /// Close an issue
    Close(CloseArgs),

    /// Reopen a closed or tombstoned issue
    Reopen(ReopenArgs),

    /// Delete an issue (soft by default, permanent with --hard)
    Delete(DeleteArgs),

    /// Manage dependencies between issues
    #[command(subcommand)]
    Dep(DepAction),

    /// Add a comment to an issue
    Comment(CommentArgs),

    /// Show the next child ID a parent would receive
    ChildId(NextChildArgs),

    /// Scan the store for inconsistencies
    ///
    /// Reports orphaned files, misplaced issues, broken references, and
    /// asymmetric relationships; `--fix` repairs what it safely can.
    Doctor {
        /// Apply repairs instead of only reporting
        #[arg(long)]
        fix: bool,
    },
}

impl Cli {
    /// Parse arguments from the process environment.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Execute the parsed command.
    ///
    /// # Errors
    ///
    /// Returns the store error for the CLI to map to a non-zero exit code.
    pub fn execute(self) -> crate::error::Result<()> {
        execute::run(self)
    }
}
