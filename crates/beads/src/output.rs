//! Human-facing rendering for the CLI.
//!
//! JSON output is a straight serialization of the domain types; the human
//! format is a compact table for lists and a wrapped detail view for
//! `show`, colored by status.

use crate::domain::{Issue, Status};
use crate::error::Result;
use crate::store::Problem;
use colored::Colorize;
use serde::Serialize;
use terminal_size::{terminal_size, Width};

/// Fallback width when not attached to a terminal.
const DEFAULT_WIDTH: usize = 100;

/// Print any serializable value as pretty JSON on stdout.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn output_width() -> usize {
    terminal_size().map_or(DEFAULT_WIDTH, |(Width(w), _)| usize::from(w))
}

fn colored_status(status: Status) -> colored::ColoredString {
    apply_status_color(status.as_str(), status)
}

fn apply_status_color(text: &str, status: Status) -> colored::ColoredString {
    match status {
        Status::Open => text.green(),
        Status::InProgress => text.cyan(),
        Status::Blocked => text.red(),
        Status::Deferred | Status::Hooked | Status::Pinned => text.yellow(),
        Status::Closed => text.dimmed(),
        Status::Tombstone => text.magenta().dimmed(),
    }
}

/// Print a one-line-per-issue table.
pub fn print_issue_table(issues: &[Issue]) {
    if issues.is_empty() {
        println!("No issues found.");
        return;
    }

    let id_width = issues.iter().map(|i| i.id.len()).max().unwrap_or(8);
    for issue in issues {
        let labels = if issue.labels.is_empty() {
            String::new()
        } else {
            format!(" [{}]", issue.labels.join(", ")).dimmed().to_string()
        };
        // Pad before coloring; ANSI escapes confuse width specifiers.
        let id = format!("{:<id_width$}", issue.id);
        let status = format!("{:<11}", issue.status.as_str());
        println!(
            "{}  {}  {}  {:<8}  {}{}",
            id.bold(),
            issue.priority,
            apply_status_color(&status, issue.status),
            issue.issue_type,
            issue.title,
            labels,
        );
    }
}

/// Print the full detail view of one issue.
pub fn print_issue_detail(issue: &Issue) {
    let width = output_width().min(100);

    println!("{}  {}", issue.id.bold(), issue.title);
    println!(
        "{} {}   {} {}   {} {}",
        "status:".dimmed(),
        colored_status(issue.status),
        "priority:".dimmed(),
        issue.priority,
        "type:".dimmed(),
        issue.issue_type,
    );
    if !issue.assignee.is_empty() {
        println!("{} {}", "assignee:".dimmed(), issue.assignee);
    }
    if !issue.owner.is_empty() {
        println!("{} {}", "owner:".dimmed(), issue.owner);
    }
    if let Some(mol_type) = &issue.mol_type {
        println!("{} {}", "mol-type:".dimmed(), mol_type);
    }
    if issue.ephemeral {
        println!("{}", "ephemeral".yellow());
    }
    if let Some(parent) = &issue.parent {
        println!("{} {}", "parent:".dimmed(), parent);
    }
    if !issue.labels.is_empty() {
        println!("{} {}", "labels:".dimmed(), issue.labels.join(", "));
    }

    println!("{} {}", "created:".dimmed(), issue.created_at.to_rfc3339());
    println!("{} {}", "updated:".dimmed(), issue.updated_at.to_rfc3339());
    if let Some(closed_at) = issue.closed_at {
        let reason = issue.close_reason.as_deref().unwrap_or("");
        println!("{} {} ({reason})", "closed:".dimmed(), closed_at.to_rfc3339());
    }
    if let Some(deleted_at) = issue.deleted_at {
        println!(
            "{} {} by {} ({})",
            "deleted:".dimmed(),
            deleted_at.to_rfc3339(),
            issue.deleted_by.as_deref().unwrap_or("unknown"),
            issue.delete_reason.as_deref().unwrap_or(""),
        );
    }

    if !issue.description.is_empty() {
        println!();
        for line in textwrap::wrap(&issue.description, width) {
            println!("  {line}");
        }
    }

    if !issue.dependencies.is_empty() {
        println!("\n{}", "depends on:".dimmed());
        for dep in &issue.dependencies {
            println!("  {} ({})", dep.id, dep.dep_type);
        }
    }
    if !issue.dependents.is_empty() {
        println!("\n{}", "depended on by:".dimmed());
        for dep in &issue.dependents {
            println!("  {} ({})", dep.id, dep.dep_type);
        }
    }

    if !issue.comments.is_empty() {
        println!("\n{}", "comments:".dimmed());
        for comment in &issue.comments {
            println!(
                "  #{} {} ({})",
                comment.id,
                comment.author,
                comment.created_at.to_rfc3339()
            );
            for line in textwrap::wrap(&comment.text, width.saturating_sub(4)) {
                println!("    {line}");
            }
        }
    }
}

/// Print doctor findings, one per line, with a summary.
pub fn print_problems(problems: &[Problem]) {
    if problems.is_empty() {
        println!("{}", "Store is consistent; no problems found.".green());
        return;
    }

    for problem in problems {
        let marker = if problem.fixed {
            "fixed".green()
        } else {
            "found".yellow()
        };
        println!("{marker}  {problem}");
    }

    let fixed = problems.iter().filter(|p| p.fixed).count();
    println!(
        "\n{} problem(s), {} fixed, {} remaining",
        problems.len(),
        fixed,
        problems.len() - fixed
    );
}
